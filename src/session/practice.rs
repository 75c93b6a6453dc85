//! The practice sentence and its word-by-word pronunciation tracking.

use serde::{Deserialize, Serialize};

/// Punctuation stripped from words for robust matching
const PUNCTUATION: &[char] = &[
    '.', ',', '/', '#', '!', '$', '%', '^', '&', '*', ';', ':', '{', '}', '=', '-', '_', '`', '~',
    '(', ')',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordStatus {
    Pending,
    Correct,
    Incorrect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub status: WordStatus,
}

/// The sentence currently being practiced.
///
/// Word order is fixed at creation; only per-word statuses mutate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSentence {
    pub words: Vec<Word>,
    pub translation: String,
    pub full_text: String,
}

impl TargetSentence {
    /// Split a sentence on whitespace into pending words, punctuation
    /// stripped from each for display and matching
    pub fn new(sentence: &str, translation: &str) -> Self {
        let words = sentence
            .split_whitespace()
            .map(|token| Word {
                text: token.replace(PUNCTUATION, ""),
                status: WordStatus::Pending,
            })
            .collect();

        Self {
            words,
            translation: translation.to_string(),
            full_text: sentence.to_string(),
        }
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// An empty sentence is never complete, so a degenerate zero-word
    /// `setTargetSentence` cannot latch the perfect badge
    pub fn all_correct(&self) -> bool {
        !self.words.is_empty() && self.words.iter().all(|w| w.status == WordStatus::Correct)
    }
}

/// Observable phase of the practice widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PracticeState {
    NoSentence,
    Practicing,
    Perfect,
}

/// Tracks the current sentence and the perfect latch.
///
/// `perfect` flips true when every word is correct and stays true for the
/// life of that sentence instance, even if a later update marks a word
/// incorrect; only a brand-new sentence rearms it.
#[derive(Debug, Clone, Default)]
pub struct PracticeTracker {
    sentence: Option<TargetSentence>,
    perfect: bool,
}

impl PracticeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current sentence wholesale
    pub fn set_sentence(&mut self, sentence: TargetSentence) {
        self.sentence = Some(sentence);
        self.perfect = false;
    }

    /// Apply a per-word status update.
    ///
    /// An out-of-range index (or no current sentence) is a no-op and
    /// returns false; it must never raise.
    pub fn update_word(&mut self, index: usize, status: WordStatus) -> bool {
        let Some(sentence) = self.sentence.as_mut() else {
            return false;
        };
        let Some(word) = sentence.words.get_mut(index) else {
            return false;
        };

        word.status = status;
        if sentence.all_correct() {
            self.perfect = true;
        }
        true
    }

    pub fn state(&self) -> PracticeState {
        match (&self.sentence, self.perfect) {
            (None, _) => PracticeState::NoSentence,
            (Some(_), false) => PracticeState::Practicing,
            (Some(_), true) => PracticeState::Perfect,
        }
    }

    pub fn sentence(&self) -> Option<&TargetSentence> {
        self.sentence.as_ref()
    }

    pub fn is_perfect(&self) -> bool {
        self.perfect
    }

    /// Session teardown: back to no sentence
    pub fn clear(&mut self) {
        self.sentence = None;
        self.perfect = false;
    }
}
