//! Tutor persona: the learner profile consumed from the host UI and the
//! system instruction parameterized by it, plus the tool declarations the
//! model practices sentences through.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::live::wire::FunctionDeclaration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserLevel {
    Beginner,
    Intermediate,
    Advanced,
}

/// Learner profile supplied by the host UI layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub gender: Gender,
    pub level: UserLevel,
}

impl UserProfile {
    pub fn new(name: impl Into<String>, gender: Gender, level: UserLevel) -> Self {
        Self {
            name: name.into(),
            gender,
            level,
        }
    }
}

/// Build the tutor's system instruction for one session.
///
/// The tutor speaks warm Egyptian Arabic, drills English sentences, and
/// drives the practice card exclusively through the two declared tools.
pub fn system_instruction(profile: &UserProfile) -> String {
    let address = match profile.gender {
        Gender::Female => "Address the learner with feminine Arabic forms.",
        Gender::Male => "Address the learner with masculine Arabic forms.",
    };

    let difficulty = match profile.level {
        UserLevel::Beginner => "Start with short everyday sentences of three to five words.",
        UserLevel::Intermediate => "Use everyday sentences with common tenses and connectors.",
        UserLevel::Advanced => "Use longer sentences with idioms and varied tenses.",
    };

    format!(
        "You are a cheerful, patient Egyptian English tutor. Your learner is called {name}. {address}\n\
         Speak upbeat colloquial Egyptian Arabic, keep the mood light, and break the learner's fear of speaking English.\n\
         {difficulty}\n\
         - Call setTargetSentence with every sentence you want the learner to practice, with its Egyptian Arabic translation.\n\
         - After the learner pronounces each word, immediately call updatePronunciation for that word with correct or incorrect.\n\
         - Celebrate loudly when the whole sentence is pronounced correctly, then move on to a new sentence.",
        name = profile.name,
        address = address,
        difficulty = difficulty,
    )
}

/// The two tools declared at connect time
pub fn tool_declarations() -> Vec<FunctionDeclaration> {
    vec![
        FunctionDeclaration {
            name: "setTargetSentence".to_string(),
            description: "Show the learner a sentence to practice pronouncing".to_string(),
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "sentence": {
                        "type": "STRING",
                        "description": "The sentence in English"
                    },
                    "translation": {
                        "type": "STRING",
                        "description": "The translation in Egyptian Arabic"
                    }
                },
                "required": ["sentence", "translation"]
            }),
        },
        FunctionDeclaration {
            name: "updatePronunciation".to_string(),
            description: "Update the pronunciation status of one word in the current sentence"
                .to_string(),
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "wordIndex": {
                        "type": "NUMBER",
                        "description": "Word position, starting at 0"
                    },
                    "status": {
                        "type": "STRING",
                        "enum": ["correct", "incorrect"],
                        "description": "Pronunciation verdict"
                    }
                },
                "required": ["wordIndex", "status"]
            }),
        },
    ]
}
