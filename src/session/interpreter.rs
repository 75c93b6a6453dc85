//! Demultiplexes tool calls from the model into practice-state mutations.
//!
//! The model's dialogue turn blocks until every call is answered, so each
//! call is acknowledged exactly once whatever the state of its arguments.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::live::wire::FunctionCall;
use crate::session::practice::{PracticeTracker, TargetSentence, WordStatus};
use crate::{ParlaError, Result};

pub const TOOL_SET_TARGET_SENTENCE: &str = "setTargetSentence";
pub const TOOL_UPDATE_PRONUNCIATION: &str = "updatePronunciation";

/// Acknowledgment sink; the live client in production, a recorder in tests
pub trait ToolResponder {
    fn respond(&self, call_id: &str, name: &str, result: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct SetTargetSentenceArgs {
    sentence: String,
    translation: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePronunciationArgs {
    word_index: i64,
    status: SpokenStatus,
}

/// The tool contract only admits a verdict, never "pending"
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SpokenStatus {
    Correct,
    Incorrect,
}

impl From<SpokenStatus> for WordStatus {
    fn from(status: SpokenStatus) -> Self {
        match status {
            SpokenStatus::Correct => WordStatus::Correct,
            SpokenStatus::Incorrect => WordStatus::Incorrect,
        }
    }
}

#[derive(Debug, Default)]
pub struct ToolCallInterpreter;

impl ToolCallInterpreter {
    pub fn new() -> Self {
        Self
    }

    /// Apply one call to the tracker and acknowledge it.
    ///
    /// Malformed arguments and out-of-range indices are local no-ops; the
    /// session must stay usable across bad individual calls.
    pub fn handle(
        &self,
        tracker: &mut PracticeTracker,
        call: &FunctionCall,
        responder: &impl ToolResponder,
    ) {
        let result = match call.name.as_str() {
            TOOL_SET_TARGET_SENTENCE => match self.apply_set_sentence(tracker, call) {
                Ok(()) => "displayed",
                Err(e) => {
                    warn!("Rejected {} call {}: {}", call.name, call.id, e);
                    "ignored"
                }
            },
            TOOL_UPDATE_PRONUNCIATION => match self.apply_update(tracker, call) {
                Ok(()) => "updated",
                Err(e) => {
                    warn!("Rejected {} call {}: {}", call.name, call.id, e);
                    "ignored"
                }
            },
            other => {
                warn!("Unknown tool call {} ({})", other, call.id);
                "ignored"
            }
        };

        if let Err(e) = responder.respond(&call.id, &call.name, result) {
            warn!("Failed to acknowledge call {}: {}", call.id, e);
        }
    }

    fn apply_set_sentence(&self, tracker: &mut PracticeTracker, call: &FunctionCall) -> Result<()> {
        let args: SetTargetSentenceArgs = serde_json::from_value(call.args.clone())
            .map_err(|e| ParlaError::ToolArgumentError(e.to_string()))?;

        let sentence = TargetSentence::new(&args.sentence, &args.translation);
        debug!(
            "New target sentence with {} words: {}",
            sentence.word_count(),
            args.sentence
        );
        tracker.set_sentence(sentence);
        Ok(())
    }

    fn apply_update(&self, tracker: &mut PracticeTracker, call: &FunctionCall) -> Result<()> {
        let args: UpdatePronunciationArgs = serde_json::from_value(call.args.clone())
            .map_err(|e| ParlaError::ToolArgumentError(e.to_string()))?;

        if args.word_index < 0 {
            return Err(ParlaError::ToolArgumentError(format!(
                "Negative word index {}",
                args.word_index
            )));
        }

        // Out of range is a silent no-op, the call is still acknowledged
        let applied = tracker.update_word(args.word_index as usize, args.status.into());
        if !applied {
            debug!(
                "Word index {} has no word to update, ignoring",
                args.word_index
            );
        }
        Ok(())
    }
}
