pub mod interpreter;
#[cfg(feature = "audio-io")]
pub mod manager;
pub mod practice;

pub use interpreter::{ToolCallInterpreter, ToolResponder};
#[cfg(feature = "audio-io")]
pub use manager::{ConnectionState, SessionConfig, SessionSnapshot, VoiceSession};
pub use practice::{PracticeState, PracticeTracker, TargetSentence, Word, WordStatus};
