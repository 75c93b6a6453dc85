pub mod audio;
pub mod live;
pub mod persona;
pub mod session;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ParlaError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Audio device error: {0}")]
    DeviceError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Tool argument error: {0}")]
    ToolArgumentError(String),

    #[error("Audio decode error: {0}")]
    DecodeError(String),

    #[error("Audio processing error: {0}")]
    AudioProcessingError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl From<std::io::Error> for ParlaError {
    fn from(e: std::io::Error) -> Self {
        ParlaError::ConnectionError(e.to_string())
    }
}

impl ParlaError {
    /// Check if this error is recoverable without restarting the app
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Needs a credential supplied outside the app
            ParlaError::ConfigError(_) => false,
            // Needs microphone permission or working hardware
            ParlaError::DeviceError(_) => false,
            // A fresh start() may succeed
            ParlaError::ConnectionError(_) => true,
            // Handled at the component boundary, session stays usable
            ParlaError::ToolArgumentError(_) => true,
            ParlaError::DecodeError(_) => true,
            ParlaError::AudioProcessingError(_) => true,
            ParlaError::ChannelError(_) => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            ParlaError::ConfigError(_) => {
                "Missing API credential. Add your key before starting a session.".to_string()
            }
            ParlaError::DeviceError(_) => {
                "Microphone unavailable. Please check your audio device and permissions."
                    .to_string()
            }
            ParlaError::ConnectionError(_) => {
                "Connection problem. Check your key and network, then try again.".to_string()
            }
            ParlaError::ToolArgumentError(_) => {
                "The tutor sent an instruction that could not be applied.".to_string()
            }
            ParlaError::DecodeError(_) => {
                "A piece of tutor audio could not be played.".to_string()
            }
            ParlaError::AudioProcessingError(_) => {
                "Audio processing failed. Please try again.".to_string()
            }
            ParlaError::ChannelError(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ParlaError>;
