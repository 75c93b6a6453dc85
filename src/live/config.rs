//! Connect-time configuration for the voice service.

use crate::live::wire::FunctionDeclaration;
use crate::{ParlaError, Result};

/// Default realtime voice model
pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-12-2025";

/// Default WebSocket endpoint for the bidirectional API
pub const DEFAULT_ENDPOINT: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Configuration for one streaming connection
#[derive(Clone, Debug)]
pub struct LiveConfig {
    /// API credential, read once at session start
    pub api_key: String,

    /// Model identifier
    pub model: String,

    /// WebSocket endpoint (overridable for testing)
    pub endpoint: String,

    /// Persona-parameterized system instruction
    pub system_instruction: String,

    /// Tools the model may invoke during the conversation
    pub tools: Vec<FunctionDeclaration>,
}

impl LiveConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            system_instruction: String::new(),
            tools: Vec::new(),
        }
    }

    /// Set the model identifier
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the WebSocket endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the system instruction
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    /// Declare the tools offered to the model
    pub fn with_tools(mut self, tools: Vec<FunctionDeclaration>) -> Self {
        self.tools = tools;
        self
    }

    /// Validate the configuration.
    ///
    /// A missing credential must fail here, before any device or network
    /// access is attempted.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(ParlaError::ConfigError("API key is not set".into()));
        }
        if self.model.is_empty() {
            return Err(ParlaError::ConfigError("Model is not set".into()));
        }
        Ok(())
    }

    /// Full connection URL carrying the credential
    pub fn url(&self) -> String {
        format!("{}?key={}", self.endpoint, self.api_key)
    }
}
