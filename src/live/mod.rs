//! Client for the remote realtime voice service.
//!
//! The service owns transcription, synthesis, and the tutoring dialogue;
//! this module only honors its wire contract: one bidirectional WebSocket
//! carrying JSON messages, audio payloads base64-encoded PCM16.

pub mod client;
pub mod config;
pub mod wire;

pub use client::{LiveClient, LiveEvent};
pub use config::LiveConfig;
pub use wire::{FunctionCall, FunctionDeclaration};
