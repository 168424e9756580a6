//! LLM integration module
//!
//! Provides the chat message model and a client for OpenAI-compatible
//! completion endpoints, in both full-message and channel-based streaming
//! modes.

pub mod client;
pub mod message;

pub use client::{ChatClient, Completion, LlmError};
pub use message::ChatMessage;
