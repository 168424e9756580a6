//! Agent message stores and prompt templates
//!
//! Two independent stores exist per session: the coder (drafts and repairs
//! code) and the inspector (diagnoses failed executions). Each store is the
//! exact prompt context sent to its completion endpoint.

pub mod prompts;
pub mod store;

pub use store::MessageStore;
