//! Append-only message stores for the coder and inspector agents
//!
//! A store holds the ordered list of messages that forms the literal prompt
//! sent to the completion service. Messages are only ever appended; transient
//! knowledge augmentation is composed into the outgoing request with
//! [`MessageStore::augmented`] and never written back into the store.

use std::path::Path;

use crate::agent::prompts;
use crate::llm::ChatMessage;

/// Ordered, append-only list of role-tagged messages for one agent
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
}

impl MessageStore {
    /// Create an empty store (inspector style: no system preamble)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with a system preamble (coder style)
    pub fn with_system(preamble: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(preamble)],
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    /// Extend the system preamble in place (knowledge policy, upload notes).
    /// No-op when the store has no leading system message.
    pub fn extend_system(&mut self, extra: &str) {
        if let Some(first) = self.messages.first_mut() {
            if first.role == "system" {
                first.content.push_str(extra);
            }
        }
    }

    /// Append a templated inspection request for a failed execution
    pub fn push_inspect_request(&mut self, bug_code: &str, error_message: &str) {
        self.push_user(prompts::inspect_request(bug_code, error_message));
    }

    /// Append a templated repair request carrying the inspector's diagnosis
    pub fn push_repair_request(&mut self, bug_code: &str, error_message: &str, fix_method: &str) {
        self.push_user(prompts::repair_request(bug_code, error_message, fix_method));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Compose the outgoing prompt: the stored messages with an optional
    /// augmentation block appended to the last user message's content. The
    /// store itself is left untouched, so persisted history never contains
    /// augmentation text.
    pub fn augmented(&self, augmentation: Option<&str>) -> Vec<ChatMessage> {
        let mut outgoing = self.messages.clone();
        if let Some(extra) = augmentation {
            if let Some(last) = outgoing.iter_mut().rev().find(|m| m.role == "user") {
                last.content.push_str(extra);
            }
        }
        outgoing
    }

    /// Persist the store as a JSON array of messages
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&self.messages)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Load a store previously written by [`MessageStore::save`]
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let messages: Vec<ChatMessage> = serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Self { messages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_order_is_preserved() {
        let mut store = MessageStore::with_system("preamble");
        store.push_user("first");
        store.push_assistant("second");
        store.push_user("third");

        let roles: Vec<&str> = store.messages().iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(store.messages()[3].content, "third");
    }

    #[test]
    fn test_augmented_does_not_mutate_store() {
        let mut store = MessageStore::with_system("preamble");
        store.push_user("analyze the dataset");

        let outgoing = store.augmented(Some("\n[retrieved snippet]"));
        assert!(outgoing[1].content.ends_with("[retrieved snippet]"));
        assert_eq!(store.messages()[1].content, "analyze the dataset");
    }

    #[test]
    fn test_augmented_targets_last_user_message() {
        let mut store = MessageStore::new();
        store.push_user("old question");
        store.push_assistant("old answer");
        store.push_user("new question");

        let outgoing = store.augmented(Some(" +aug"));
        assert_eq!(outgoing[0].content, "old question");
        assert_eq!(outgoing[2].content, "new question +aug");
    }

    #[test]
    fn test_templated_helpers_embed_code_and_error() {
        let mut store = MessageStore::new();
        store.push_inspect_request("print(x)", "NameError: name 'x' is not defined");
        store.push_repair_request("print(x)", "NameError", "define x first");

        assert!(store.messages()[0].content.contains("print(x)"));
        assert!(store.messages()[0].content.contains("NameError"));
        assert!(store.messages()[1].content.contains("define x first"));
    }

    #[test]
    fn test_extend_system_requires_system_head() {
        let mut bare = MessageStore::new();
        bare.push_user("hello");
        bare.extend_system(" extra");
        assert_eq!(bare.messages()[0].content, "hello");

        let mut seeded = MessageStore::with_system("base");
        seeded.extend_system(" extra");
        assert_eq!(seeded.messages()[0].content, "base extra");
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coder_messages.json");

        let mut store = MessageStore::with_system("preamble");
        store.push_user("question");
        store.push_assistant("answer");
        store.save(&path).unwrap();

        let loaded = MessageStore::load(&path).unwrap();
        assert_eq!(loaded.messages(), store.messages());
    }
}
