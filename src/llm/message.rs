//! Chat message data model shared by all agents

use serde::{Deserialize, Serialize};

/// A message in a chat conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "system", "user", "assistant"
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_construction() {
        let user_msg = ChatMessage::user("Hello, world!");
        assert_eq!(user_msg.role, "user");
        assert_eq!(user_msg.content, "Hello, world!");

        let system_msg = ChatMessage::system("You are helpful.");
        assert_eq!(system_msg.role, "system");

        let assistant_msg = ChatMessage::assistant("I can help!");
        assert_eq!(assistant_msg.role, "assistant");
    }

    #[test]
    fn test_chat_message_serialization() {
        let msg = ChatMessage::user("test message");
        let json = serde_json::to_string(&msg).unwrap();

        assert!(json.contains("\"role\":\"user\""));
        assert!(json.contains("\"content\":\"test message\""));
    }
}
