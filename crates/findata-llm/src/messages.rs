//! Message types for chat-style completion turns
//!
//! The agent engine only ever exchanges plain text with the completion
//! backend (system rules, user intent, assistant code, error reports), so a
//! message is a role plus a text body. Multi-modal content is out of scope.

use serde::{Deserialize, Serialize};

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message
    User,
    /// Assistant message
    Assistant,
    /// System message (handled separately in some providers)
    System,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Message content
    pub content: String,
}

impl Message {
    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }

    /// Create a system message
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    /// Text content of the message
    pub fn text(&self) -> &str {
        &self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message() {
        let msg = Message::user("导出日线数据");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "导出日线数据");
    }

    #[test]
    fn test_assistant_message() {
        let msg = Message::assistant("好的");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.text(), "好的");
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::system("You are a data analyst");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"system\""));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
