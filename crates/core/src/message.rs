//! Role-tagged prompt messages.
//!
//! These are the value objects handed to a model backend: an ordered list of
//! `ChatMessage`s, each tagged with the role that produced it. They are
//! deliberately minimal — richer conversation state (ordering, used/unused
//! lifecycle, audit trail) lives in the interaction history.

use serde::{Deserialize, Serialize};

/// The role of a message in a model prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions (task framing, compacted context)
    System,
}

/// A single role-tagged message in a model prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who this message is attributed to
    pub role: MessageRole,

    /// The text content
    pub content: String,
}

impl ChatMessage {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}
