//! Conversation turns consumed by keyword extraction and follow-up
//! resolution.

use serde::{Deserialize, Serialize};

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// End user.
    User,
    /// Assistant reply.
    Assistant,
    /// System note.
    System,
}

/// One `{role, content}` turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Speaker.
    pub role: TurnRole,
    /// Text content.
    pub content: String,
}

impl ChatTurn {
    /// Creates a user turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    /// Creates an assistant turn.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }

    /// Returns `true` for user turns.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == TurnRole::User
    }
}
