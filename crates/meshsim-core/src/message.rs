//! Decoded message types

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::PeerAddress;

/// Globally unique message identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Create a message id from an explicit value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A message carried inside a packet payload
///
/// Never mutated once decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier
    pub id: MessageId,
    /// Declared author of the message
    pub sender: PeerAddress,
    /// Display name of the author, if known
    pub sender_nickname: Option<String>,
    /// Intended recipient for private messages
    pub recipient: Option<PeerAddress>,
    /// Whether the message is private (never flood-relayed)
    pub is_private: bool,
    /// Text content
    pub content: String,
    /// Creation time in milliseconds since the UNIX epoch
    pub timestamp: u64,
}

impl Message {
    /// Create a public broadcast message
    pub fn broadcast(
        id: MessageId,
        sender: PeerAddress,
        content: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            id,
            sender,
            sender_nickname: None,
            recipient: None,
            is_private: false,
            content: content.into(),
            timestamp,
        }
    }

    /// Create a private message addressed to `recipient`
    pub fn private(
        id: MessageId,
        sender: PeerAddress,
        recipient: PeerAddress,
        content: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            id,
            sender,
            sender_nickname: None,
            recipient: Some(recipient),
            is_private: true,
            content: content.into(),
            timestamp,
        }
    }

    /// Attach the author's display name
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.sender_nickname = Some(nickname.into());
        self
    }
}
