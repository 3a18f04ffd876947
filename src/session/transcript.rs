//! Append-only chat transcript.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking questions.
    User,
    /// The simulated pipeline answering.
    #[serde(rename = "model")]
    Assistant,
}

impl Role {
    /// Label used when history is flattened for the backend.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "model",
        }
    }
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    /// Identifier unique within the session.
    pub id: String,
    /// Author.
    pub role: Role,
    /// Message body.
    pub text: String,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Message {
    /// Create a message stamped with the current time and a fresh identifier.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Ordered, append-only message log.
///
/// Entries can only be added; nothing hands out mutable access to existing messages.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return a reference to it.
    pub fn push(&mut self, role: Role, text: impl Into<String>) -> &Message {
        self.messages.push(Message::new(role, text));
        let last = self.messages.len() - 1;
        &self.messages[last]
    }

    /// All messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}
