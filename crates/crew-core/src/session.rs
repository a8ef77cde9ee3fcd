//! Session Management
//!
//! A session is the append-only message history for one user goal. It is
//! owned by the orchestrator for the duration of a run and discarded
//! afterwards; there is no cross-run persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Message, Role};

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Append-only message history for one user goal.
///
/// Prior entries are never mutated, removed, or reordered: the only write
/// operations are [`Session::append`] and [`Session::extend`], and reads
/// hand out shared slices.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    id: SessionId,

    /// The user goal that started the session
    goal: String,

    /// Ordered message history
    messages: Vec<Message>,

    /// Creation timestamp
    created_at: DateTime<Utc>,

    /// Last append timestamp
    updated_at: DateTime<Utc>,
}

impl Session {
    /// Start a session from a user goal. The goal becomes the first message.
    pub fn new(goal: impl Into<String>) -> Self {
        let goal = goal.into();
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            messages: vec![Message::user(&goal)],
            goal,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    /// Append one message
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Append a batch of messages, preserving their order
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
        self.updated_at = Utc::now();
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The final answer of a completed run: the last assistant message
    pub fn final_answer(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Duration since creation
    pub fn duration(&self) -> chrono::Duration {
        self.updated_at - self.created_at
    }
}
