//! Interaction history value objects.
//!
//! An `InteractionEvent` records one exchanged message for one user. Events
//! are owned and mutated exclusively by the interaction log; once appended
//! they are immutable except for the `used` flag, which compaction may
//! bulk-flip to `false`. Disabled events are excluded from prompt assembly
//! but retained for audit and replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform-agnostic user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Who produced a logged event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Message received from the user
    User,
    /// Message produced by the assistant
    Assistant,
    /// Internal annotation (compaction markers, forced finalization notes)
    SystemNote,
}

/// One exchanged message in a user's interaction history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionEvent {
    /// When the event was appended
    pub timestamp: DateTime<Utc>,

    /// Whose history this event belongs to
    pub user_id: UserId,

    /// Who produced it
    pub direction: Direction,

    /// The text content
    pub content: String,

    /// Whether this event participates in prompt assembly.
    /// Flipped to `false` in bulk by compaction; never deleted.
    pub used: bool,
}

impl InteractionEvent {
    /// Create a new active event stamped with the current time.
    pub fn new(user_id: UserId, direction: Direction, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            user_id,
            direction,
            content: content.into(),
            used: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_events_are_used() {
        let ev = InteractionEvent::new(UserId::new("u1"), Direction::User, "hello");
        assert!(ev.used);
        assert_eq!(ev.direction, Direction::User);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let ev = InteractionEvent::new(UserId::new("u1"), Direction::Assistant, "reply");
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("assistant"));
        let back: InteractionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content, "reply");
        assert_eq!(back.user_id, UserId::new("u1"));
    }

    #[test]
    fn direction_serializes_snake_case() {
        let json = serde_json::to_string(&Direction::SystemNote).unwrap();
        assert_eq!(json, "\"system_note\"");
    }
}
