//! Event abstractions.
//!
//! An [`Event`] is the persisted, immutable record of one state change. It
//! carries its payload as generic JSON; the [`EventRegistry`] turns it into a
//! [`TypedEvent`] whose `kind` is the caller's event union.
//!
//! [`EventRegistry`]: crate::registry::EventRegistry

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::unique_constraint::UniqueConstraint;

/// Type of an aggregate, e.g. `org` or `instance`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateType(String);

impl AggregateType {
    /// Creates a new aggregate type.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the type as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AggregateType {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for AggregateType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Textual event type, the key into the event registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(String);

impl EventType {
    /// Creates a new event type.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the type as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the empty event type, which can never be registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who caused an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Editor {
    /// The user on whose behalf the change was made.
    pub user: String,
    /// The service that made the change.
    pub service: String,
}

impl Editor {
    /// Creates a new editor.
    #[must_use]
    pub fn new(user: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            service: service.into(),
        }
    }
}

/// Persisted representation of an event.
///
/// Events are append-only: the storage contract offers no way to update or
/// delete one after it has been written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Aggregate/stream this event belongs to.
    pub aggregate_id: String,
    /// Type of the aggregate.
    pub aggregate_type: AggregateType,
    /// Owner of the aggregate.
    pub resource_owner: String,
    /// Schema version of the aggregate at write time.
    pub aggregate_version: String,
    /// Type name for mapper routing.
    pub event_type: EventType,
    /// Position within the aggregate stream, starting at 1.
    pub sequence: u64,
    /// The sequence that was the latest of the stream before this event.
    pub previous_sequence: u64,
    /// Store-wide commit position, used to order events across streams.
    pub position: u64,
    /// Server-assigned creation timestamp.
    pub creation_date: DateTime<Utc>,
    /// User that caused the event.
    pub editor_user: String,
    /// Service that caused the event.
    pub editor_service: String,
    /// Serialized payload, `None` for events without data.
    pub payload: Option<serde_json::Value>,
}

/// A stored event together with its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedEvent<E> {
    /// Stored event metadata.
    pub metadata: Event,
    /// Typed payload produced by the registered filter mapper.
    pub kind: E,
}

impl<E> TypedEvent<E> {
    /// Returns the event's sequence within its aggregate stream.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.metadata.sequence
    }

    /// Returns the event type.
    #[must_use]
    pub fn event_type(&self) -> &EventType {
        &self.metadata.event_type
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn creation_date(&self) -> DateTime<Utc> {
        self.metadata.creation_date
    }
}

/// A domain event that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct EventCommand<E> {
    /// The event type the command is stored as.
    pub event_type: EventType,
    /// Typed payload, serialized by the registered push mapper.
    pub kind: E,
    /// Provenance of the change.
    pub editor: Editor,
    /// Unique constraints committed atomically with the event.
    pub unique_constraints: Vec<UniqueConstraint>,
}

impl<E> EventCommand<E> {
    /// Creates a new command without unique constraints.
    #[must_use]
    pub fn new(event_type: impl Into<EventType>, kind: E, editor: Editor) -> Self {
        Self {
            event_type: event_type.into(),
            kind,
            editor,
            unique_constraints: Vec::new(),
        }
    }

    /// Attaches a unique constraint to the command.
    #[must_use]
    pub fn with_unique_constraint(mut self, constraint: UniqueConstraint) -> Self {
        self.unique_constraints.push(constraint);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unique_constraint::UniqueConstraint;

    #[test]
    fn test_event_type_blank_is_empty() {
        assert!(EventType::from("").is_empty());
        assert!(EventType::from("  ").is_empty());
        assert!(!EventType::from("user.created").is_empty());
    }

    #[test]
    fn test_newtypes_serialize_transparently() {
        let value = serde_json::to_value(AggregateType::from("org")).unwrap();
        assert_eq!(value, serde_json::json!("org"));

        let back: EventType = serde_json::from_value(serde_json::json!("org.added")).unwrap();
        assert_eq!(back.as_str(), "org.added");
    }

    #[test]
    fn test_command_collects_unique_constraints_in_order() {
        let command = EventCommand::new("org.domain.verified", (), Editor::new("u1", "svc"))
            .with_unique_constraint(UniqueConstraint::add("org_domain", "a.com", "taken"))
            .with_unique_constraint(UniqueConstraint::remove("org_domain", "b.com"));

        assert_eq!(command.unique_constraints.len(), 2);
        assert_eq!(command.unique_constraints[0].unique_field, "a.com");
        assert_eq!(command.unique_constraints[1].unique_field, "b.com");
    }
}
