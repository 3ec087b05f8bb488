//! Storage contract implemented by eventstore backends.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::EventstoreError;
use crate::event::{AggregateType, Editor, Event, EventType};
use crate::search_query::SearchQuery;
use crate::unique_constraint::UniqueConstraint;

/// An event ready for storage, payload already serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    /// Type name for mapper routing.
    pub event_type: EventType,
    /// Schema version of the aggregate.
    pub aggregate_version: String,
    /// Who caused the event.
    pub editor: Editor,
    /// Serialized JSON object, `None` for events without data.
    pub payload: Option<Value>,
}

/// Everything one aggregate contributes to a push.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatePush {
    /// Stream identifier.
    pub aggregate_id: String,
    /// Stream type.
    pub aggregate_type: AggregateType,
    /// Owner used if the stream does not exist yet.
    pub resource_owner: String,
    /// Latest sequence the writer expects the stream to have.
    pub expected_sequence: u64,
    /// Events to append, in order.
    pub events: Vec<PendingEvent>,
    /// Unique constraints to apply, in order.
    pub unique_constraints: Vec<UniqueConstraint>,
}

/// Persistence of event streams.
///
/// Implementations must apply a push atomically: either every event and
/// unique constraint of every aggregate is committed, or nothing is.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Appends events for one or more aggregates in a single transaction.
    ///
    /// The backend assigns `sequence`, `previous_sequence`, `position`,
    /// `creation_date` and `event_id`, and keeps the first resource owner of
    /// an existing stream. The returned events are in push order.
    ///
    /// # Errors
    ///
    /// Returns `EventstoreError::ConcurrencyConflict` if a stream's latest
    /// sequence differs from `expected_sequence`,
    /// `EventstoreError::UniqueConstraintViolation` if an `Add` collides, and
    /// `EventstoreError::Infrastructure` if the backend fails.
    async fn push(&self, pushes: Vec<AggregatePush>) -> Result<Vec<Event>, EventstoreError>;

    /// Returns the events matching `query`, ordered by position.
    ///
    /// # Errors
    ///
    /// Returns `EventstoreError::Infrastructure` if the backend fails.
    async fn filter(&self, query: &SearchQuery) -> Result<Vec<Event>, EventstoreError>;

    /// Returns the highest sequence among events matching `query`, `0` if none.
    ///
    /// # Errors
    ///
    /// Returns `EventstoreError::Infrastructure` if the backend fails.
    async fn latest_sequence(&self, query: &SearchQuery) -> Result<u64, EventstoreError>;
}
