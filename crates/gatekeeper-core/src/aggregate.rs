//! Aggregates: the unit of optimistic concurrency.
//!
//! An [`Aggregate`] names one event stream and carries the events a command
//! wants to append to it, together with the sequence the command was decided
//! against.

use crate::event::{AggregateType, EventCommand};

/// Staged events for one aggregate stream.
#[derive(Debug)]
pub struct Aggregate<E> {
    /// Stream identifier.
    pub id: String,
    /// Stream type.
    pub aggregate_type: AggregateType,
    /// Owner of the stream. Ignored by the store once the stream exists.
    pub resource_owner: String,
    /// Schema version stamped on every event.
    pub version: String,
    previous_sequence: u64,
    events: Vec<EventCommand<E>>,
}

impl<E> Aggregate<E> {
    /// Creates an aggregate that expects `previous_sequence` to be the latest
    /// persisted sequence of its stream (`0` for a new stream).
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        aggregate_type: impl Into<AggregateType>,
        resource_owner: impl Into<String>,
        version: impl Into<String>,
        previous_sequence: u64,
    ) -> Self {
        Self {
            id: id.into(),
            aggregate_type: aggregate_type.into(),
            resource_owner: resource_owner.into(),
            version: version.into(),
            previous_sequence,
            events: Vec::new(),
        }
    }

    /// Stages events in order.
    #[must_use]
    pub fn push_events(mut self, events: impl IntoIterator<Item = EventCommand<E>>) -> Self {
        self.events.extend(events);
        self
    }

    /// The sequence the caller expects to be the latest of the stream.
    #[must_use]
    pub fn previous_sequence(&self) -> u64 {
        self.previous_sequence
    }

    /// Overrides the expected sequence.
    pub fn set_previous_sequence(&mut self, previous_sequence: u64) {
        self.previous_sequence = previous_sequence;
    }

    /// The staged events.
    #[must_use]
    pub fn staged_events(&self) -> &[EventCommand<E>] {
        &self.events
    }

    /// Consumes the aggregate, returning its staged events.
    #[must_use]
    pub fn into_events(self) -> Vec<EventCommand<E>> {
        self.events
    }
}
