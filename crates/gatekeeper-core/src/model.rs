//! Reducer contracts and base models.
//!
//! Models are projections built by folding events: the eventstore appends
//! matching events to a [`Reducer`] and then asks it to reduce them. The base
//! [`WriteModel`] and [`ReadModel`] track the bookkeeping every projection
//! needs and are meant to be embedded in domain-specific models.

use chrono::{DateTime, Utc};

use crate::error::EventstoreError;
use crate::event::{AggregateType, TypedEvent};
use crate::search_query::{Columns, SearchQueryBuilder, SubQuery};

/// Something that can fold events into its state.
pub trait Reducer<E> {
    /// Buffers events in the order they are given.
    fn append_events(&mut self, events: Vec<TypedEvent<E>>);

    /// Folds buffered events into the state and clears the buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffered events cannot be applied.
    fn reduce(&mut self) -> Result<(), EventstoreError>;
}

/// A reducer that also knows which events it needs.
pub trait QueryReducer<E>: Reducer<E> {
    /// The query selecting the events this reducer has not seen yet.
    fn query(&self) -> SearchQueryBuilder;

    /// Sequence of the last event folded into the reducer.
    fn processed_sequence(&self) -> u64;
}

/// Bookkeeping shared by models that decide commands.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteModel<E> {
    /// Stream the model is built from.
    pub aggregate_id: String,
    /// Owner of the stream; adopted from the first event when empty.
    pub resource_owner: String,
    /// Sequence of the last reduced event, `0` before any event.
    pub processed_sequence: u64,
    /// Creation date of the last reduced event.
    pub change_date: Option<DateTime<Utc>>,
    events: Vec<TypedEvent<E>>,
}

impl<E> WriteModel<E> {
    /// Creates an empty model for one stream.
    #[must_use]
    pub fn new(aggregate_id: impl Into<String>, resource_owner: impl Into<String>) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            resource_owner: resource_owner.into(),
            processed_sequence: 0,
            change_date: None,
            events: Vec::new(),
        }
    }

    /// Events appended since the last reduce.
    #[must_use]
    pub fn events(&self) -> &[TypedEvent<E>] {
        &self.events
    }

    /// Query for the events of this stream after `processed_sequence`.
    #[must_use]
    pub fn query(&self, aggregate_type: impl Into<AggregateType>) -> SearchQueryBuilder {
        self.query_with(aggregate_type, |q| q)
    }

    /// Like [`WriteModel::query`], with `configure` narrowing the sub-query
    /// further, e.g. by event types or payload.
    #[must_use]
    pub fn query_with(
        &self,
        aggregate_type: impl Into<AggregateType>,
        configure: impl FnOnce(SubQuery) -> SubQuery,
    ) -> SearchQueryBuilder {
        let aggregate_type = aggregate_type.into();
        let builder = SearchQueryBuilder::new(Columns::Event).add_query(|q| {
            configure(
                q.aggregate_types([aggregate_type])
                    .aggregate_ids([self.aggregate_id.clone()])
                    .sequence_greater(self.processed_sequence),
            )
        });
        if self.resource_owner.is_empty() {
            builder
        } else {
            builder.resource_owner(self.resource_owner.clone())
        }
    }
}

impl<E> Reducer<E> for WriteModel<E> {
    fn append_events(&mut self, events: Vec<TypedEvent<E>>) {
        self.events.extend(events);
    }

    fn reduce(&mut self) -> Result<(), EventstoreError> {
        let Some(last) = self.events.last() else {
            return Ok(());
        };
        self.processed_sequence = last.sequence();
        self.change_date = Some(last.creation_date());
        if self.resource_owner.is_empty() {
            self.resource_owner.clone_from(&self.events[0].metadata.resource_owner);
        }
        self.events.clear();
        Ok(())
    }
}

/// Bookkeeping shared by projections served to readers.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadModel<E> {
    /// Stream the model is built from.
    pub aggregate_id: String,
    /// Owner of the stream; adopted from the first event when empty.
    pub resource_owner: String,
    /// Sequence of the last reduced event.
    pub processed_sequence: u64,
    /// Creation date of the first reduced event.
    pub creation_date: Option<DateTime<Utc>>,
    /// Creation date of the last reduced event.
    pub change_date: Option<DateTime<Utc>>,
    events: Vec<TypedEvent<E>>,
}

impl<E> ReadModel<E> {
    /// Creates an empty read model for one stream.
    #[must_use]
    pub fn new(aggregate_id: impl Into<String>) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            resource_owner: String::new(),
            processed_sequence: 0,
            creation_date: None,
            change_date: None,
            events: Vec::new(),
        }
    }

    /// Events appended since the last reduce.
    #[must_use]
    pub fn events(&self) -> &[TypedEvent<E>] {
        &self.events
    }
}

impl<E> Reducer<E> for ReadModel<E> {
    fn append_events(&mut self, events: Vec<TypedEvent<E>>) {
        self.events.extend(events);
    }

    fn reduce(&mut self) -> Result<(), EventstoreError> {
        let (Some(first), Some(last)) = (self.events.first(), self.events.last()) else {
            return Ok(());
        };
        if self.creation_date.is_none() {
            self.creation_date = Some(first.creation_date());
        }
        if self.resource_owner.is_empty() {
            self.resource_owner.clone_from(&first.metadata.resource_owner);
        }
        self.processed_sequence = last.sequence();
        self.change_date = Some(last.creation_date());
        self.events.clear();
        Ok(())
    }
}
