//! The eventstore facade.
//!
//! [`Eventstore`] ties a storage backend to an event registry. It serializes
//! staged commands on the way in, decodes stored events on the way out, and
//! drives reducers.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::aggregate::Aggregate;
use crate::error::EventstoreError;
use crate::event::{AggregateType, TypedEvent};
use crate::model::{QueryReducer, Reducer};
use crate::registry::EventRegistry;
use crate::repository::{AggregatePush, EventRepository, PendingEvent};
use crate::search_query::{Columns, SearchQueryBuilder};

/// Typed access to an event storage backend.
pub struct Eventstore<E> {
    repository: Arc<dyn EventRepository>,
    registry: Arc<EventRegistry<E>>,
}

impl<E> Clone for Eventstore<E> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E> std::fmt::Debug for Eventstore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Eventstore")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl<E: Send + Sync + 'static> Eventstore<E> {
    /// Creates a new eventstore.
    #[must_use]
    pub fn new(repository: Arc<dyn EventRepository>, registry: Arc<EventRegistry<E>>) -> Self {
        Self {
            repository,
            registry,
        }
    }

    /// Returns the registry used for mapping.
    #[must_use]
    pub fn registry(&self) -> &EventRegistry<E> {
        &self.registry
    }

    /// Atomically appends the staged events of all aggregates.
    ///
    /// Aggregates without staged events are skipped; if none remain the call
    /// returns an empty list without touching the backend. The returned
    /// events are in push order.
    ///
    /// # Errors
    ///
    /// Returns `EventstoreError::InvalidArgument` if a stream is staged twice
    /// or a payload cannot be serialized, `EventstoreError::Unimplemented` if
    /// an event type has no push mapper, and any error of
    /// [`EventRepository::push`].
    #[instrument(skip_all, fields(aggregates = aggregates.len()), err)]
    pub async fn push_aggregates(
        &self,
        aggregates: Vec<Aggregate<E>>,
    ) -> Result<Vec<TypedEvent<E>>, EventstoreError> {
        let mut seen: HashSet<(AggregateType, String)> = HashSet::new();
        let mut pushes = Vec::new();
        let mut kinds = Vec::new();

        for aggregate in aggregates {
            if aggregate.staged_events().is_empty() {
                continue;
            }
            if !seen.insert((aggregate.aggregate_type.clone(), aggregate.id.clone())) {
                return Err(EventstoreError::InvalidArgument(format!(
                    "aggregate {}/{} staged more than once",
                    aggregate.aggregate_type, aggregate.id
                )));
            }

            let mut push = AggregatePush {
                aggregate_id: aggregate.id.clone(),
                aggregate_type: aggregate.aggregate_type.clone(),
                resource_owner: aggregate.resource_owner.clone(),
                expected_sequence: aggregate.previous_sequence(),
                events: Vec::with_capacity(aggregate.staged_events().len()),
                unique_constraints: Vec::new(),
            };
            let version = aggregate.version.clone();
            for command in aggregate.into_events() {
                let payload = self
                    .registry
                    .push_payload(&command.event_type, &command.kind)?;
                push.events.push(PendingEvent {
                    event_type: command.event_type,
                    aggregate_version: version.clone(),
                    editor: command.editor,
                    payload,
                });
                push.unique_constraints.extend(command.unique_constraints);
                kinds.push(command.kind);
            }
            pushes.push(push);
        }

        if pushes.is_empty() {
            debug!("nothing to push");
            return Ok(Vec::new());
        }

        let stored = match self.repository.push(pushes).await {
            Ok(stored) => stored,
            Err(err) => {
                if let EventstoreError::ConcurrencyConflict {
                    aggregate_type,
                    aggregate_id,
                    expected,
                    actual,
                } = &err
                {
                    warn!(
                        %aggregate_type,
                        %aggregate_id,
                        expected,
                        actual,
                        "push rejected by concurrency check"
                    );
                }
                return Err(err);
            }
        };

        if stored.len() != kinds.len() {
            return Err(EventstoreError::Internal(format!(
                "backend stored {} events, {} were pushed",
                stored.len(),
                kinds.len()
            )));
        }
        debug!(events = stored.len(), "events pushed");

        Ok(stored
            .into_iter()
            .zip(kinds)
            .map(|(metadata, kind)| TypedEvent { metadata, kind })
            .collect())
    }

    /// Returns the typed events matching `query`.
    ///
    /// # Errors
    ///
    /// Returns `EventstoreError::InvalidArgument` for a malformed query,
    /// `EventstoreError::Unimplemented` or `EventstoreError::Unmarshal` if a
    /// stored event cannot be mapped, and any backend error.
    #[instrument(skip_all, err)]
    pub async fn filter_events(
        &self,
        query: &SearchQueryBuilder,
    ) -> Result<Vec<TypedEvent<E>>, EventstoreError> {
        let query = query.clone().columns(Columns::Event).build()?;
        let events = self.repository.filter(&query).await?;
        debug!(events = events.len(), "events filtered");
        self.registry.map_events(events)
    }

    /// Returns the highest sequence matching `query`, `0` if nothing matches.
    ///
    /// # Errors
    ///
    /// Returns `EventstoreError::InvalidArgument` for a malformed query and
    /// any backend error.
    #[instrument(skip_all, err)]
    pub async fn latest_sequence(&self, query: &SearchQueryBuilder) -> Result<u64, EventstoreError> {
        let query = query.clone().columns(Columns::MaxSequence).build()?;
        self.repository.latest_sequence(&query).await
    }

    /// Returns the latest sequence of one stream, `0` if it does not exist.
    ///
    /// # Errors
    ///
    /// See [`Eventstore::latest_sequence`].
    pub async fn stream_sequence(
        &self,
        aggregate_type: impl Into<AggregateType>,
        aggregate_id: impl Into<String>,
    ) -> Result<u64, EventstoreError> {
        let aggregate_type = aggregate_type.into();
        let aggregate_id = aggregate_id.into();
        let query = SearchQueryBuilder::new(Columns::MaxSequence)
            .add_query(|q| q.aggregate_types([aggregate_type]).aggregate_ids([aggregate_id]));
        self.latest_sequence(&query).await
    }

    /// Appends the events matching `query` to `reducer` and reduces them.
    ///
    /// # Errors
    ///
    /// Returns any error of [`Eventstore::filter_events`] and the reducer's
    /// reduce error.
    pub async fn filter_to_reducer<R>(
        &self,
        query: &SearchQueryBuilder,
        reducer: &mut R,
    ) -> Result<(), EventstoreError>
    where
        R: Reducer<E> + Send + ?Sized,
    {
        let events = self.filter_events(query).await?;
        reducer.append_events(events);
        reducer.reduce()
    }

    /// Brings `reducer` up to date using its own query.
    ///
    /// # Errors
    ///
    /// See [`Eventstore::filter_to_reducer`].
    pub async fn filter_to_query_reducer<R>(&self, reducer: &mut R) -> Result<(), EventstoreError>
    where
        R: QueryReducer<E> + Send + ?Sized,
    {
        let query = reducer.query();
        self.filter_to_reducer(&query, reducer).await
    }

    /// Catches `reducer` up, pushes `aggregate` against the reducer's
    /// processed sequence and folds the stored events back into it.
    ///
    /// # Errors
    ///
    /// Returns any error of [`Eventstore::filter_to_query_reducer`] or
    /// [`Eventstore::push_aggregates`], and the reducer's reduce error.
    #[instrument(skip_all, fields(aggregate_type = %aggregate.aggregate_type, aggregate_id = %aggregate.id), err)]
    pub async fn push_aggregate<R>(
        &self,
        reducer: &mut R,
        mut aggregate: Aggregate<E>,
    ) -> Result<(), EventstoreError>
    where
        R: QueryReducer<E> + Send + ?Sized,
    {
        self.filter_to_query_reducer(reducer).await?;
        aggregate.set_previous_sequence(reducer.processed_sequence());

        let events = self.push_aggregates(vec![aggregate]).await?;
        reducer.append_events(events);
        reducer.reduce()
    }
}
