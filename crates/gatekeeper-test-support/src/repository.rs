//! Test repositories: mock `EventRepository` implementations for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use gatekeeper_core::error::EventstoreError;
use gatekeeper_core::event::Event;
use gatekeeper_core::repository::{AggregatePush, EventRepository};
use gatekeeper_core::search_query::SearchQuery;
use uuid::Uuid;

use crate::fixtures::fixed_time;

/// Turns pushes into stored events without checking anything. Sequences start
/// after each push's expected sequence.
fn stamp(pushes: &[AggregatePush]) -> Vec<Event> {
    let mut position = 0;
    pushes
        .iter()
        .flat_map(|push| {
            (1..).zip(&push.events).map(move |(offset, pending)| Event {
                event_id: Uuid::now_v7(),
                aggregate_id: push.aggregate_id.clone(),
                aggregate_type: push.aggregate_type.clone(),
                resource_owner: push.resource_owner.clone(),
                aggregate_version: pending.aggregate_version.clone(),
                event_type: pending.event_type.clone(),
                sequence: push.expected_sequence + offset,
                previous_sequence: push.expected_sequence + offset - 1,
                position: 0,
                creation_date: fixed_time(),
                editor_user: pending.editor.user.clone(),
                editor_service: pending.editor.service.clone(),
                payload: pending.payload.clone(),
            })
        })
        .map(|mut event| {
            position += 1;
            event.position = position;
            event
        })
        .collect()
}

/// An event repository that records every push and query. Returns the
/// configured events from `filter` and the configured sequence from
/// `latest_sequence`; pushes always succeed.
#[derive(Debug)]
pub struct RecordingEventRepository {
    filter_result: Vec<Event>,
    latest_sequence: u64,
    pushed: Mutex<Vec<Vec<AggregatePush>>>,
    queries: Mutex<Vec<SearchQuery>>,
}

impl RecordingEventRepository {
    /// Create a new recording repository that returns `filter_result` from
    /// every `filter` call and `latest_sequence` from every
    /// `latest_sequence` call.
    #[must_use]
    pub fn new(filter_result: Vec<Event>, latest_sequence: u64) -> Self {
        Self {
            filter_result,
            latest_sequence,
            pushed: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Returns a snapshot of all pushes, one entry per `push` call.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn pushed(&self) -> Vec<Vec<AggregatePush>> {
        self.pushed.lock().unwrap().clone()
    }

    /// Returns a snapshot of all queries passed to `filter` or
    /// `latest_sequence`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn queries(&self) -> Vec<SearchQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventRepository for RecordingEventRepository {
    async fn push(&self, pushes: Vec<AggregatePush>) -> Result<Vec<Event>, EventstoreError> {
        let stored = stamp(&pushes);
        self.pushed.lock().unwrap().push(pushes);
        Ok(stored)
    }

    async fn filter(&self, query: &SearchQuery) -> Result<Vec<Event>, EventstoreError> {
        self.queries.lock().unwrap().push(query.clone());
        Ok(self.filter_result.clone())
    }

    async fn latest_sequence(&self, query: &SearchQuery) -> Result<u64, EventstoreError> {
        self.queries.lock().unwrap().push(query.clone());
        Ok(self.latest_sequence)
    }
}

/// An event repository that never holds events and accepts every push.
/// Useful for testing "not found" scenarios and creation commands.
#[derive(Debug)]
pub struct EmptyEventRepository;

#[async_trait]
impl EventRepository for EmptyEventRepository {
    async fn push(&self, pushes: Vec<AggregatePush>) -> Result<Vec<Event>, EventstoreError> {
        Ok(stamp(&pushes))
    }

    async fn filter(&self, _query: &SearchQuery) -> Result<Vec<Event>, EventstoreError> {
        Ok(vec![])
    }

    async fn latest_sequence(&self, _query: &SearchQuery) -> Result<u64, EventstoreError> {
        Ok(0)
    }
}

/// An event repository that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn push(&self, _pushes: Vec<AggregatePush>) -> Result<Vec<Event>, EventstoreError> {
        Err(EventstoreError::Infrastructure("connection refused".into()))
    }

    async fn filter(&self, _query: &SearchQuery) -> Result<Vec<Event>, EventstoreError> {
        Err(EventstoreError::Infrastructure("connection refused".into()))
    }

    async fn latest_sequence(&self, _query: &SearchQuery) -> Result<u64, EventstoreError> {
        Err(EventstoreError::Infrastructure("connection refused".into()))
    }
}
