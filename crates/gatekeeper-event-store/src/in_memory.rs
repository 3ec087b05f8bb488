//! In-memory implementation of the `EventRepository` trait.
//!
//! Used by tests and embedded deployments. A push validates every aggregate
//! and unique constraint first and then commits under the same lock, so a
//! failed or dropped push leaves no trace.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

use gatekeeper_core::clock::{Clock, SystemClock};
use gatekeeper_core::error::EventstoreError;
use gatekeeper_core::event::Event;
use gatekeeper_core::repository::{AggregatePush, EventRepository};
use gatekeeper_core::search_query::{Field, Filter, FilterValue, Operation, SearchQuery};
use gatekeeper_core::unique_constraint::UniqueConstraintAction;

#[derive(Debug, Default)]
struct State {
    events: Vec<Event>,
    unique_constraints: HashSet<(String, String)>,
    position: u64,
}

/// Event repository keeping everything in process memory.
pub struct InMemoryEventRepository {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryEventRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryEventRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventRepository").finish_non_exhaustive()
    }
}

impl InMemoryEventRepository {
    /// Creates an empty repository stamping events with the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty repository stamping events with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
        }
    }

    /// Returns every stored event in commit order.
    ///
    /// # Errors
    ///
    /// Returns `EventstoreError::Infrastructure` if the lock is poisoned.
    pub fn events(&self) -> Result<Vec<Event>, EventstoreError> {
        Ok(self.lock()?.events.clone())
    }

    /// Returns `true` if the `(unique_type, unique_field)` pair is claimed.
    ///
    /// # Errors
    ///
    /// Returns `EventstoreError::Infrastructure` if the lock is poisoned.
    pub fn has_unique_constraint(
        &self,
        unique_type: &str,
        unique_field: &str,
    ) -> Result<bool, EventstoreError> {
        Ok(self
            .lock()?
            .unique_constraints
            .contains(&(unique_type.to_owned(), unique_field.to_owned())))
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, EventstoreError> {
        self.state
            .lock()
            .map_err(|_| EventstoreError::Infrastructure("event store lock poisoned".into()))
    }

    fn matching<'a>(state: &'a State, query: &'a SearchQuery) -> impl Iterator<Item = &'a Event> {
        state
            .events
            .iter()
            .filter(move |event| matches_query(event, query))
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    #[instrument(skip_all, fields(aggregates = pushes.len()), err)]
    async fn push(&self, pushes: Vec<AggregatePush>) -> Result<Vec<Event>, EventstoreError> {
        let mut state = self.lock()?;
        let creation_date = self.clock.now();
        let mut unique_constraints = state.unique_constraints.clone();
        let mut position = state.position;
        let mut staged: Vec<Event> = Vec::new();

        for push in pushes {
            let stream = |event: &&Event| {
                event.aggregate_type == push.aggregate_type
                    && event.aggregate_id == push.aggregate_id
            };
            let actual = state
                .events
                .iter()
                .chain(&staged)
                .filter(stream)
                .map(|event| event.sequence)
                .max()
                .unwrap_or(0);
            if actual != push.expected_sequence {
                return Err(EventstoreError::ConcurrencyConflict {
                    aggregate_type: push.aggregate_type,
                    aggregate_id: push.aggregate_id,
                    expected: push.expected_sequence,
                    actual,
                });
            }
            let resource_owner = state
                .events
                .iter()
                .chain(&staged)
                .find(stream)
                .map_or_else(|| push.resource_owner.clone(), |e| e.resource_owner.clone());

            for constraint in &push.unique_constraints {
                let key = (
                    constraint.unique_type.clone(),
                    constraint.unique_field.clone(),
                );
                match constraint.action {
                    UniqueConstraintAction::Add => {
                        if !unique_constraints.insert(key) {
                            return Err(EventstoreError::UniqueConstraintViolation {
                                unique_type: constraint.unique_type.clone(),
                                unique_field: constraint.unique_field.clone(),
                                message: constraint.error_message.clone(),
                            });
                        }
                    }
                    UniqueConstraintAction::Remove => {
                        unique_constraints.remove(&key);
                    }
                }
            }

            let mut sequence = actual;
            for pending in push.events {
                sequence += 1;
                position += 1;
                staged.push(Event {
                    event_id: Uuid::now_v7(),
                    aggregate_id: push.aggregate_id.clone(),
                    aggregate_type: push.aggregate_type.clone(),
                    resource_owner: resource_owner.clone(),
                    aggregate_version: pending.aggregate_version,
                    event_type: pending.event_type,
                    sequence,
                    previous_sequence: sequence - 1,
                    position,
                    creation_date,
                    editor_user: pending.editor.user,
                    editor_service: pending.editor.service,
                    payload: pending.payload,
                });
            }
        }

        state.events.extend(staged.iter().cloned());
        state.unique_constraints = unique_constraints;
        state.position = position;
        debug!(events = staged.len(), position, "push committed");
        Ok(staged)
    }

    async fn filter(&self, query: &SearchQuery) -> Result<Vec<Event>, EventstoreError> {
        let state = self.lock()?;
        let mut events: Vec<Event> = Self::matching(&state, query).cloned().collect();
        if query.desc {
            events.reverse();
        }
        if query.limit > 0 {
            events.truncate(usize::try_from(query.limit).unwrap_or(usize::MAX));
        }
        Ok(events)
    }

    async fn latest_sequence(&self, query: &SearchQuery) -> Result<u64, EventstoreError> {
        let state = self.lock()?;
        Ok(Self::matching(&state, query)
            .map(|event| event.sequence)
            .max()
            .unwrap_or(0))
    }
}

fn matches_query(event: &Event, query: &SearchQuery) -> bool {
    query
        .filters
        .iter()
        .any(|group| group.iter().all(|filter| matches_filter(event, filter)))
}

fn matches_filter(event: &Event, filter: &Filter) -> bool {
    let text = match filter.field {
        Field::AggregateType => Some(event.aggregate_type.as_str()),
        Field::AggregateId => Some(event.aggregate_id.as_str()),
        Field::EventType => Some(event.event_type.as_str()),
        Field::ResourceOwner => Some(event.resource_owner.as_str()),
        Field::Sequence | Field::EventData => None,
    };

    match (filter.operation, &filter.value, text) {
        (Operation::Equals, FilterValue::Text(value), Some(text)) => text == value,
        (Operation::In, FilterValue::TextList(values), Some(text)) => {
            values.iter().any(|value| value == text)
        }
        (Operation::Equals, FilterValue::Sequence(sequence), None) => event.sequence == *sequence,
        (Operation::Greater, FilterValue::Sequence(sequence), None) => event.sequence > *sequence,
        (Operation::Less, FilterValue::Sequence(sequence), None) => event.sequence < *sequence,
        (Operation::JsonContains, FilterValue::Json(pattern), None) => event
            .payload
            .as_ref()
            .is_some_and(|payload| json_contains(payload, pattern)),
        _ => false,
    }
}

/// `PostgreSQL` `@>` containment on JSON values.
fn json_contains(document: &Value, pattern: &Value) -> bool {
    match (document, pattern) {
        (Value::Object(document), Value::Object(pattern)) => pattern.iter().all(|(key, value)| {
            document
                .get(key)
                .is_some_and(|candidate| json_contains(candidate, value))
        }),
        (Value::Array(document), Value::Array(pattern)) => pattern
            .iter()
            .all(|value| document.iter().any(|candidate| json_contains(candidate, value))),
        (document, pattern) => document == pattern,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_json_contains_nested_objects() {
        let document = json!({"domain": "a.com", "meta": {"verified": true, "tags": ["x", "y"]}});

        assert!(json_contains(&document, &json!({"domain": "a.com"})));
        assert!(json_contains(&document, &json!({"meta": {"verified": true}})));
        assert!(json_contains(&document, &json!({"meta": {"tags": ["y"]}})));
        assert!(json_contains(&document, &json!({})));
        assert!(!json_contains(&document, &json!({"domain": "b.com"})));
        assert!(!json_contains(&document, &json!({"missing": null})));
    }
}
