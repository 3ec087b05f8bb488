//! Property-based tests using proptest.
//!
//! These tests verify invariants of the in-memory backend and the query
//! builder that should hold for any valid input.

use std::collections::HashMap;

use gatekeeper_core::error::EventstoreError;
use gatekeeper_core::event::{AggregateType, Editor, EventType};
use gatekeeper_core::repository::{AggregatePush, EventRepository, PendingEvent};
use gatekeeper_core::search_query::{Columns, FilterValue, Operation, SearchQueryBuilder};
use gatekeeper_event_store::in_memory::InMemoryEventRepository;
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Strategies
// ============================================================================

/// A push of `1..4` events to one of three streams.
fn arb_push() -> impl Strategy<Value = (usize, usize)> {
    (0..3usize, 1..4usize)
}

fn arb_aggregate_types() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{1,8}", 1..5)
}

fn pending(count: usize) -> Vec<PendingEvent> {
    (0..count)
        .map(|i| PendingEvent {
            event_type: EventType::from("user.added"),
            aggregate_version: "v1".to_owned(),
            editor: Editor::new("admin", "proptest"),
            payload: Some(json!({ "index": i })),
        })
        .collect()
}

fn push(stream: usize, expected_sequence: u64, count: usize) -> AggregatePush {
    AggregatePush {
        aggregate_id: format!("user-{stream}"),
        aggregate_type: AggregateType::from("user"),
        resource_owner: "org-1".to_owned(),
        expected_sequence,
        events: pending(count),
        unique_constraints: Vec::new(),
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

// ============================================================================
// Backend properties
// ============================================================================

proptest! {
    #[test]
    fn prop_stream_sequences_are_gapless(pushes in prop::collection::vec(arb_push(), 1..20)) {
        let repository = InMemoryEventRepository::new();
        let mut heads: HashMap<usize, u64> = HashMap::new();

        runtime().block_on(async {
            for (stream, count) in &pushes {
                let head = heads.entry(*stream).or_insert(0);
                let stored = repository.push(vec![push(*stream, *head, *count)]).await.unwrap();
                *head += stored.len() as u64;
            }
        });

        let events = repository.events().unwrap();
        let mut seen: HashMap<&str, u64> = HashMap::new();
        let mut last_position = 0;
        for event in &events {
            let previous = seen.entry(event.aggregate_id.as_str()).or_insert(0);
            prop_assert_eq!(event.sequence, *previous + 1);
            prop_assert_eq!(event.previous_sequence, *previous);
            prop_assert!(event.position > last_position);
            *previous = event.sequence;
            last_position = event.position;
        }
    }

    #[test]
    fn prop_stale_expectation_always_conflicts(existing in 1..6usize, stale in 0..20u64) {
        prop_assume!(stale != existing as u64);
        let repository = InMemoryEventRepository::new();

        let result = runtime().block_on(async {
            repository.push(vec![push(0, 0, existing)]).await.unwrap();
            repository.push(vec![push(0, stale, 1)]).await
        });

        match result {
            Err(EventstoreError::ConcurrencyConflict { expected, actual, .. }) => {
                prop_assert_eq!(expected, stale);
                prop_assert_eq!(actual, existing as u64);
            }
            other => prop_assert!(false, "expected ConcurrencyConflict, got {:?}", other),
        }
        prop_assert_eq!(repository.events().unwrap().len(), existing);
    }
}

// ============================================================================
// Query builder properties
// ============================================================================

proptest! {
    #[test]
    fn prop_single_type_compiles_to_equals_many_to_in(types in arb_aggregate_types()) {
        let count = types.len();

        let query = SearchQueryBuilder::new(Columns::Event)
            .add_query(|q| q.aggregate_types(types))
            .build()
            .unwrap();

        let filter = &query.filters[0][0];
        if count == 1 {
            prop_assert_eq!(filter.operation, Operation::Equals);
            prop_assert!(matches!(filter.value, FilterValue::Text(_)));
        } else {
            prop_assert_eq!(filter.operation, Operation::In);
            prop_assert!(matches!(&filter.value, FilterValue::TextList(values) if values.len() == count));
        }
    }

    #[test]
    fn prop_sequence_bounds_mirror_with_direction(greater in 1..1000u64, desc in any::<bool>()) {
        let builder = SearchQueryBuilder::new(Columns::Event)
            .add_query(|q| q.aggregate_types(["user"]).sequence_greater(greater));
        let builder = if desc { builder.order_desc() } else { builder.order_asc() };

        let query = builder.build().unwrap();

        let expected = if desc { Operation::Less } else { Operation::Greater };
        prop_assert_eq!(query.filters[0][1].operation, expected);
        prop_assert_eq!(&query.filters[0][1].value, &FilterValue::Sequence(greater));
    }
}
