//! Integration tests for `PgEventRepository`.
//!
//! Run with `DATABASE_URL` pointing at a disposable `PostgreSQL` server and
//! `cargo test -- --ignored`.

use gatekeeper_core::error::EventstoreError;
use gatekeeper_core::event::{AggregateType, Editor, EventType};
use gatekeeper_core::repository::{AggregatePush, EventRepository, PendingEvent};
use gatekeeper_core::search_query::{Columns, SearchQueryBuilder};
use gatekeeper_core::unique_constraint::UniqueConstraint;
use gatekeeper_event_store::pg_event_repository::PgEventRepository;
use serde_json::json;
use sqlx::PgPool;

/// Helper to build a push with sensible defaults.
fn make_push(aggregate_id: &str, expected_sequence: u64, count: usize) -> AggregatePush {
    AggregatePush {
        aggregate_id: aggregate_id.to_owned(),
        aggregate_type: AggregateType::from("org"),
        resource_owner: aggregate_id.to_owned(),
        expected_sequence,
        events: (0..count)
            .map(|i| PendingEvent {
                event_type: EventType::from("org.domain.added"),
                aggregate_version: "v1".to_owned(),
                editor: Editor::new("admin", "tests"),
                payload: Some(json!({ "domain": format!("d{i}.example.com") })),
            })
            .collect(),
        unique_constraints: Vec::new(),
    }
}

fn stream(aggregate_id: &str) -> SearchQueryBuilder {
    let aggregate_id = aggregate_id.to_owned();
    SearchQueryBuilder::new(Columns::Event)
        .add_query(move |q| q.aggregate_types(["org"]).aggregate_ids([aggregate_id]))
}

// --- push + filter round-trip ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_push_and_filter_preserve_order_and_payload(pool: PgPool) {
    // Arrange
    let repo = PgEventRepository::new(pool);

    // Act
    let stored = repo.push(vec![make_push("org-1", 0, 3)]).await.unwrap();
    let loaded = repo
        .filter(&stream("org-1").build().unwrap())
        .await
        .unwrap();

    // Assert
    assert_eq!(stored, loaded);
    let sequences: Vec<u64> = loaded.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    assert_eq!(loaded[2].payload, Some(json!({"domain": "d2.example.com"})));
}

// --- concurrency ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_stale_push_is_rejected_and_rolled_back(pool: PgPool) {
    // Arrange
    let repo = PgEventRepository::new(pool);
    repo.push(vec![make_push("org-1", 0, 1)]).await.unwrap();

    // Act
    let result = repo
        .push(vec![make_push("org-2", 0, 1), make_push("org-1", 0, 1)])
        .await;

    // Assert
    match result {
        Err(EventstoreError::ConcurrencyConflict {
            expected, actual, ..
        }) => {
            assert_eq!(expected, 0);
            assert_eq!(actual, 1);
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
    let org_2 = repo
        .filter(&stream("org-2").build().unwrap())
        .await
        .unwrap();
    assert!(org_2.is_empty());
}

// --- unique constraints ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_unique_constraint_collision(pool: PgPool) {
    // Arrange
    let repo = PgEventRepository::new(pool);
    let mut first = make_push("org-1", 0, 1);
    first.unique_constraints = vec![UniqueConstraint::add("org_domain", "a.com", "domain taken")];
    repo.push(vec![first]).await.unwrap();
    let mut second = make_push("org-2", 0, 1);
    second.unique_constraints = vec![UniqueConstraint::add("org_domain", "a.com", "domain taken")];

    // Act
    let result = repo.push(vec![second]).await;

    // Assert
    match result {
        Err(EventstoreError::UniqueConstraintViolation { message, .. }) => {
            assert_eq!(message, "domain taken");
        }
        other => panic!("expected UniqueConstraintViolation, got {other:?}"),
    }
}

// --- latest sequence ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_latest_sequence(pool: PgPool) {
    // Arrange
    let repo = PgEventRepository::new(pool);
    repo.push(vec![make_push("org-1", 0, 2)]).await.unwrap();

    // Act
    let existing = repo
        .latest_sequence(&stream("org-1").columns(Columns::MaxSequence).build().unwrap())
        .await
        .unwrap();
    let missing = repo
        .latest_sequence(&stream("org-9").columns(Columns::MaxSequence).build().unwrap())
        .await
        .unwrap();

    // Assert
    assert_eq!(existing, 2);
    assert_eq!(missing, 0);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_filter_by_payload_containment(pool: PgPool) {
    // Arrange
    let repo = PgEventRepository::new(pool);
    repo.push(vec![make_push("org-1", 0, 3)]).await.unwrap();
    let query = SearchQueryBuilder::new(Columns::Event).add_query(|q| {
        q.aggregate_types(["org"])
            .event_data(json!({"domain": "d1.example.com"}))
    });

    // Act
    let events = repo.filter(&query.build().unwrap()).await.unwrap();

    // Assert
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].sequence, 2);
}
