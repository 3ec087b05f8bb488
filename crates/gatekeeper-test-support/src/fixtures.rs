//! Event fixtures for reducer tests.

use chrono::{DateTime, TimeZone, Utc};
use gatekeeper_core::event::{AggregateType, Event, EventType};
use serde_json::Value;
use uuid::Uuid;

/// The point in time used by `FixedClock::default()` and `stored_event`.
///
/// # Panics
///
/// Never; the date is a valid constant.
#[must_use]
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
}

/// Builds a persisted event as a backend would return it.
///
/// The creation date is `fixed_time()` plus `sequence` seconds and the
/// position equals the sequence.
#[must_use]
pub fn stored_event(
    aggregate_type: &str,
    aggregate_id: &str,
    resource_owner: &str,
    event_type: &str,
    sequence: u64,
    payload: Option<Value>,
) -> Event {
    Event {
        event_id: Uuid::now_v7(),
        aggregate_id: aggregate_id.to_owned(),
        aggregate_type: AggregateType::from(aggregate_type),
        resource_owner: resource_owner.to_owned(),
        aggregate_version: "v1".to_owned(),
        event_type: EventType::from(event_type),
        sequence,
        previous_sequence: sequence.saturating_sub(1),
        position: sequence,
        creation_date: fixed_time()
            + chrono::Duration::seconds(i64::try_from(sequence).unwrap_or(i64::MAX)),
        editor_user: "user-1".to_owned(),
        editor_service: "test".to_owned(),
        payload,
    }
}
