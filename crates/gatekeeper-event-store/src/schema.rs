//! Event store database schema.

/// Table holding the append-only event log.
pub const EVENTS_TABLE: &str = "events";

/// Table holding claimed unique constraints.
pub const UNIQUE_CONSTRAINTS_TABLE: &str = "unique_constraints";

/// Columns selected when loading events, in `EventRow` order.
pub const EVENT_COLUMNS: &str = "position, event_id, aggregate_type, aggregate_id, \
     aggregate_version, resource_owner, event_type, sequence, previous_sequence, \
     creation_date, editor_user, editor_service, payload";
