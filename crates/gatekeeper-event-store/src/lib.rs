//! Storage backends for the Gatekeeper eventstore.
//!
//! [`InMemoryEventRepository`](in_memory::InMemoryEventRepository) serves
//! tests and embedded use; [`PgEventRepository`](pg_event_repository::PgEventRepository)
//! persists to `PostgreSQL` using the schema in `migrations/`.

pub mod config;
pub mod in_memory;
pub mod pg_event_repository;
pub mod schema;
pub mod sql;
