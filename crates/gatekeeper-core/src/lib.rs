//! Gatekeeper Core: event-sourcing primitives.
//!
//! This crate defines the building blocks every Gatekeeper service composes:
//! events and their registry of mappers, aggregates staged for a push, the
//! search query builder, reducers, and the storage contract the backends in
//! `gatekeeper-event-store` implement.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod event;
pub mod eventstore;
pub mod model;
pub mod registry;
pub mod repository;
pub mod search_query;
pub mod unique_constraint;
