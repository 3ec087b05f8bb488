//! Shared test mocks and utilities for the Gatekeeper eventstore.

mod clock;
mod fixtures;
mod logging;
mod repository;

pub use clock::FixedClock;
pub use fixtures::{fixed_time, stored_event};
pub use logging::init_tracing;
pub use repository::{EmptyEventRepository, FailingEventRepository, RecordingEventRepository};
