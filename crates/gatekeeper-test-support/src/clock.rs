//! Test clock: deterministic `Clock` implementation for tests.

use chrono::{DateTime, Utc};
use gatekeeper_core::clock::Clock;

use crate::fixtures::fixed_time;

/// A clock that always returns a fixed point in time.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Default for FixedClock {
    fn default() -> Self {
        Self(fixed_time())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
