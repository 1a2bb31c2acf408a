//! Time access as an injected capability.
//!
//! Allocation, archival, and wave sequencing all depend on "today";
//! passing the clock in keeps those operations deterministic under test.

use chrono::{DateTime, NaiveDate, Utc};

/// Source of the current time for every engine operation
pub trait TimeProvider: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall-clock time provider used in production
pub struct SystemClock;

impl TimeProvider for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed time provider for deterministic tests
pub struct FixedClock(pub DateTime<Utc>);

impl TimeProvider for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
