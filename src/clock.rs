//! Engine time source.
//!
//! Every due date, window calculation and removal time is derived from the
//! engine clock rather than `Utc::now()` directly, so that scheduling can be
//! driven deterministically in tests and in the `cleanup` CLI.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// A source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that can be pinned and moved by hand.
///
/// Unpinned, it falls through to the wall clock.
#[derive(Debug, Default)]
pub struct MockClock {
    current: Mutex<Option<DateTime<Utc>>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock pinned at `time`.
    pub fn at(time: DateTime<Utc>) -> Arc<Self> {
        let clock = Self::new();
        clock.set(time);
        Arc::new(clock)
    }

    pub fn set(&self, time: DateTime<Utc>) {
        *self.current.lock() = Some(time);
    }

    /// Move the pinned time forward. Pins the wall clock first if unpinned.
    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock();
        let base = current.unwrap_or_else(Utc::now);
        *current = Some(base + by);
    }

    pub fn reset(&self) {
        *self.current.lock() = None;
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        self.current.lock().unwrap_or_else(Utc::now)
    }
}
