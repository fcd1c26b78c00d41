//! Hand-driven clock

use grant_common::Clock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// [`Clock`] that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn set_millis(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance_millis(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.advance_millis(by.as_millis() as i64);
    }
}

impl Default for ManualClock {
    /// 2024-06-01T00:00:00Z
    fn default() -> Self {
        Self::new(1_717_200_000_000)
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
