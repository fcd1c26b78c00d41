//! Wall-clock abstraction
//!
//! Every timestamp the coordinator and the sync queue record is epoch
//! milliseconds read through a [`Clock`], so tests can move time by hand.

use std::fmt::Debug;

/// Source of epoch-millisecond timestamps
pub trait Clock: Send + Sync + Debug {
    fn now_millis(&self) -> i64;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_recent() {
        // 2024-01-01T00:00:00Z
        assert!(SystemClock.now_millis() > 1_704_067_200_000);
    }
}
