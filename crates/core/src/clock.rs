//! Time source used to stamp deletions.

use std::sync::Mutex;

use chrono::{Duration, Utc};

use crate::types::Timestamp;
use crate::value::normalize_timestamp;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        normalize_timestamp(Utc::now())
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(normalize_timestamp(start)),
        }
    }

    pub fn set(&self, at: Timestamp) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = normalize_timestamp(at);
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = normalize_timestamp(*now + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_moves_only_on_request() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::hours(2));
        assert_eq!(clock.now(), start + Duration::hours(2));

        clock.set(start - Duration::days(2));
        assert_eq!(clock.now(), start - Duration::days(2));
    }

    #[test]
    fn test_manual_clock_advance_keeps_microsecond_precision() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);

        clock.advance(Duration::nanoseconds(1_500));
        assert_eq!(clock.now(), start + Duration::microseconds(1));
        assert_eq!(clock.now(), normalize_timestamp(clock.now()));

        clock.advance(Duration::nanoseconds(999));
        assert_eq!(clock.now(), start + Duration::microseconds(1), "sub-microsecond steps are dropped");
    }

    #[test]
    fn test_system_clock_is_microsecond_precise() {
        let now = SystemClock.now();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000, 0);
    }
}
