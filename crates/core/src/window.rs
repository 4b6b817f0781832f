//! Recovery window arithmetic.

use chrono::Duration;

use crate::types::Timestamp;

/// Closed interval `[reference - window, reference]`.
pub fn window_bounds(reference: Timestamp, window: Duration) -> (Timestamp, Timestamp) {
    (reference - window, reference)
}

/// Returns `true` if `deleted_at` falls inside the window ending at `reference`.
pub fn inside_window(deleted_at: Timestamp, reference: Timestamp, window: Duration) -> bool {
    let (start, end) = window_bounds(reference, window);
    deleted_at >= start && deleted_at <= end
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn t() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let window = Duration::hours(1);
        assert!(inside_window(t(), t(), window));
        assert!(inside_window(t() - window, t(), window));
        assert!(!inside_window(t() - window - Duration::seconds(1), t(), window));
    }

    #[test]
    fn test_later_deletions_are_outside() {
        assert!(!inside_window(t() + Duration::seconds(1), t(), Duration::days(3)));
    }

    #[test]
    fn test_two_day_old_dependent() {
        let dependent = t() - Duration::days(2);
        assert!(!inside_window(dependent, t(), Duration::hours(1)));
        assert!(inside_window(dependent, t(), Duration::days(3)));
    }
}
