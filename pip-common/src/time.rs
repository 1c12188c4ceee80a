//! Timestamp utilities
//!
//! Store timestamps are persisted as microseconds since the Unix epoch so that
//! SQLite can order and `MAX()` them numerically.

use chrono::{DateTime, Datelike, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current calendar year (UTC)
pub fn current_year() -> i32 {
    Utc::now().year()
}

/// Convert a timestamp to microseconds since the epoch
pub fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

/// Convert microseconds since the epoch back to a timestamp
///
/// Out-of-range values clamp to the epoch rather than panicking.
pub fn from_micros(micros: i64) -> DateTime<Utc> {
    Utc.timestamp_micros(micros)
        .single()
        .unwrap_or_default()
}

/// Whole hours elapsed between `epoch` and `at` (zero if `at` precedes `epoch`)
pub fn hours_since(epoch: DateTime<Utc>, at: DateTime<Utc>) -> u64 {
    (at - epoch).num_hours().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
    }

    #[test]
    fn test_micros_round_trip_preserves_precision() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap() + Duration::microseconds(17);
        assert_eq!(from_micros(to_micros(ts)), ts);
    }

    #[test]
    fn test_micros_ordering_matches_time_ordering() {
        let earlier = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let later = earlier + Duration::milliseconds(1);
        assert!(to_micros(earlier) < to_micros(later));
    }

    #[test]
    fn test_hours_since() {
        let epoch = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(hours_since(epoch, epoch), 0);
        assert_eq!(hours_since(epoch, epoch + Duration::minutes(59)), 0);
        assert_eq!(hours_since(epoch, epoch + Duration::hours(5)), 5);
        // Before the epoch saturates at zero
        assert_eq!(hours_since(epoch, epoch - Duration::hours(3)), 0);
    }
}
