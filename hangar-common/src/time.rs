//! Timeline utilities
//!
//! All booking times live on a single absolute UTC timeline. Start instants
//! and durations are quantized to a half-hour grid; durations are bounded.

use chrono::{DateTime, Timelike, Utc};

/// Quantization step for start instants and durations, in minutes
pub const STEP_MINUTES: i64 = 30;

/// Minimum booking duration, in minutes (one hour)
pub const MIN_DURATION_MINUTES: i64 = 60;

/// Maximum booking duration, in minutes (sixteen hours)
pub const MAX_DURATION_MINUTES: i64 = 960;

/// Maximum recurrence span past the anchor, in days
pub const MAX_RECURRENCE_SPAN_DAYS: i64 = 60;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Check that an instant sits on the half-hour grid (minute 0 or 30,
/// no seconds or sub-second part)
pub fn on_grid(instant: DateTime<Utc>) -> bool {
    instant.minute() % (STEP_MINUTES as u32) == 0
        && instant.second() == 0
        && instant.nanosecond() == 0
}

/// Check that a duration is positive, within bounds, and a whole number
/// of grid steps
pub fn valid_duration(minutes: i64) -> bool {
    (MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&minutes)
        && minutes % STEP_MINUTES == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
    }

    #[test]
    fn test_on_grid_accepts_half_hours() {
        let t = Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap();
        assert!(on_grid(t));
        let t = Utc.with_ymd_and_hms(2025, 1, 6, 9, 30, 0).unwrap();
        assert!(on_grid(t));
    }

    #[test]
    fn test_on_grid_rejects_off_grid_instants() {
        let t = Utc.with_ymd_and_hms(2025, 1, 6, 9, 15, 0).unwrap();
        assert!(!on_grid(t));
        let t = Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 1).unwrap();
        assert!(!on_grid(t));
    }

    #[test]
    fn test_valid_duration_bounds() {
        assert!(valid_duration(60));
        assert!(valid_duration(90));
        assert!(valid_duration(960));
        assert!(!valid_duration(30)); // below minimum
        assert!(!valid_duration(0));
        assert!(!valid_duration(-60));
        assert!(!valid_duration(990)); // above maximum
        assert!(!valid_duration(75)); // off the grid
    }
}
