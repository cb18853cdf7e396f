/*!
 * Small helpers shared across the zflow crates.
 */
use std::time::Duration;

use chrono::Utc;

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a whole number of seconds into a duration, treating zero as "disabled"
pub fn interval_from_secs(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_millis_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn test_interval_from_secs() {
        assert_eq!(interval_from_secs(0), None);
        assert_eq!(interval_from_secs(5), Some(Duration::from_secs(5)));
    }
}
