//! Timestamp helpers
//!
//! All persisted timestamps are unix epoch milliseconds stored in INTEGER
//! columns. Chrono is used only at the edges (expiry arithmetic, display).

use chrono::{DateTime, Duration, Utc};

/// Current time as unix epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Epoch milliseconds a number of days from now (subscription expiry)
pub fn days_from_now_ms(days: i64) -> i64 {
    (Utc::now() + Duration::days(days)).timestamp_millis()
}

/// Convert epoch milliseconds to an RFC 3339 string for API responses
pub fn ms_to_rfc3339(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_from_now_is_in_the_future() {
        let now = now_ms();
        let later = days_from_now_ms(30);
        // 30 days in ms, allow a second of slack for test execution
        let expected = now + 30 * 24 * 3600 * 1000;
        assert!(later >= expected - 1000 && later <= expected + 1000);
    }

    #[test]
    fn test_ms_to_rfc3339_epoch() {
        assert!(ms_to_rfc3339(0).starts_with("1970-01-01T00:00:00"));
    }
}
