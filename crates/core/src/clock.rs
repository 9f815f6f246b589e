//! Wall-clock source and TTL arithmetic.
//!
//! Timestamps are milliseconds since the Unix epoch, matching what the store
//! persists in its `timestamp` columns.

use std::time::Duration;

/// Default time-to-live for cached entries: 24 hours.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_millis(86_400_000);

/// Source of the current time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Whether an entry written at `timestamp` is still fresh at `now` for the given max age.
///
/// Fresh means strictly younger than `max_age`; an entry exactly `max_age` old has expired.
pub fn is_valid(timestamp: i64, max_age: Duration, now: i64) -> bool {
    now.saturating_sub(timestamp) < duration_ms(max_age)
}

/// Timestamp at or below which an entry has expired.
pub fn expiry_cutoff(max_age: Duration, now: i64) -> i64 {
    now.saturating_sub(duration_ms(max_age))
}

pub(crate) fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}
