//! Time source abstraction.
//!
//! Lock expiry is evaluated lazily against the injected clock on every read
//! and write, so tests move time forward with [`ManualClock`] instead of
//! sleeping.

use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Unix epoch milliseconds.
pub type EpochMillis = i64;

/// Source of "now" for expiry and audit timestamps.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> EpochMillis;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> EpochMillis {
        Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: EpochMillis) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: EpochMillis) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now_ms.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> EpochMillis {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Formats epoch milliseconds as an RFC 3339 UTC timestamp.
///
/// Out-of-range values render as the raw millisecond count.
pub fn to_iso8601(epoch_ms: EpochMillis) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms)
        .map(|value| value.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| epoch_ms.to_string())
}

/// Whole seconds left until `expires_at`, never negative.
pub fn seconds_until(expires_at: EpochMillis, now: EpochMillis) -> i64 {
    (expires_at - now).max(0) / 1000
}

#[cfg(test)]
mod tests {
    use super::{seconds_until, to_iso8601, Clock, ManualClock};
    use std::time::Duration;

    #[test]
    fn manual_clock_advances_monotonically() {
        let clock = ManualClock::new(1_000);
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now_ms(), 3_000);
        clock.set(10);
        assert_eq!(clock.now_ms(), 10);
    }

    #[test]
    fn iso8601_uses_utc_with_millis() {
        assert_eq!(to_iso8601(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(to_iso8601(90_500), "1970-01-01T00:01:30.500Z");
    }

    #[test]
    fn seconds_until_clamps_at_zero() {
        assert_eq!(seconds_until(10_000, 1_000), 9);
        assert_eq!(seconds_until(1_000, 10_000), 0);
    }
}
