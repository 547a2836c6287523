//! Clock abstraction for the correction pipeline
//!
//! ## Overview
//!
//! Every time-sensitive decision in the pipeline (staleness, time-gap
//! anomalies, scene-check throttling, emission debouncing, cache expiry,
//! log rotation) goes through a [`TimeSource`] rather than reading the
//! system clock directly. This keeps the whole engine deterministic under
//! test: hand it a [`FixedClock`] and drive time by hand.
//!
//! ## Time sources
//!
//! 1. **Wall clock** ([`SystemClock`]): milliseconds since the Unix epoch.
//!    May jump when the host syncs time; used for fix timestamps because
//!    collectors stamp fixes in wall time.
//! 2. **Monotonic** ([`MonotonicClock`]): wall-anchored at construction,
//!    advanced by `Instant`. Never goes backwards, so interval math
//!    (debounce, rotation) stays sane across clock adjustments.
//! 3. **Fixed** ([`FixedClock`]): test clock, shared and steppable.
//!
//! Timestamps are `u64` milliseconds. That gives millisecond precision
//! and no overflow concerns on any realistic horizon.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Milliseconds since the Unix epoch (or an arbitrary test origin).
pub type Timestamp = u64;

/// Source of "now" for the pipeline.
///
/// Implementations must be cheap to call; the consumer loop reads the
/// clock once per fix and reuses the value across stages.
pub trait TimeSource: Send + Sync {
    /// Current time in milliseconds.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time source.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime, UNIX_EPOCH};

        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }
}

/// Monotonic time source anchored to the wall clock at construction.
///
/// Reads never decrease even if the system clock is adjusted backwards.
#[derive(Debug)]
pub struct MonotonicClock {
    origin_ms: Timestamp,
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin_ms: SystemClock.now(),
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn now(&self) -> Timestamp {
        self.origin_ms + self.origin.elapsed().as_millis() as Timestamp
    }
}

/// Steppable clock for tests.
///
/// Interior-atomic so one clock can be shared (via `Arc`) between a test
/// body and the engine under test.
#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicU64,
}

impl FixedClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Advance by `ms` milliseconds.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl TimeSource for FixedClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Saturating delta between two timestamps.
pub fn delta_ms(earlier: Timestamp, later: Timestamp) -> u64 {
    later.saturating_sub(earlier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new(1_000);
        assert_eq!(clock.now(), 1_000);

        clock.advance(500);
        assert_eq!(clock.now(), 1_500);

        clock.set(10_000);
        assert_eq!(clock.now(), 10_000);
    }

    #[test]
    fn delta_saturates() {
        assert_eq!(delta_ms(1_000, 1_500), 500);
        assert_eq!(delta_ms(1_500, 1_000), 0);
    }

    #[test]
    fn monotonic_never_decreases() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
