//! Time-gap detector
//!
//! Flags fixes whose capture time lags "now" by more than the allowed
//! gap. Confidence grows with the overshoot ratio and saturates at 1.

use std::sync::Arc;

use super::{AnomalyDetector, Verdict};
use crate::constants::anomaly::MAX_TIME_GAP_MS;
use crate::fix::Fix;
use crate::time::TimeSource;

pub struct TimeGapDetector {
    max_gap_ms: u64,
    clock: Arc<dyn TimeSource>,
}

impl TimeGapDetector {
    pub fn new(max_gap_ms: u64, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            max_gap_ms: max_gap_ms.max(1),
            clock,
        }
    }

    pub fn with_default_gap(clock: Arc<dyn TimeSource>) -> Self {
        Self::new(MAX_TIME_GAP_MS, clock)
    }
}

impl AnomalyDetector for TimeGapDetector {
    fn detect(&self, fix: &Fix, _context: &[Fix]) -> Verdict {
        let gap_ms = self.clock.now().saturating_sub(fix.time);
        if gap_ms <= self.max_gap_ms {
            return Verdict::normal();
        }

        let ratio = gap_ms as f64 / self.max_gap_ms as f64;
        Verdict::anomaly(ratio.min(1.0))
            .with_info("type", "time-gap")
            .with_info("gapMs", gap_ms.to_string())
            .with_info("maxGapMs", self.max_gap_ms.to_string())
    }

    fn name(&self) -> &'static str {
        "time-gap"
    }
}
