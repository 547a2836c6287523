//! Staleness filter stage
//!
//! Invalidates fixes that are too old relative to the pipeline clock,
//! and fixes whose coordinates are outside their ranges (input-fault
//! recovery: malformed input is marked `Invalid` here and dropped by the
//! consumer, never propagated as an error).

use std::sync::Arc;

use tracing::debug;

use super::ProcessorStage;
use crate::constants::processors::{MAX_TIME_DIFF_MS, PRIORITY_STALENESS};
use crate::errors::StageError;
use crate::fix::{Fix, FixStatus};
use crate::time::TimeSource;

pub struct StalenessFilter {
    max_time_diff_ms: u64,
    clock: Arc<dyn TimeSource>,
}

impl StalenessFilter {
    pub fn new(max_time_diff_ms: u64, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            max_time_diff_ms,
            clock,
        }
    }

    pub fn with_default_cutoff(clock: Arc<dyn TimeSource>) -> Self {
        Self::new(MAX_TIME_DIFF_MS, clock)
    }
}

impl ProcessorStage for StalenessFilter {
    fn process(&mut self, mut fix: Fix) -> Result<Fix, StageError> {
        if !fix.latitude.is_finite() {
            return Err(StageError::NonFinite { field: "latitude" });
        }
        if !fix.longitude.is_finite() {
            return Err(StageError::NonFinite { field: "longitude" });
        }

        if !fix.coordinates_in_range() || fix.time == 0 {
            debug!(lat = fix.latitude, lon = fix.longitude, "malformed fix");
            fix.status = FixStatus::Invalid;
            return Ok(fix);
        }

        let age_ms = self.clock.now().saturating_sub(fix.time);
        if age_ms > self.max_time_diff_ms {
            debug!(age_ms, max = self.max_time_diff_ms, "stale fix");
            fix.status = FixStatus::Invalid;
        }

        Ok(fix)
    }

    fn name(&self) -> &'static str {
        "staleness-filter"
    }

    fn priority(&self) -> i32 {
        PRIORITY_STALENESS
    }
}
