//! Accuracy filter stage
//!
//! Marks fixes whose reported accuracy falls outside the configured
//! window as `LowAccuracy`. Annotation only - the fix continues down the
//! chain and the fusion engine decides what low-accuracy input is worth.

use tracing::debug;

use super::ProcessorStage;
use crate::constants::processors::{MAX_ACCURACY_M, MIN_ACCURACY_M, PRIORITY_ACCURACY};
use crate::errors::StageError;
use crate::fix::{Fix, FixStatus};

pub struct AccuracyFilter {
    min_accuracy_m: f64,
    max_accuracy_m: f64,
}

impl AccuracyFilter {
    pub fn new(min_accuracy_m: f64, max_accuracy_m: f64) -> Self {
        Self {
            min_accuracy_m: min_accuracy_m.max(0.0),
            max_accuracy_m: max_accuracy_m.max(min_accuracy_m),
        }
    }
}

impl Default for AccuracyFilter {
    fn default() -> Self {
        Self::new(MIN_ACCURACY_M, MAX_ACCURACY_M)
    }
}

impl ProcessorStage for AccuracyFilter {
    fn process(&mut self, mut fix: Fix) -> Result<Fix, StageError> {
        if !fix.accuracy.is_finite() {
            return Err(StageError::NonFinite { field: "accuracy" });
        }

        if fix.status == FixStatus::Valid
            && (fix.accuracy < self.min_accuracy_m || fix.accuracy > self.max_accuracy_m)
        {
            debug!(
                accuracy = fix.accuracy,
                min = self.min_accuracy_m,
                max = self.max_accuracy_m,
                "accuracy out of range"
            );
            fix.status = FixStatus::LowAccuracy;
        }

        Ok(fix)
    }

    fn name(&self) -> &'static str {
        "accuracy-filter"
    }

    fn priority(&self) -> i32 {
        PRIORITY_ACCURACY
    }
}
