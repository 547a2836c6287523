//! Anomaly detector bank
//!
//! ## Overview
//!
//! After the processor chain, every fix is judged by a bank of
//! detectors, each specialised in one failure mode:
//!
//! - [`TimeGapDetector`] - the fix is too old relative to "now";
//! - [`SpeedDetector`] - reaching the fix from recent history would
//!   require implausible speed (teleport);
//! - [`StatisticalDetector`] - the fix is a multi-sigma outlier against
//!   its own sliding window;
//! - [`PatternDetector`] - the fix matches a named bad-data signature.
//!
//! A [`CompositeDetector`] fuses the per-detector verdicts under a
//! configurable [`VerdictPolicy`] (majority vote, weighted average, or
//! any-over-threshold). Context passed to `detect` is a read-only slice
//! of recent accepted fixes; detectors that need deeper history own
//! their own locked window.

mod composite;
mod pattern;
mod speed;
mod statistical;
mod time_gap;

pub use composite::{CompositeDetector, VerdictPolicy};
pub use pattern::{FixPattern, PatternDetector, Region};
pub use speed::SpeedDetector;
pub use statistical::StatisticalDetector;
pub use time_gap::TimeGapDetector;

use std::collections::BTreeMap;

use crate::fix::Fix;

/// Outcome of one detector (or the composite) for one fix.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub is_anomaly: bool,
    /// How sure the detector is, in [0, 1]
    pub confidence: f64,
    /// Detector-specific diagnostics
    pub info: BTreeMap<String, String>,
}

impl Verdict {
    /// The "nothing wrong" verdict.
    pub fn normal() -> Self {
        Self {
            is_anomaly: false,
            confidence: 0.0,
            info: BTreeMap::new(),
        }
    }

    pub fn anomaly(confidence: f64) -> Self {
        Self {
            is_anomaly: true,
            confidence: confidence.clamp(0.0, 1.0),
            info: BTreeMap::new(),
        }
    }

    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info.insert(key.into(), value.into());
        self
    }
}

/// One anomaly detector.
///
/// `detect` takes `&self`: detectors that mutate internal history do so
/// behind their own lock, so the bank can be shared with readers.
pub trait AnomalyDetector: Send + Sync {
    /// Judge a fix against the read-only context. Must not mutate
    /// detector-owned history - acceptance is not decided here.
    fn detect(&self, fix: &Fix, context: &[Fix]) -> Verdict;

    /// Feed an accepted fix into detector-owned history.
    ///
    /// The orchestrator calls this only after the composite verdict
    /// accepted the fix, so a fix one detector waves through but the
    /// bank as a whole rejects never contaminates any window.
    fn record(&self, _fix: &Fix) {}

    fn name(&self) -> &'static str;

    fn enabled(&self) -> bool {
        true
    }
}
