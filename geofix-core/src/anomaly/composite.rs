//! Composite detector: fuses per-detector verdicts into one
//!
//! Three fusion rules:
//! - **Majority vote**: anomaly when at least `min_votes` detectors
//!   agree; confidence is the mean of the agreeing confidences.
//! - **Weighted average**: confidence is the weight-normalised sum of
//!   all detector confidences; anomaly when it reaches the threshold.
//! - **Any over threshold**: anomaly when any single detector is both
//!   positive and confident enough; confidence is the maximum.

use tracing::debug;

use super::{AnomalyDetector, Verdict};
use crate::constants::anomaly::MIN_VOTES;
use crate::fix::Fix;

/// Rule for fusing per-detector verdicts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VerdictPolicy {
    MajorityVote { min_votes: usize },
    WeightedAverage { threshold: f64 },
    AnyOver { threshold: f64 },
}

impl Default for VerdictPolicy {
    fn default() -> Self {
        VerdictPolicy::MajorityVote { min_votes: MIN_VOTES }
    }
}

pub struct CompositeDetector {
    detectors: Vec<(Box<dyn AnomalyDetector>, f64)>,
    policy: VerdictPolicy,
}

impl CompositeDetector {
    pub fn new(policy: VerdictPolicy) -> Self {
        Self {
            detectors: Vec::new(),
            policy,
        }
    }

    pub fn with_detector(mut self, detector: Box<dyn AnomalyDetector>, weight: f64) -> Self {
        self.detectors.push((detector, weight.max(0.0)));
        self
    }

    pub fn add_detector(&mut self, detector: Box<dyn AnomalyDetector>, weight: f64) {
        self.detectors.push((detector, weight.max(0.0)));
    }

    pub fn policy(&self) -> VerdictPolicy {
        self.policy
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|(d, _)| d.name()).collect()
    }

    fn fuse_majority(results: &[Verdict], min_votes: usize) -> Verdict {
        let agreeing: Vec<&Verdict> = results.iter().filter(|v| v.is_anomaly).collect();
        if agreeing.len() < min_votes {
            return Verdict::normal();
        }

        let confidence =
            agreeing.iter().map(|v| v.confidence).sum::<f64>() / agreeing.len() as f64;
        Verdict::anomaly(confidence)
            .with_info("rule", "majority-vote")
            .with_info("votes", agreeing.len().to_string())
    }

    fn fuse_weighted(results: &[Verdict], weights: &[f64], threshold: f64) -> Verdict {
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Verdict::normal();
        }

        let confidence = results
            .iter()
            .zip(weights)
            .map(|(v, w)| v.confidence * w)
            .sum::<f64>()
            / total;
        if confidence < threshold {
            return Verdict::normal();
        }

        Verdict::anomaly(confidence).with_info("rule", "weighted-average")
    }

    fn fuse_any_over(results: &[Verdict], threshold: f64) -> Verdict {
        let best = results
            .iter()
            .filter(|v| v.is_anomaly && v.confidence >= threshold)
            .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).expect("finite"));

        match best {
            // Max semantics: the winning detector's diagnostics ride along
            Some(v) => v.clone().with_info("rule", "threshold"),
            None => Verdict::normal(),
        }
    }
}

impl Default for CompositeDetector {
    fn default() -> Self {
        Self::new(VerdictPolicy::default())
    }
}

impl AnomalyDetector for CompositeDetector {
    fn detect(&self, fix: &Fix, context: &[Fix]) -> Verdict {
        if self.detectors.is_empty() {
            return Verdict::normal();
        }

        let mut results = Vec::with_capacity(self.detectors.len());
        let mut weights = Vec::with_capacity(self.detectors.len());
        for (detector, weight) in &self.detectors {
            if !detector.enabled() {
                continue;
            }
            let verdict = detector.detect(fix, context);
            if verdict.is_anomaly {
                debug!(
                    detector = detector.name(),
                    confidence = verdict.confidence,
                    "detector flagged fix"
                );
            }
            results.push(verdict);
            weights.push(*weight);
        }
        if results.is_empty() {
            return Verdict::normal();
        }

        match self.policy {
            VerdictPolicy::MajorityVote { min_votes } => Self::fuse_majority(&results, min_votes),
            VerdictPolicy::WeightedAverage { threshold } => {
                Self::fuse_weighted(&results, &weights, threshold)
            }
            VerdictPolicy::AnyOver { threshold } => Self::fuse_any_over(&results, threshold),
        }
    }

    fn record(&self, fix: &Fix) {
        for (detector, _) in &self.detectors {
            detector.record(fix);
        }
    }

    fn name(&self) -> &'static str {
        "composite"
    }
}
