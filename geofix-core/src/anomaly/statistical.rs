//! Statistical (z-score) detector
//!
//! Judges latitude, longitude and accuracy of a candidate against the
//! mean/stddev of the caller-provided context merged with the detector's
//! own sliding window. Any |z| above the threshold flags the fix;
//! accuracy uses a doubled threshold because reported accuracy is far
//! noisier than position.
//!
//! `detect` is pure over the window: the candidate only enters history
//! through `record`, which the orchestrator calls once the composite
//! verdict has accepted the fix. That keeps the invariant strict - a
//! fix any detector in the bank rejected never drags the statistics
//! toward itself. With an empty context and a cold window the verdict
//! is always "not anomaly".

use super::{AnomalyDetector, Verdict};
use crate::constants::anomaly::Z_THRESHOLD;
use crate::constants::processors::{OUTLIER_MIN_SAMPLES, OUTLIER_WINDOW};
use crate::fix::Fix;
use crate::window::FixWindow;

pub struct StatisticalDetector {
    window: FixWindow,
    z_threshold: f64,
    min_samples: usize,
}

impl StatisticalDetector {
    pub fn new(window_capacity: usize, z_threshold: f64, min_samples: usize) -> Self {
        Self {
            window: FixWindow::new(window_capacity),
            z_threshold: z_threshold.max(f64::MIN_POSITIVE),
            min_samples: min_samples.max(2),
        }
    }

    /// Copy of the internal window, for diagnostics and tests.
    pub fn history(&self) -> Vec<Fix> {
        self.window.snapshot()
    }

    pub fn clear_history(&self) {
        self.window.clear();
    }

    fn mean_stddev(values: &[f64]) -> (f64, f64) {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        if values.len() < 2 {
            return (mean, 0.0);
        }
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        (mean, variance.sqrt())
    }

    fn z_score(value: f64, mean: f64, stddev: f64) -> f64 {
        if stddev > 0.0 {
            (value - mean).abs() / stddev
        } else {
            0.0
        }
    }
}

impl Default for StatisticalDetector {
    fn default() -> Self {
        Self::new(OUTLIER_WINDOW, Z_THRESHOLD, OUTLIER_MIN_SAMPLES)
    }
}

impl AnomalyDetector for StatisticalDetector {
    fn detect(&self, fix: &Fix, context: &[Fix]) -> Verdict {
        let mut sample: Vec<Fix> = context.to_vec();
        sample.extend(self.window.snapshot());

        if sample.len() < self.min_samples {
            return Verdict::normal();
        }

        let latitudes: Vec<f64> = sample.iter().map(|f| f.latitude).collect();
        let longitudes: Vec<f64> = sample.iter().map(|f| f.longitude).collect();
        let accuracies: Vec<f64> = sample.iter().map(|f| f.accuracy).collect();

        let (lat_mean, lat_stddev) = Self::mean_stddev(&latitudes);
        let (lon_mean, lon_stddev) = Self::mean_stddev(&longitudes);
        let (acc_mean, acc_stddev) = Self::mean_stddev(&accuracies);

        let z_lat = Self::z_score(fix.latitude, lat_mean, lat_stddev);
        let z_lon = Self::z_score(fix.longitude, lon_mean, lon_stddev);
        let z_acc = Self::z_score(fix.accuracy, acc_mean, acc_stddev);

        let is_anomaly =
            z_lat > self.z_threshold || z_lon > self.z_threshold || z_acc > self.z_threshold * 2.0;

        if !is_anomaly {
            return Verdict::normal();
        }

        let max_z = z_lat.max(z_lon).max(z_acc / 2.0);
        let confidence = ((max_z - self.z_threshold) / self.z_threshold).clamp(0.0, 1.0);
        Verdict::anomaly(confidence)
            .with_info("type", "statistical")
            .with_info("zLat", format!("{z_lat:.2}"))
            .with_info("zLon", format!("{z_lon:.2}"))
            .with_info("zAccuracy", format!("{z_acc:.2}"))
            .with_info("zThreshold", format!("{:.2}", self.z_threshold))
    }

    fn record(&self, fix: &Fix) {
        // The window itself still refuses anomaly-status fixes and
        // time regressions
        self.window.push(fix);
    }

    fn name(&self) -> &'static str {
        "statistical"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::{FixBuilder, FixStatus, SourceKind};

    fn fix_at(lat: f64, lon: f64, accuracy: f64, time: u64) -> Fix {
        FixBuilder::new(SourceKind::Gnss, time)
            .position(lat, lon)
            .accuracy(accuracy)
            .build()
    }

    fn jittered_context(count: usize) -> Vec<Fix> {
        (0..count)
            .map(|i| {
                let jitter = (i % 5) as f64 * 1e-5;
                fix_at(39.9 + jitter, 116.4 + jitter, 5.0 + (i % 3) as f64, 1_000 + i as u64)
            })
            .collect()
    }

    #[test]
    fn empty_context_reports_not_anomaly() {
        let detector = StatisticalDetector::new(50, 2.0, 5);
        let fix = fix_at(39.9, 116.4, 5.0, 1_000);

        let verdict = detector.detect(&fix, &[]);
        assert!(!verdict.is_anomaly);
        // Detection alone never seeds the window
        assert!(detector.history().is_empty());

        // The orchestrator's accept decision does
        detector.record(&fix);
        assert_eq!(detector.history().len(), 1);
    }

    #[test]
    fn position_outlier_flagged() {
        let detector = StatisticalDetector::new(50, 2.0, 5);
        let context = jittered_context(20);
        let verdict = detector.detect(&fix_at(40.9, 117.4, 5.0, 60_000), &context);
        assert!(verdict.is_anomaly);
        assert!(verdict.confidence > 0.0);
    }

    #[test]
    fn detect_never_touches_window() {
        let detector = StatisticalDetector::new(50, 2.0, 5);
        let context = jittered_context(20);

        // Neither a flagged nor a conforming candidate mutates history
        let verdict = detector.detect(&fix_at(40.9, 117.4, 5.0, 60_000), &context);
        assert!(verdict.is_anomaly);
        assert!(detector.history().is_empty());

        let verdict = detector.detect(&fix_at(39.90002, 116.40002, 5.0, 60_000), &context);
        assert!(!verdict.is_anomaly);
        assert!(detector.history().is_empty());
    }

    #[test]
    fn record_rejects_anomalous_fix() {
        let detector = StatisticalDetector::new(50, 2.0, 5);
        let mut rejected = fix_at(40.9, 117.4, 5.0, 60_000);
        rejected.status = FixStatus::Anomaly;

        detector.record(&rejected);
        assert!(detector.history().is_empty());
        assert!(detector
            .history()
            .iter()
            .all(|f| f.status != FixStatus::Anomaly));
    }

    #[test]
    fn recorded_fixes_inform_later_verdicts() {
        let detector = StatisticalDetector::new(50, 2.0, 5);
        for fix in jittered_context(20) {
            detector.record(&fix);
        }
        assert_eq!(detector.history().len(), 20);

        // The window alone is enough context now
        let verdict = detector.detect(&fix_at(40.9, 117.4, 5.0, 60_000), &[]);
        assert!(verdict.is_anomaly);
    }

    #[test]
    fn accuracy_outlier_needs_doubled_threshold() {
        let detector = StatisticalDetector::new(50, 2.0, 5);
        let context = jittered_context(20);

        // Accuracy z-score between z and 2z: not an anomaly
        let verdict = detector.detect(&fix_at(39.90002, 116.40002, 8.5, 60_000), &context);
        assert!(!verdict.is_anomaly);

        // Far beyond 2z: anomaly
        let verdict = detector.detect(&fix_at(39.90002, 116.40002, 60.0, 61_000), &context);
        assert!(verdict.is_anomaly);
    }
}
