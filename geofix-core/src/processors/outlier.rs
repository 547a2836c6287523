//! Statistical outlier stage
//!
//! Keeps a bounded window of accepted fixes, computes the centroid and
//! the standard deviation of great-circle distances from it, and marks a
//! new fix `Anomaly` when its distance from the centroid exceeds
//! `threshold_factor x stddev`. Anomalous fixes never enter the window,
//! so a burst of outliers cannot drag the statistics toward itself.
//!
//! Two regime guards:
//! - the stage only fires with at least `min_samples` entries; before
//!   that, fixes pass through and populate the window;
//! - a stddev below 1 m is clamped up to 1 m, otherwise a perfectly
//!   still receiver would flag its own jitter.
//!
//! Reprocessing is idempotent: each checked fix is stamped with an
//! attribute marker, and marked fixes are not re-inserted.

use tracing::debug;

use super::ProcessorStage;
use crate::constants::processors::{
    OUTLIER_MIN_SAMPLES, OUTLIER_STDDEV_FLOOR_M, OUTLIER_THRESHOLD_FACTOR, OUTLIER_WINDOW,
    PRIORITY_OUTLIER,
};
use crate::errors::StageError;
use crate::fix::{Fix, FixStatus};
use crate::geo::haversine_m;
use crate::window::FixWindow;

const CHECKED_ATTR: &str = "outlier.checked";

pub struct OutlierStage {
    window: FixWindow,
    threshold_factor: f64,
    min_samples: usize,
}

impl OutlierStage {
    pub fn new(window_capacity: usize, threshold_factor: f64, min_samples: usize) -> Self {
        Self {
            window: FixWindow::new(window_capacity),
            threshold_factor: threshold_factor.max(1.0),
            min_samples: min_samples.max(2),
        }
    }

    /// (centroid_lat, centroid_lon, stddev of distances from it)
    fn statistics(history: &[Fix]) -> (f64, f64, f64) {
        let n = history.len() as f64;
        let centroid_lat = history.iter().map(|f| f.latitude).sum::<f64>() / n;
        let centroid_lon = history.iter().map(|f| f.longitude).sum::<f64>() / n;

        let distances: Vec<f64> = history
            .iter()
            .map(|f| haversine_m(f.latitude, f.longitude, centroid_lat, centroid_lon))
            .collect();
        let mean = distances.iter().sum::<f64>() / n;
        let variance = if distances.len() < 2 {
            0.0
        } else {
            distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n - 1.0)
        };

        (centroid_lat, centroid_lon, variance.sqrt())
    }
}

impl Default for OutlierStage {
    fn default() -> Self {
        Self::new(OUTLIER_WINDOW, OUTLIER_THRESHOLD_FACTOR, OUTLIER_MIN_SAMPLES)
    }
}

impl ProcessorStage for OutlierStage {
    fn process(&mut self, mut fix: Fix) -> Result<Fix, StageError> {
        // Only clean fixes participate; invalid/low-accuracy ones are not
        // representative of the trajectory, and re-checking is a no-op.
        if fix.status != FixStatus::Valid || fix.attribute(CHECKED_ATTR).is_some() {
            return Ok(fix);
        }

        let history = self.window.snapshot();
        if history.len() < self.min_samples {
            self.window.push(&fix);
            return Ok(fix);
        }

        let (centroid_lat, centroid_lon, raw_stddev) = Self::statistics(&history);
        let stddev = raw_stddev.max(OUTLIER_STDDEV_FLOOR_M);
        let distance = haversine_m(fix.latitude, fix.longitude, centroid_lat, centroid_lon);
        let threshold = self.threshold_factor * stddev;

        fix.set_attribute(CHECKED_ATTR, "true");
        if distance > threshold {
            debug!(distance, threshold, "outlier fix");
            fix.status = FixStatus::Anomaly;
            fix.set_attribute("outlier.distance", format!("{distance:.2}"));
            fix.set_attribute("outlier.threshold", format!("{threshold:.2}"));
        } else {
            self.window.push(&fix);
        }

        Ok(fix)
    }

    fn name(&self) -> &'static str {
        "outlier-detector"
    }

    fn priority(&self) -> i32 {
        PRIORITY_OUTLIER
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::{FixBuilder, SourceKind};

    fn fix_at(lat: f64, lon: f64, time: u64) -> Fix {
        FixBuilder::new(SourceKind::Gnss, time)
            .position(lat, lon)
            .accuracy(5.0)
            .build()
    }

    /// Cluster with a little spread around (39.9, 116.4).
    fn seed_cluster(stage: &mut OutlierStage, count: usize) {
        for i in 0..count {
            let jitter = (i % 3) as f64 * 1e-5;
            let fix = fix_at(39.9 + jitter, 116.4 + jitter, 1_000 + i as u64 * 1_000);
            stage.process(fix).unwrap();
        }
    }

    #[test]
    fn passes_through_before_min_samples() {
        let mut stage = OutlierStage::new(50, 2.0, 5);
        for i in 0..4 {
            // Wildly scattered, but the window is still warming up
            let out = stage
                .process(fix_at(10.0 * i as f64, 20.0, 1_000 + i))
                .unwrap();
            assert_eq!(out.status, FixStatus::Valid);
        }
    }

    #[test]
    fn flags_teleport_and_keeps_window() {
        let mut stage = OutlierStage::new(50, 2.0, 5);
        seed_cluster(&mut stage, 10);
        let window_before = stage.window.len();

        // A fix a whole degree away (~110 km)
        let out = stage.process(fix_at(40.9, 117.4, 60_000)).unwrap();
        assert_eq!(out.status, FixStatus::Anomaly);
        assert!(out.attribute("outlier.distance").is_some());

        // The anomaly must not have entered the window
        assert_eq!(stage.window.len(), window_before);
    }

    #[test]
    fn nearby_fix_accepted_into_window() {
        let mut stage = OutlierStage::new(50, 2.0, 5);
        seed_cluster(&mut stage, 10);
        let window_before = stage.window.len();

        let out = stage.process(fix_at(39.90001, 116.40001, 60_000)).unwrap();
        assert_eq!(out.status, FixStatus::Valid);
        assert_eq!(stage.window.len(), window_before + 1);
    }

    #[test]
    fn stddev_floor_tolerates_identical_history() {
        let mut stage = OutlierStage::new(50, 2.0, 5);
        // Perfectly repeated position: raw stddev would be 0
        for i in 0..8 {
            stage.process(fix_at(39.9, 116.4, 1_000 + i)).unwrap();
        }

        // ~1.1 m away: inside 2 x clamped stddev (2 m)
        let out = stage.process(fix_at(39.90001, 116.4, 10_000)).unwrap();
        assert_eq!(out.status, FixStatus::Valid);

        // ~11 m away: outside
        let out = stage.process(fix_at(39.9001, 116.4, 11_000)).unwrap();
        assert_eq!(out.status, FixStatus::Anomaly);
    }

    #[test]
    fn reprocessing_is_idempotent() {
        let mut stage = OutlierStage::new(50, 2.0, 5);
        seed_cluster(&mut stage, 10);

        let once = stage.process(fix_at(39.90001, 116.4, 60_000)).unwrap();
        let window_after_once = stage.window.len();
        let twice = stage.process(once.clone()).unwrap();

        assert_eq!(once, twice);
        assert_eq!(stage.window.len(), window_after_once);
    }
}
