//! Kinematic detector
//!
//! Judges a candidate fix against the most recent context fix captured
//! before it, on three plausibility axes:
//!
//! - **speed**: great-circle distance over elapsed time beyond the
//!   ceiling (a teleport). Confidence is the overshoot fraction
//!   `speed/max - 1`, capped at 1.
//! - **displacement**: raw distance between consecutive fixes beyond
//!   the configured maximum.
//! - **acceleration**: change of implied speed across the two most
//!   recent intervals beyond what anything ground-based can do.
//!
//! The speed check fires first; displacement and acceleration catch
//! cases a plausible average speed would mask.

use super::{AnomalyDetector, Verdict};
use crate::constants::anomaly::{MAX_ACCELERATION_MPS2, MAX_DISTANCE_M, MAX_SPEED_MPS};
use crate::fix::Fix;
use crate::geo::haversine_m;

pub struct SpeedDetector {
    max_speed_mps: f64,
    max_distance_m: f64,
    max_acceleration_mps2: f64,
}

impl SpeedDetector {
    pub fn new(max_speed_mps: f64) -> Self {
        Self::with_limits(max_speed_mps, MAX_DISTANCE_M, MAX_ACCELERATION_MPS2)
    }

    pub fn with_limits(
        max_speed_mps: f64,
        max_distance_m: f64,
        max_acceleration_mps2: f64,
    ) -> Self {
        Self {
            max_speed_mps: max_speed_mps.max(f64::MIN_POSITIVE),
            max_distance_m: max_distance_m.max(f64::MIN_POSITIVE),
            max_acceleration_mps2: max_acceleration_mps2.max(f64::MIN_POSITIVE),
        }
    }

    fn implied_speed(from: &Fix, to: &Fix) -> Option<(f64, f64)> {
        let elapsed_s = to.time.saturating_sub(from.time) as f64 / 1_000.0;
        if elapsed_s <= 0.0 {
            return None;
        }
        let distance_m = haversine_m(from.latitude, from.longitude, to.latitude, to.longitude);
        Some((distance_m, distance_m / elapsed_s))
    }
}

impl Default for SpeedDetector {
    fn default() -> Self {
        Self::new(MAX_SPEED_MPS)
    }
}

impl AnomalyDetector for SpeedDetector {
    fn detect(&self, fix: &Fix, context: &[Fix]) -> Verdict {
        // Most recent context fix strictly before the candidate
        let previous = context
            .iter()
            .filter(|c| c.time < fix.time)
            .max_by_key(|c| c.time);
        let Some(previous) = previous else {
            return Verdict::normal();
        };
        let Some((distance_m, speed)) = Self::implied_speed(previous, fix) else {
            return Verdict::normal();
        };

        if speed > self.max_speed_mps {
            let confidence = (speed / self.max_speed_mps - 1.0).min(1.0);
            return Verdict::anomaly(confidence)
                .with_info("type", "speed")
                .with_info("speedMps", format!("{speed:.2}"))
                .with_info("maxSpeedMps", format!("{:.2}", self.max_speed_mps))
                .with_info("distanceM", format!("{distance_m:.2}"));
        }

        if distance_m > self.max_distance_m {
            let confidence = (distance_m / self.max_distance_m - 1.0).min(1.0);
            return Verdict::anomaly(confidence)
                .with_info("type", "distance")
                .with_info("distanceM", format!("{distance_m:.2}"))
                .with_info("maxDistanceM", format!("{:.2}", self.max_distance_m));
        }

        // Acceleration needs one more interval behind the previous fix
        let before = context
            .iter()
            .filter(|c| c.time < previous.time)
            .max_by_key(|c| c.time);
        if let Some(before) = before {
            if let Some((_, prior_speed)) = Self::implied_speed(before, previous) {
                let dt_s = fix.time.saturating_sub(previous.time) as f64 / 1_000.0;
                let acceleration = (speed - prior_speed).abs() / dt_s;
                if acceleration > self.max_acceleration_mps2 {
                    let confidence =
                        (acceleration / self.max_acceleration_mps2 - 1.0).min(1.0);
                    return Verdict::anomaly(confidence)
                        .with_info("type", "acceleration")
                        .with_info("accelerationMps2", format!("{acceleration:.2}"))
                        .with_info(
                            "maxAccelerationMps2",
                            format!("{:.2}", self.max_acceleration_mps2),
                        );
                }
            }
        }

        Verdict::normal()
    }

    fn name(&self) -> &'static str {
        "speed"
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

    #[test]
    fn empty_context_is_normal() {
        let detector = SpeedDetector::new(30.0);
        assert!(!detector.detect(&fix_at(39.9, 116.4, 1_000), &[]).is_anomaly);
    }

    #[test]
    fn teleport_flagged() {
        let detector = SpeedDetector::new(30.0);
        let context = vec![fix_at(39.9, 116.4, 1_000)];
        // One degree of latitude (~111 km) in one second
        let verdict = detector.detect(&fix_at(40.9, 116.4, 2_000), &context);
        assert!(verdict.is_anomaly);
        assert_eq!(verdict.confidence, 1.0);
        assert_eq!(verdict.info.get("type").map(String::as_str), Some("speed"));
    }

    #[test]
    fn plausible_motion_passes() {
        let detector = SpeedDetector::new(30.0);
        let context = vec![fix_at(39.9, 116.4, 1_000)];
        // ~22 m in 1 s = 22 m/s
        let verdict = detector.detect(&fix_at(39.9002, 116.4, 2_000), &context);
        assert!(!verdict.is_anomaly);
    }

    #[test]
    fn uses_most_recent_earlier_fix() {
        let detector = SpeedDetector::new(30.0);
        // Old fix far away, recent fix nearby: only the recent one counts
        let context = vec![
            fix_at(30.0, 100.0, 1_000),
            fix_at(39.9, 116.4, 9_000),
            fix_at(39.9, 116.4, 20_000), // later than candidate, ignored
        ];
        let verdict = detector.detect(&fix_at(39.9002, 116.4, 10_000), &context);
        assert!(!verdict.is_anomaly);
    }

    #[test]
    fn mild_overshoot_has_low_confidence() {
        let detector = SpeedDetector::new(30.0);
        let context = vec![fix_at(39.9, 116.4, 1_000)];
        // ~33 m in 1 s: 10% over the ceiling
        let verdict = detector.detect(&fix_at(39.9003, 116.4, 2_000), &context);
        assert!(verdict.is_anomaly);
        assert!(verdict.confidence < 0.3, "got {}", verdict.confidence);
    }

    #[test]
    fn long_slow_displacement_flagged_by_distance() {
        // 2 km in 100 s is only 20 m/s, but breaks the 1 km displacement cap
        let detector = SpeedDetector::with_limits(30.0, 1_000.0, 10.0);
        let context = vec![fix_at(39.9, 116.4, 1_000)];
        let verdict = detector.detect(&fix_at(39.918, 116.4, 101_000), &context);
        assert!(verdict.is_anomaly);
        assert_eq!(verdict.info.get("type").map(String::as_str), Some("distance"));
    }

    #[test]
    fn impossible_acceleration_flagged() {
        let detector = SpeedDetector::with_limits(60.0, 10_000.0, 10.0);
        // 1 m/s for one second, then 50 m/s the next: 49 m/s^2
        let context = vec![fix_at(39.9, 116.4, 1_000), fix_at(39.900009, 116.4, 2_000)];
        let verdict = detector.detect(&fix_at(39.90046, 116.4, 3_000), &context);
        assert!(verdict.is_anomaly);
        assert_eq!(
            verdict.info.get("type").map(String::as_str),
            Some("acceleration")
        );
    }

    #[test]
    fn steady_cruise_passes_all_checks() {
        let detector = SpeedDetector::with_limits(60.0, 1_000.0, 10.0);
        // Constant ~30 m/s over two intervals
        let context = vec![
            fix_at(39.9000, 116.4, 1_000),
            fix_at(39.90027, 116.4, 2_000),
        ];
        let verdict = detector.detect(&fix_at(39.90054, 116.4, 3_000), &context);
        assert!(!verdict.is_anomaly);
    }
}
