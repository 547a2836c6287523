//! Scene classifier
//!
//! ## Heuristic
//!
//! | signal                                        | scene        |
//! |-----------------------------------------------|--------------|
//! | sustained speed >= highway threshold          | Highway      |
//! | sustained speed >= driving threshold          | Driving      |
//! | driving speed + degraded satellite accuracy   | UrbanCanyon  |
//! | running threshold <= speed < driving          | Running      |
//! | walking threshold <= speed < running          | Walking      |
//! | speed < stationary threshold                  | Stationary   |
//! | satellite primary, accuracy < 10 m            | Outdoor      |
//! | wifi/cellular primary, accuracy >= 10 m       | Indoor       |
//! | insufficient data                             | prior scene  |
//!
//! Speed is the median instantaneous speed over the last k pairs (k = 5)
//! so a single teleported sample cannot flip the scene. The classifier
//! runs at most once per check interval; calls inside the interval
//! return the cached label.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::Scene;
use crate::constants::scene as defaults;
use crate::fix::{Fix, SourceKind};
use crate::geo::haversine_m;
use crate::time::Timestamp;

/// Speed bands and accuracy cutoffs used by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SceneThresholds {
    pub stationary_mps: f64,
    pub walking_mps: f64,
    pub running_mps: f64,
    pub driving_mps: f64,
    pub highway_mps: f64,
    /// Satellite accuracy below this reads as open sky (m)
    pub outdoor_accuracy_m: f64,
    /// Satellite accuracy at/above this while driving reads as urban canyon (m)
    pub urban_canyon_accuracy_m: f64,
}

impl Default for SceneThresholds {
    fn default() -> Self {
        Self {
            stationary_mps: defaults::STATIONARY_MPS,
            walking_mps: defaults::WALKING_MPS,
            running_mps: defaults::RUNNING_MPS,
            driving_mps: defaults::DRIVING_MPS,
            highway_mps: defaults::HIGHWAY_MPS,
            outdoor_accuracy_m: defaults::OUTDOOR_ACCURACY_M,
            urban_canyon_accuracy_m: defaults::URBAN_CANYON_ACCURACY_M,
        }
    }
}

/// Interval-gated scene classifier.
#[derive(Debug)]
pub struct SceneClassifier {
    thresholds: SceneThresholds,
    check_interval_ms: u64,
    last_check: Timestamp,
    current: Scene,
}

impl SceneClassifier {
    pub fn new(thresholds: SceneThresholds, check_interval_ms: u64) -> Self {
        Self {
            thresholds,
            check_interval_ms,
            last_check: 0,
            current: Scene::Unknown,
        }
    }

    pub fn current(&self) -> Scene {
        self.current
    }

    /// Classify from recent accepted fixes (oldest first).
    ///
    /// Returns the cached scene inside the check interval.
    pub fn classify(&mut self, recent: &[Fix], now: Timestamp) -> Scene {
        if self.last_check != 0 && now.saturating_sub(self.last_check) < self.check_interval_ms {
            return self.current;
        }
        self.last_check = now;

        let detected = self.infer(recent);
        if detected != self.current {
            info!(from = %self.current, to = %detected, "scene changed");
            self.current = detected;
        }
        self.current
    }

    /// Drop cached state (label and interval anchor).
    pub fn reset(&mut self) {
        self.last_check = 0;
        self.current = Scene::Unknown;
    }

    fn infer(&self, recent: &[Fix]) -> Scene {
        if let Some(speed) = median_speed(recent, defaults::SPEED_PAIRS) {
            let t = &self.thresholds;
            if speed >= t.highway_mps {
                return Scene::Highway;
            }
            if speed >= t.driving_mps {
                if primary_source(recent) == Some(SourceKind::Gnss)
                    && median_accuracy(recent).is_some_and(|a| a >= t.urban_canyon_accuracy_m)
                {
                    return Scene::UrbanCanyon;
                }
                return Scene::Driving;
            }
            if speed >= t.running_mps {
                return Scene::Running;
            }
            if speed >= t.walking_mps {
                return Scene::Walking;
            }
            if speed < t.stationary_mps {
                return Scene::Stationary;
            }
        }

        // Not enough kinematics: fall back to the signal environment
        if let Some(last) = recent.last() {
            match last.source {
                SourceKind::Gnss if last.accuracy < self.thresholds.outdoor_accuracy_m => {
                    return Scene::Outdoor;
                }
                SourceKind::Wifi | SourceKind::Cellular
                    if last.accuracy >= self.thresholds.outdoor_accuracy_m =>
                {
                    return Scene::Indoor;
                }
                _ => {}
            }
        }

        self.current
    }
}

/// Median instantaneous speed over the trailing `pairs` consecutive
/// pairs. `None` with fewer than two usable pairs.
fn median_speed(recent: &[Fix], pairs: usize) -> Option<f64> {
    if recent.len() < 3 {
        return None;
    }

    let mut speeds: Vec<f64> = recent
        .windows(2)
        .rev()
        .take(pairs)
        .filter_map(|pair| {
            let dt_ms = pair[1].time.saturating_sub(pair[0].time);
            if dt_ms == 0 {
                return None;
            }
            let dist = haversine_m(
                pair[0].latitude,
                pair[0].longitude,
                pair[1].latitude,
                pair[1].longitude,
            );
            Some(dist / (dt_ms as f64 / 1_000.0))
        })
        .collect();

    if speeds.len() < 2 {
        return None;
    }

    speeds.sort_by(|a, b| a.partial_cmp(b).expect("speeds are finite"));
    let mid = speeds.len() / 2;
    if speeds.len() % 2 == 0 {
        Some((speeds[mid - 1] + speeds[mid]) / 2.0)
    } else {
        Some(speeds[mid])
    }
}

fn median_accuracy(recent: &[Fix]) -> Option<f64> {
    if recent.is_empty() {
        return None;
    }
    let mut accuracies: Vec<f64> = recent.iter().map(|f| f.accuracy).collect();
    accuracies.sort_by(|a, b| a.partial_cmp(b).expect("accuracies are finite"));
    Some(accuracies[accuracies.len() / 2])
}

/// Most common source kind in the window.
fn primary_source(recent: &[Fix]) -> Option<SourceKind> {
    let mut counts: std::collections::BTreeMap<SourceKind, usize> = Default::default();
    for fix in recent {
        *counts.entry(fix.source).or_default() += 1;
    }
    counts.into_iter().max_by_key(|(_, n)| *n).map(|(kind, _)| kind)
}
