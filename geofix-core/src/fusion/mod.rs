//! Multi-source fusion engine
//!
//! ## Overview
//!
//! Given a small set of recent valid fixes - one per source kind,
//! time-aligned by the orchestrator's correlation window - the engine
//! produces one fused estimate using the strategy bound to the current
//! scene:
//!
//! - [`PriorityFusion`]: pick the highest-priority source outright;
//! - [`WeightedFusion`]: weighted average of coordinates with
//!   harmonic-mean accuracy;
//! - [`FootprintFusion`]: keep only the mutually-coherent subset of
//!   uncertainty discs, then average;
//! - scene-adaptive: dispatch to one of the above per the active
//!   [`SceneConfig`], weighted-average when no policy exists.
//!
//! ## Guarantees
//!
//! Enforced by the engine after every strategy, not trusted to them:
//! the fused coordinate lies inside the axis-aligned bounding box of its
//! contributors, the output time is the max of contributor times, and
//! the output source kind is `Fused`.

mod footprint;
mod priority;
mod weighted;

pub use footprint::FootprintFusion;
pub use priority::PriorityFusion;
pub use weighted::WeightedFusion;

use std::collections::BTreeMap;

use tracing::debug;

use crate::confidence::Confidence;
use crate::config::{CorrectionConfig, FusionStrategyKind, SceneConfig, WeightMode};
use crate::errors::FusionError;
use crate::fix::{Fix, SourceKind};
use crate::scene::Scene;
use crate::time::Timestamp;

/// Result of one fusion: a corrected coordinate with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionOutcome {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub accuracy: f64,
    /// Max of contributor capture times
    pub time: Timestamp,
    /// Strategy-reported quality in [0, 1]
    pub confidence: Confidence,
    /// Strategy tag, e.g. `"weighted-average"`
    pub method: String,
    pub source_count: usize,
    pub details: BTreeMap<String, String>,
}

/// Capability interface for fusion strategies.
///
/// The built-in set is closed and dispatched by [`FusionEngine`]; the
/// trait exists so callers can plug in their own strategy.
pub trait FuseStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fuse a non-empty slice of valid fixes.
    fn fuse(&self, fixes: &[Fix]) -> Result<FusionOutcome, FusionError>;
}

/// Latest valid fix per source kind, preserving distinct-source input.
fn latest_per_source(fixes: &[Fix]) -> Vec<Fix> {
    let mut by_source: BTreeMap<SourceKind, Fix> = BTreeMap::new();
    for fix in fixes {
        if !fix.is_valid() {
            continue;
        }
        match by_source.get(&fix.source) {
            Some(existing) if existing.time >= fix.time => {}
            _ => {
                by_source.insert(fix.source, fix.clone());
            }
        }
    }
    by_source.into_values().collect()
}

pub(crate) fn max_time(fixes: &[Fix]) -> Timestamp {
    fixes.iter().map(|f| f.time).max().unwrap_or(0)
}

/// Mean altitude of the contributors that report one.
pub(crate) fn mean_altitude(fixes: &[Fix]) -> Option<f64> {
    let altitudes: Vec<f64> = fixes.iter().filter_map(|f| f.altitude).collect();
    if altitudes.is_empty() {
        None
    } else {
        Some(altitudes.iter().sum::<f64>() / altitudes.len() as f64)
    }
}

/// Scene-aware dispatcher over the built-in strategies.
pub struct FusionEngine {
    strategy: FusionStrategyKind,
    priority: PriorityFusion,
    weighted: WeightedFusion,
    footprint: FootprintFusion,
    scene_configs: BTreeMap<Scene, SceneConfig>,
    min_required: usize,
    max_priority: i32,
    priorities: BTreeMap<SourceKind, i32>,
    custom: Option<Box<dyn FuseStrategy>>,
}

impl FusionEngine {
    pub fn from_config(config: &CorrectionConfig) -> Self {
        let priorities = config.source_priorities.clone();
        let max_priority = priorities.values().copied().max().unwrap_or(1).max(1);

        let weighted = match config.weight_mode {
            WeightMode::Custom => WeightedFusion::custom(config.source_weights.clone()),
            WeightMode::Equal => WeightedFusion::equal(),
            WeightMode::InverseAccuracy => WeightedFusion::inverse_accuracy(),
        };

        Self {
            strategy: config.fusion_strategy,
            priority: PriorityFusion::new(priorities.clone()),
            weighted,
            footprint: FootprintFusion::new(
                config.coherence_threshold,
                config.max_footprint_radius_m,
                config.min_required_sources,
            ),
            scene_configs: config.scene_configs.clone(),
            min_required: config.min_required_sources.max(1),
            max_priority,
            priorities,
            custom: None,
        }
    }

    /// Install a user-supplied strategy; it replaces the configured one.
    pub fn with_custom_strategy(mut self, strategy: Box<dyn FuseStrategy>) -> Self {
        self.custom = Some(strategy);
        self
    }

    pub fn min_required(&self) -> usize {
        self.min_required
    }

    /// Fuse the given fixes under the strategy bound to `scene`.
    pub fn fuse(&self, fixes: &[Fix], scene: Scene) -> Result<FusionOutcome, FusionError> {
        let candidates = latest_per_source(fixes);
        if candidates.is_empty() {
            return Err(FusionError::NoValidFixes);
        }

        // Single-source boundary case: pass the fix through unchanged,
        // confidence is its normalized priority weight.
        if candidates.len() == 1 {
            if self.min_required > 1 {
                return Err(FusionError::InsufficientSources {
                    required: self.min_required,
                    available: 1,
                });
            }
            return Ok(self.passthrough(&candidates[0]));
        }

        if candidates.len() < self.min_required {
            return Err(FusionError::InsufficientSources {
                required: self.min_required,
                available: candidates.len(),
            });
        }

        let mut outcome = if let Some(custom) = &self.custom {
            custom.fuse(&candidates)?
        } else {
            self.dispatch(self.strategy, &candidates, scene)?
        };

        finalize(&mut outcome, &candidates);
        debug!(
            method = %outcome.method,
            sources = outcome.source_count,
            confidence = outcome.confidence.as_float(),
            "fused fixes"
        );
        Ok(outcome)
    }

    fn dispatch(
        &self,
        strategy: FusionStrategyKind,
        candidates: &[Fix],
        scene: Scene,
    ) -> Result<FusionOutcome, FusionError> {
        match strategy {
            FusionStrategyKind::Priority => self.priority.fuse(candidates),
            FusionStrategyKind::WeightedAverage => self.weighted.fuse(candidates),
            FusionStrategyKind::FootprintCoherence => self.footprint.fuse(candidates),
            FusionStrategyKind::Adaptive => self.fuse_adaptive(candidates, scene),
        }
    }

    fn fuse_adaptive(&self, candidates: &[Fix], scene: Scene) -> Result<FusionOutcome, FusionError> {
        let Some(policy) = self.scene_configs.get(&scene) else {
            // No policy for this scene: weighted average
            let mut outcome = self.weighted.fuse(candidates)?;
            outcome.method = format!("adaptive/{scene}/{}", outcome.method);
            return Ok(outcome);
        };

        if candidates.len() < policy.min_required_sources {
            return Err(FusionError::InsufficientSources {
                required: policy.min_required_sources,
                available: candidates.len(),
            });
        }

        let mut outcome = match policy.strategy {
            FusionStrategyKind::Priority => {
                let mut priorities = self.priorities.clone();
                priorities.extend(policy.source_priorities.iter().map(|(k, v)| (*k, *v)));
                PriorityFusion::new(priorities).fuse(candidates)?
            }
            FusionStrategyKind::WeightedAverage => {
                if policy.source_weights.is_empty() {
                    self.weighted.fuse(candidates)?
                } else {
                    WeightedFusion::custom(policy.source_weights.clone()).fuse(candidates)?
                }
            }
            FusionStrategyKind::FootprintCoherence => self.footprint.fuse(candidates)?,
            // A scene policy pointing back at adaptive means "default"
            FusionStrategyKind::Adaptive => self.weighted.fuse(candidates)?,
        };

        outcome.method = format!("adaptive/{scene}/{}", outcome.method);
        outcome.details.insert("scene".into(), scene.name().into());
        Ok(outcome)
    }

    fn passthrough(&self, fix: &Fix) -> FusionOutcome {
        let priority = self.priorities.get(&fix.source).copied().unwrap_or(0);
        let confidence =
            Confidence::from_float((priority.max(0) as f32 / self.max_priority as f32).min(1.0));

        let mut details = BTreeMap::new();
        details.insert("sourceKind".into(), fix.source.name().into());
        FusionOutcome {
            latitude: fix.latitude,
            longitude: fix.longitude,
            altitude: fix.altitude,
            accuracy: fix.accuracy,
            time: fix.time,
            confidence,
            method: "single-source".into(),
            source_count: 1,
            details,
        }
    }
}

/// Apply the engine guarantees to a strategy outcome.
fn finalize(outcome: &mut FusionOutcome, contributors: &[Fix]) {
    let min_lat = contributors.iter().map(|f| f.latitude).fold(f64::INFINITY, f64::min);
    let max_lat = contributors.iter().map(|f| f.latitude).fold(f64::NEG_INFINITY, f64::max);
    let min_lon = contributors.iter().map(|f| f.longitude).fold(f64::INFINITY, f64::min);
    let max_lon = contributors.iter().map(|f| f.longitude).fold(f64::NEG_INFINITY, f64::max);

    outcome.latitude = outcome.latitude.clamp(min_lat, max_lat);
    outcome.longitude = outcome.longitude.clamp(min_lon, max_lon);
    outcome.time = max_time(contributors);
    outcome.source_count = contributors.len();
    outcome
        .details
        .insert("sourceCount".into(), contributors.len().to_string());
}
