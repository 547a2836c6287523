//! Synchronous correction engine
//!
//! One `ingest` call carries one raw fix through the full chain:
//!
//! ```text
//! fix -> processor chain -> anomaly composite -> per-source slot
//!                                                     |
//!              correlation window + debounce gate <---+
//!                                                     |
//!                                   fusion -> CorrectedFix
//! ```
//!
//! Everything is driven by the injected clock, so the engine is fully
//! deterministic. The threaded service wraps it; tests drive it
//! directly.
//!
//! ## Emission rules
//!
//! - Only fixes that survive the chain with `Valid` status enter the
//!   per-source slots; `LowAccuracy` fixes still feed the recent-history
//!   window but never fusion.
//! - Slots whose fix has fallen out of the correlation window relative
//!   to the newest activity are evicted before each fusion attempt.
//! - `min_correction_interval` (scaled by the active mode) debounces
//!   emissions; fixes arriving inside the interval update slots only.
//! - Emitted times are monotonically non-decreasing, and an emission's
//!   confidence is the fusion quality multiplied by an anomaly-adjusted
//!   penalty derived from the anomaly density of the trailing window.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, error};

use crate::anomaly::{
    AnomalyDetector, CompositeDetector, PatternDetector, SpeedDetector, StatisticalDetector,
    TimeGapDetector, VerdictPolicy,
};
use crate::config::{CorrectionConfig, VerdictRule};
use crate::constants::anomaly::{PENALTY_FLOOR, PENALTY_PER_ANOMALY, PENALTY_WINDOW_MS};
use crate::constants::scene::HISTORY;
use crate::errors::{ConfigError, StageError};
use crate::fix::{CorrectedFix, Fix, FixStatus, SourceKind};
use crate::fusion::FusionEngine;
use crate::geo::haversine_m;
use crate::processors::{
    AccuracyFilter, OutlierStage, ProcessorChain, StalenessFilter, TransformStage,
};
use crate::scene::{Scene, SceneClassifier};
use crate::time::{TimeSource, Timestamp};
use crate::window::FixWindow;

/// Why a fix was discarded.
#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    /// A processor stage faulted on it
    StageFault { stage: &'static str },
    /// Marked `Invalid` (stale or malformed)
    Invalid,
}

/// What one `ingest` call did with the fix.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Discarded; nothing downstream saw it
    Dropped(DropReason),
    /// Judged anomalous; recorded but never slotted or fused
    Anomaly(Fix),
    /// Accepted (slotted and/or windowed); no emission this time
    Pending,
    /// A corrected fix was produced
    Emitted(CorrectedFix),
    /// Unrecoverable invariant violation; the engine must be retired
    Fatal(String),
}

pub struct CorrectionEngine {
    config: CorrectionConfig,
    chain: ProcessorChain,
    detector: CompositeDetector,
    classifier: SceneClassifier,
    fusion: FusionEngine,
    clock: Arc<dyn TimeSource>,
    /// Recent accepted fixes: detector context + classifier input
    recent: FixWindow,
    /// Latest valid fix per source, awaiting fusion
    slots: BTreeMap<SourceKind, Fix>,
    /// Debounce anchor (engine clock time of last emission)
    last_emit_at: Timestamp,
    /// Largest emitted fix time, for monotonic publication
    last_emitted_time: Timestamp,
    /// Capture clock times of recent anomalies, for the penalty
    recent_anomalies: VecDeque<Timestamp>,
    emitted: u64,
    anomalies: u64,
}

impl CorrectionEngine {
    pub fn new(config: CorrectionConfig, clock: Arc<dyn TimeSource>) -> Result<Self, ConfigError> {
        config.validate()?;

        let (chain, detector, classifier, fusion, recent) = Self::build(&config, &clock);
        Ok(Self {
            config,
            chain,
            detector,
            classifier,
            fusion,
            clock,
            recent,
            slots: BTreeMap::new(),
            last_emit_at: 0,
            last_emitted_time: 0,
            recent_anomalies: VecDeque::new(),
            emitted: 0,
            anomalies: 0,
        })
    }

    fn build(
        config: &CorrectionConfig,
        clock: &Arc<dyn TimeSource>,
    ) -> (
        ProcessorChain,
        CompositeDetector,
        SceneClassifier,
        FusionEngine,
        FixWindow,
    ) {
        let chain = ProcessorChain::new()
            .with_stage(Box::new(AccuracyFilter::new(
                config.min_accuracy_m,
                config.max_accuracy_m,
            )))
            .with_stage(Box::new(StalenessFilter::new(
                config.max_time_diff_ms,
                Arc::clone(clock),
            )))
            .with_stage(Box::new(OutlierStage::new(
                config.statistical_window,
                config.threshold_factor,
                config.min_samples,
            )))
            .with_stage(Box::new(TransformStage::new(
                config.source_datum,
                config.target_datum,
            )));

        let mut pattern_detector = PatternDetector::new(config.pattern_threshold);
        for pattern in &config.anomaly_patterns {
            pattern_detector.add_pattern(pattern.clone());
        }

        let policy = match config.verdict_rule {
            VerdictRule::MajorityVote => VerdictPolicy::MajorityVote {
                min_votes: config.min_votes,
            },
            VerdictRule::WeightedAverage => VerdictPolicy::WeightedAverage {
                threshold: config.anomaly.min_confidence,
            },
            VerdictRule::Threshold => VerdictPolicy::AnyOver {
                threshold: config.anomaly.min_confidence,
            },
        };

        let detector = CompositeDetector::new(policy)
            .with_detector(
                Box::new(TimeGapDetector::new(
                    config.anomaly.max_time_gap_ms,
                    Arc::clone(clock),
                )),
                1.0,
            )
            .with_detector(
                Box::new(SpeedDetector::with_limits(
                    config.anomaly.max_speed_mps,
                    config.anomaly.max_distance_m,
                    config.anomaly.max_acceleration_mps2,
                )),
                1.0,
            )
            .with_detector(
                Box::new(StatisticalDetector::new(
                    config.statistical_window,
                    config.z_threshold,
                    config.min_samples,
                )),
                1.0,
            )
            .with_detector(Box::new(pattern_detector), 1.0);

        let classifier = SceneClassifier::new(
            config.scene_thresholds.clone(),
            config.scene_check_interval_ms,
        );
        let fusion = FusionEngine::from_config(config);
        let recent = FixWindow::new(config.statistical_window.max(HISTORY));

        (chain, detector, classifier, fusion, recent)
    }

    /// Feed one raw fix through the whole chain.
    pub fn ingest(&mut self, fix: Fix) -> Outcome {
        let now = self.clock.now();

        let processed = match self.chain.process(fix) {
            Ok(processed) => processed,
            Err(fault) => {
                if let StageError::StateInvariant { reason } = fault.error {
                    error!(stage = fault.stage, reason, "invariant violation");
                    return Outcome::Fatal(format!("{}: {}", fault.stage, reason));
                }
                return Outcome::Dropped(DropReason::StageFault { stage: fault.stage });
            }
        };

        if processed.status == FixStatus::Invalid {
            return Outcome::Dropped(DropReason::Invalid);
        }

        let mut context = self.recent.snapshot();
        let accuracy_floor = self.config.anomaly.min_accuracy_m;
        if accuracy_floor > 0.0 {
            context.retain(|f| f.accuracy <= accuracy_floor);
        }
        let mut fix = processed;
        let verdict = self.detector.detect(&fix, &context);

        if verdict.is_anomaly || fix.status == FixStatus::Anomaly {
            fix.status = FixStatus::Anomaly;
            for (key, value) in verdict.info {
                fix.set_attribute(format!("anomaly.{key}"), value);
            }
            self.anomalies += 1;
            self.recent_anomalies.push_back(now);
            self.prune_anomalies(now);
            self.expire_slots(fix.time);
            debug!(confidence = verdict.confidence, "fix judged anomalous");
            return Outcome::Anomaly(fix);
        }

        // Accepted: update history (shared and detector-owned) and the scene
        self.recent.push(&fix);
        self.detector.record(&fix);
        let history = self.recent.snapshot();
        let scene = self.classifier.classify(&history, now);

        // Only clean fixes participate in fusion
        if fix.status != FixStatus::Valid {
            return Outcome::Pending;
        }
        self.slots.insert(fix.source, fix.clone());
        self.expire_slots(fix.time);

        // Debounce: slots updated, emission deferred
        let interval = self.config.mode.interval_for(self.config.min_correction_interval_ms);
        if self.last_emit_at != 0 && now.saturating_sub(self.last_emit_at) < interval {
            return Outcome::Pending;
        }

        let candidates: Vec<Fix> = self.slots.values().cloned().collect();
        match self.fusion.fuse(&candidates, scene) {
            Ok(outcome) => {
                let corrected = self.emit(fix, outcome, scene, now);
                Outcome::Emitted(corrected)
            }
            Err(_) => Outcome::Pending,
        }
    }

    fn emit(
        &mut self,
        original: Fix,
        outcome: crate::fusion::FusionOutcome,
        scene: Scene,
        now: Timestamp,
    ) -> CorrectedFix {
        let time = outcome.time.max(self.last_emitted_time);
        let distance = haversine_m(
            original.latitude,
            original.longitude,
            outcome.latitude,
            outcome.longitude,
        );
        let fused = outcome.source_count > 1;
        let source = if fused { SourceKind::Fused } else { original.source };

        let mut details = outcome.details;
        details.insert("scene".into(), scene.name().into());

        let corrected = CorrectedFix {
            original,
            latitude: outcome.latitude,
            longitude: outcome.longitude,
            altitude: outcome.altitude,
            accuracy: outcome.accuracy,
            time,
            source,
            confidence: outcome.confidence * self.anomaly_penalty(now),
            method: outcome.method,
            distance_from_original: distance,
            fused,
            source_count: outcome.source_count,
            details,
        };

        self.last_emit_at = now;
        self.last_emitted_time = time;
        self.slots.clear();
        self.emitted += 1;
        corrected
    }

    /// Drop slots whose fix is no longer concurrent with the newest
    /// activity (correlation window, anchored at the oldest slot).
    fn expire_slots(&mut self, newest_activity: Timestamp) {
        let newest = self
            .slots
            .values()
            .map(|f| f.time)
            .max()
            .unwrap_or(0)
            .max(newest_activity);
        let window = self.config.correlation_window_ms;
        self.slots.retain(|_, fix| newest.saturating_sub(fix.time) <= window);
    }

    fn prune_anomalies(&mut self, now: Timestamp) {
        while let Some(&oldest) = self.recent_anomalies.front() {
            if now.saturating_sub(oldest) > PENALTY_WINDOW_MS {
                self.recent_anomalies.pop_front();
            } else {
                break;
            }
        }
    }

    /// Confidence multiplier: decays with anomaly density, floored.
    fn anomaly_penalty(&mut self, now: Timestamp) -> f32 {
        self.prune_anomalies(now);
        let penalty = 1.0 - PENALTY_PER_ANOMALY * self.recent_anomalies.len() as f32;
        penalty.max(PENALTY_FLOOR)
    }

    /// Replace the configuration wholesale. Slots and emission anchors
    /// survive; stage and detector state is rebuilt.
    pub fn update_config(&mut self, config: CorrectionConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let (chain, detector, classifier, fusion, recent) = Self::build(&config, &self.clock);
        self.chain = chain;
        self.detector = detector;
        self.classifier = classifier;
        self.fusion = fusion;
        self.recent = recent;
        self.config = config;
        Ok(())
    }

    pub fn set_mode(&mut self, mode: crate::config::CorrectionMode) {
        self.config.mode = mode;
    }

    pub fn config(&self) -> &CorrectionConfig {
        &self.config
    }

    pub fn scene(&self) -> Scene {
        self.classifier.current()
    }

    /// (emitted corrections, anomalies recorded)
    pub fn counters(&self) -> (u64, u64) {
        (self.emitted, self.anomalies)
    }

    pub fn stage_failures(&self) -> Vec<(&'static str, u64)> {
        self.chain.failure_counts()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Clear all accumulated state (windows, slots, anchors, scene).
    pub fn reset(&mut self) {
        self.chain.reset();
        self.classifier.reset();
        self.recent.clear();
        self.slots.clear();
        self.last_emit_at = 0;
        self.last_emitted_time = 0;
        self.recent_anomalies.clear();
    }
}
