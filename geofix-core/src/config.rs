//! Configuration surface of the correction pipeline
//!
//! Everything tunable lives in [`CorrectionConfig`]. The whole tree
//! derives serde so deployments can load it from JSON/TOML; defaults
//! match `constants.rs`. `validate()` is fatal at init - a pipeline
//! handed an invalid configuration refuses to start (configuration
//! faults are not recoverable at runtime).
//!
//! Configuration is read-heavy and replace-by-swap: the running engine
//! takes a snapshot, and `update_config` installs a whole new value
//! under the configuration lock. No per-field mutation happens during
//! processing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::anomaly::FixPattern;
use crate::constants::{anomaly, fusion, pipeline, processors, queue, scene as scene_defaults};
use crate::errors::ConfigError;
use crate::fix::SourceKind;
use crate::geo::Datum;
use crate::scene::{Scene, SceneThresholds};

/// Strategy applied by the fusion engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FusionStrategyKind {
    Priority,
    WeightedAverage,
    FootprintCoherence,
    Adaptive,
}

/// How the weighted-average strategy derives per-fix weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WeightMode {
    Equal,
    InverseAccuracy,
    Custom,
}

/// Rule the composite detector uses to fuse per-detector verdicts.
///
/// Majority vote needs `min_votes` agreeing detectors; the other two
/// compare the fused confidence against `anomaly.min_confidence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerdictRule {
    MajorityVote,
    WeightedAverage,
    Threshold,
}

/// Orthogonal throttling knob over the emission debounce interval.
///
/// Mode never changes which strategy runs - the scene does that. It only
/// scales `min_correction_interval`, and `Offline` additionally skips
/// history writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CorrectionMode {
    Normal,
    HighAccuracy,
    LowPower,
    FastUpdate,
    Offline,
}

impl CorrectionMode {
    /// Effective debounce interval for a configured base interval.
    pub fn interval_for(&self, base_ms: u64) -> u64 {
        match self {
            CorrectionMode::Normal => base_ms,
            CorrectionMode::HighAccuracy => (base_ms / 2).max(100),
            CorrectionMode::LowPower | CorrectionMode::Offline => (base_ms * 2).max(1_000),
            CorrectionMode::FastUpdate => (base_ms / 4).max(50),
        }
    }

    /// Whether corrections are persisted to the history store.
    pub fn persists(&self) -> bool {
        !matches!(self, CorrectionMode::Offline)
    }
}

/// Limits consulted by the anomaly detector bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnomalyThresholds {
    /// Max age before the time-gap detector fires (ms)
    pub max_time_gap_ms: u64,
    /// Max displacement between consecutive fixes (m)
    pub max_distance_m: f64,
    /// Kinematic speed ceiling (m/s)
    pub max_speed_mps: f64,
    /// Context fixes with an accuracy radius above this are ignored by
    /// detectors; 0 disables the filter (m)
    pub min_accuracy_m: f64,
    /// Acceleration ceiling between consecutive fixes (m/s^2)
    pub max_acceleration_mps2: f64,
    /// Composite verdict threshold for weighted/threshold policies
    pub min_confidence: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            max_time_gap_ms: anomaly::MAX_TIME_GAP_MS,
            max_distance_m: anomaly::MAX_DISTANCE_M,
            max_speed_mps: anomaly::MAX_SPEED_MPS,
            min_accuracy_m: 0.0,
            max_acceleration_mps2: anomaly::MAX_ACCELERATION_MPS2,
            min_confidence: anomaly::MIN_CONFIDENCE,
        }
    }
}

/// Per-scene fusion policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneConfig {
    pub scene: Scene,
    pub strategy: FusionStrategyKind,
    /// Per-source weights for weighted strategies
    #[serde(default)]
    pub source_weights: BTreeMap<SourceKind, f64>,
    /// Per-source priorities for the priority strategy
    #[serde(default)]
    pub source_priorities: BTreeMap<SourceKind, i32>,
    pub min_required_sources: usize,
    /// Kinematic ceiling while this scene is active (m/s)
    pub max_speed_mps: f64,
    /// Accuracy floor applied to fixes in this scene (m)
    pub min_accuracy_m: f64,
}

impl SceneConfig {
    pub fn new(scene: Scene, strategy: FusionStrategyKind) -> Self {
        Self {
            scene,
            strategy,
            source_weights: BTreeMap::new(),
            source_priorities: BTreeMap::new(),
            min_required_sources: fusion::MIN_REQUIRED_SOURCES,
            max_speed_mps: anomaly::MAX_SPEED_MPS,
            min_accuracy_m: 0.0,
        }
    }

    pub fn with_weight(mut self, source: SourceKind, weight: f64) -> Self {
        self.source_weights.insert(source, weight.max(0.0));
        self
    }

    pub fn with_priority(mut self, source: SourceKind, priority: i32) -> Self {
        self.source_priorities.insert(source, priority);
        self
    }

    pub fn with_min_sources(mut self, min: usize) -> Self {
        self.min_required_sources = min.max(1);
        self
    }
}

fn default_priorities() -> BTreeMap<SourceKind, i32> {
    BTreeMap::from([
        (SourceKind::Gnss, fusion::PRIORITY_GNSS),
        (SourceKind::Wifi, fusion::PRIORITY_WIFI),
        (SourceKind::Cellular, fusion::PRIORITY_CELLULAR),
        (SourceKind::Inertial, fusion::PRIORITY_INERTIAL),
    ])
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CorrectionConfig {
    // Collector wiring
    pub enable_gnss: bool,
    pub enable_wifi: bool,
    pub enable_cellular: bool,

    // Fusion
    pub fusion_strategy: FusionStrategyKind,
    pub scene_configs: BTreeMap<Scene, SceneConfig>,
    pub min_required_sources: usize,
    pub weight_mode: WeightMode,
    pub source_weights: BTreeMap<SourceKind, f64>,
    pub source_priorities: BTreeMap<SourceKind, i32>,
    pub max_footprint_radius_m: f64,
    pub coherence_threshold: f64,

    // Anomaly detection
    pub anomaly: AnomalyThresholds,
    /// Bad-data signatures loaded into the pattern detector
    pub anomaly_patterns: Vec<FixPattern>,
    /// Similarity a pattern match must reach to flag a fix
    pub pattern_threshold: f64,
    pub verdict_rule: VerdictRule,
    /// Agreeing detectors required under majority vote
    pub min_votes: usize,
    pub z_threshold: f64,
    pub statistical_window: usize,
    pub min_samples: usize,
    pub threshold_factor: f64,

    // Processor chain
    pub min_accuracy_m: f64,
    pub max_accuracy_m: f64,
    pub max_time_diff_ms: u64,
    /// Datum fixes arrive in and the datum corrections are published in.
    /// Identity when equal (the default).
    pub source_datum: Datum,
    pub target_datum: Datum,

    // Orchestration
    pub queue_capacity: usize,
    pub min_correction_interval_ms: u64,
    pub correlation_window_ms: u64,
    pub scene_check_interval_ms: u64,
    pub scene_thresholds: SceneThresholds,
    pub mode: CorrectionMode,

    // High-throughput variant
    pub enable_batching: bool,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
    pub enable_caching: bool,
    pub cache_size: usize,
    pub cache_timeout_ms: u64,

    /// Free-form algorithm parameters (smoothing factor, confidence
    /// threshold, ...) consulted by strategies via [`Self::param`].
    pub params: BTreeMap<String, f64>,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            enable_gnss: true,
            enable_wifi: true,
            enable_cellular: true,

            fusion_strategy: FusionStrategyKind::WeightedAverage,
            scene_configs: BTreeMap::new(),
            min_required_sources: fusion::MIN_REQUIRED_SOURCES,
            weight_mode: WeightMode::InverseAccuracy,
            source_weights: BTreeMap::new(),
            source_priorities: default_priorities(),
            max_footprint_radius_m: fusion::MAX_FOOTPRINT_RADIUS_M,
            coherence_threshold: fusion::COHERENCE_THRESHOLD,

            anomaly: AnomalyThresholds::default(),
            anomaly_patterns: Vec::new(),
            pattern_threshold: anomaly::PATTERN_THRESHOLD,
            verdict_rule: VerdictRule::MajorityVote,
            min_votes: anomaly::MIN_VOTES,
            z_threshold: anomaly::Z_THRESHOLD,
            statistical_window: processors::OUTLIER_WINDOW,
            min_samples: processors::OUTLIER_MIN_SAMPLES,
            threshold_factor: processors::OUTLIER_THRESHOLD_FACTOR,

            min_accuracy_m: processors::MIN_ACCURACY_M,
            max_accuracy_m: processors::MAX_ACCURACY_M,
            max_time_diff_ms: processors::MAX_TIME_DIFF_MS,
            source_datum: Datum::Wgs84,
            target_datum: Datum::Wgs84,

            queue_capacity: queue::DEFAULT_CAPACITY,
            min_correction_interval_ms: pipeline::MIN_CORRECTION_INTERVAL_MS,
            correlation_window_ms: pipeline::CORRELATION_WINDOW_MS,
            scene_check_interval_ms: scene_defaults::CHECK_INTERVAL_MS,
            scene_thresholds: SceneThresholds::default(),
            mode: CorrectionMode::Normal,

            enable_batching: false,
            batch_size: pipeline::BATCH_SIZE,
            batch_timeout_ms: pipeline::BATCH_TIMEOUT_MS,
            enable_caching: false,
            cache_size: pipeline::CACHE_SIZE,
            cache_timeout_ms: pipeline::CACHE_TTL_MS,

            params: BTreeMap::new(),
        }
    }
}

impl CorrectionConfig {
    /// Algorithm parameter lookup with a default.
    pub fn param(&self, key: &str, default: f64) -> f64 {
        self.params.get(key).copied().unwrap_or(default)
    }

    /// Whether collectors of this kind are wired. Kinds without an
    /// enable flag are wired whenever registered.
    pub fn source_enabled(&self, kind: SourceKind) -> bool {
        match kind {
            SourceKind::Gnss => self.enable_gnss,
            SourceKind::Wifi => self.enable_wifi,
            SourceKind::Cellular => self.enable_cellular,
            _ => true,
        }
    }

    /// Count of collector kinds that will be wired.
    pub fn enabled_sources(&self) -> usize {
        [self.enable_gnss, self.enable_wifi, self.enable_cellular]
            .iter()
            .filter(|&&on| on)
            .count()
    }

    pub fn scene_config(&self, scene: Scene) -> Option<&SceneConfig> {
        self.scene_configs.get(&scene)
    }

    pub fn add_scene_config(&mut self, config: SceneConfig) {
        self.scene_configs.insert(config.scene, config);
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_accuracy_m < self.min_accuracy_m {
            return Err(ConfigError::AccuracyRangeInverted {
                min: self.min_accuracy_m,
                max: self.max_accuracy_m,
            });
        }
        if self.z_threshold <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "z_threshold",
                value: self.z_threshold,
            });
        }
        if self.threshold_factor <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "threshold_factor",
                value: self.threshold_factor,
            });
        }
        if self.anomaly.max_speed_mps <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "anomaly.max_speed_mps",
                value: self.anomaly.max_speed_mps,
            });
        }
        if self.correlation_window_ms == 0 {
            return Err(ConfigError::NonPositive {
                field: "correlation_window_ms",
                value: 0.0,
            });
        }
        if self.max_footprint_radius_m <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "max_footprint_radius_m",
                value: self.max_footprint_radius_m,
            });
        }
        if !(0.0..=1.0).contains(&self.coherence_threshold) {
            return Err(ConfigError::OutOfUnitRange {
                field: "coherence_threshold",
                value: self.coherence_threshold,
            });
        }
        if !(0.0..=1.0).contains(&self.anomaly.min_confidence) {
            return Err(ConfigError::OutOfUnitRange {
                field: "anomaly.min_confidence",
                value: self.anomaly.min_confidence,
            });
        }
        if !(0.0..=1.0).contains(&self.pattern_threshold) {
            return Err(ConfigError::OutOfUnitRange {
                field: "pattern_threshold",
                value: self.pattern_threshold,
            });
        }
        if self.min_votes == 0 {
            return Err(ConfigError::NonPositive {
                field: "min_votes",
                value: 0.0,
            });
        }
        if self.enabled_sources() == 0 {
            return Err(ConfigError::NoSourcesEnabled);
        }
        // Inertial/other collectors can be registered beyond the three
        // flags, so only a requirement no source set could meet is fatal.
        if self.min_required_sources > SOURCE_KIND_COUNT {
            return Err(ConfigError::TooFewSources {
                required: self.min_required_sources,
                enabled: SOURCE_KIND_COUNT,
            });
        }
        Ok(())
    }
}

/// Distinct non-fused source kinds.
const SOURCE_KIND_COUNT: usize = 5;
