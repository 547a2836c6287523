//! Default thresholds, capacities and intervals
//!
//! Single home for every tunable default so the config layer and tests
//! agree on one set of numbers. Grouped by subsystem.

/// Ingest queue
pub mod queue {
    /// Default bounded-queue capacity (fixes)
    pub const DEFAULT_CAPACITY: usize = 1_000;

    /// Consumer wait per poll when the queue is empty (ms)
    pub const POP_WAIT_MS: u64 = 50;
}

/// Processor chain
pub mod processors {
    /// Accuracy filter bounds (meters)
    pub const MIN_ACCURACY_M: f64 = 0.0;
    pub const MAX_ACCURACY_M: f64 = 100.0;

    /// Staleness cutoff (ms)
    pub const MAX_TIME_DIFF_MS: u64 = 60_000;

    /// Statistical outlier window length and firing threshold
    pub const OUTLIER_WINDOW: usize = 50;
    pub const OUTLIER_MIN_SAMPLES: usize = 5;
    pub const OUTLIER_THRESHOLD_FACTOR: f64 = 2.0;

    /// Distance stddev below this is clamped up to avoid early-regime
    /// false positives (meters)
    pub const OUTLIER_STDDEV_FLOOR_M: f64 = 1.0;

    /// Stage ordering: accuracy -> staleness -> outlier -> transform
    pub const PRIORITY_ACCURACY: i32 = 10;
    pub const PRIORITY_STALENESS: i32 = 20;
    pub const PRIORITY_OUTLIER: i32 = 30;
    pub const PRIORITY_TRANSFORM: i32 = 40;
}

/// Anomaly detection
pub mod anomaly {
    /// Time-gap detector cutoff (ms)
    pub const MAX_TIME_GAP_MS: u64 = 60_000;

    /// Kinematic plausibility ceiling (m/s)
    pub const MAX_SPEED_MPS: f64 = 30.0;

    /// Hard ceiling on acceleration between consecutive fixes (m/s^2)
    pub const MAX_ACCELERATION_MPS2: f64 = 10.0;

    /// Max plausible displacement between consecutive fixes (m)
    pub const MAX_DISTANCE_M: f64 = 1_000.0;

    /// Z-score threshold for the statistical detector
    pub const Z_THRESHOLD: f64 = 2.0;

    /// Pattern-similarity threshold
    pub const PATTERN_THRESHOLD: f64 = 0.7;

    /// Composite: detectors that must agree under majority vote
    pub const MIN_VOTES: usize = 2;

    /// Composite: minimum fused confidence for weighted/threshold rules
    pub const MIN_CONFIDENCE: f64 = 0.3;

    /// Anomalies inside this trailing window depress emission confidence
    pub const PENALTY_WINDOW_MS: u64 = 30_000;

    /// Per-anomaly confidence penalty and its floor
    pub const PENALTY_PER_ANOMALY: f32 = 0.05;
    pub const PENALTY_FLOOR: f32 = 0.5;
}

/// Scene classification
pub mod scene {
    /// Classifier runs at most this often (ms)
    pub const CHECK_INTERVAL_MS: u64 = 5_000;

    /// Recent-fix history consulted by the classifier
    pub const HISTORY: usize = 50;

    /// Instantaneous-speed pairs used for the median estimate
    pub const SPEED_PAIRS: usize = 5;

    /// Speed bands (m/s)
    pub const STATIONARY_MPS: f64 = 0.5;
    pub const WALKING_MPS: f64 = 0.5;
    pub const RUNNING_MPS: f64 = 2.5;
    pub const DRIVING_MPS: f64 = 8.0;
    pub const HIGHWAY_MPS: f64 = 33.0;

    /// Satellite accuracy below this while slow reads as open sky (m)
    pub const OUTDOOR_ACCURACY_M: f64 = 10.0;

    /// Satellite accuracy at/above this while driving reads as
    /// multipath-degraded urban canyon (m)
    pub const URBAN_CANYON_ACCURACY_M: f64 = 30.0;
}

/// Fusion engine
pub mod fusion {
    /// Distinct sources required before fusion triggers
    pub const MIN_REQUIRED_SOURCES: usize = 2;

    /// Footprint radius cap (m) and coherence acceptance threshold
    pub const MAX_FOOTPRINT_RADIUS_M: f64 = 50.0;
    pub const COHERENCE_THRESHOLD: f64 = 0.7;

    /// Default per-source priorities
    pub const PRIORITY_GNSS: i32 = 100;
    pub const PRIORITY_WIFI: i32 = 80;
    pub const PRIORITY_CELLULAR: i32 = 60;
    pub const PRIORITY_INERTIAL: i32 = 20;
}

/// Pipeline orchestration
pub mod pipeline {
    /// Fixes from distinct sources are concurrent inside this window (ms)
    pub const CORRELATION_WINDOW_MS: u64 = 500;

    /// Emission debounce (ms)
    pub const MIN_CORRECTION_INTERVAL_MS: u64 = 500;

    /// High-throughput batching
    pub const BATCH_SIZE: usize = 10;
    pub const BATCH_TIMEOUT_MS: u64 = 100;

    /// Correction cache
    pub const CACHE_SIZE: usize = 100;
    pub const CACHE_TTL_MS: u64 = 300_000;
    pub const CACHE_KEY_GRANULARITY_MS: u64 = 1_000;
}

/// History store
pub mod store {
    /// In-memory store capacity (fixes)
    pub const MEMORY_CAPACITY: usize = 10_000;

    /// File store rotation triggers
    pub const ROTATE_INTERVAL_MS: u64 = 3_600_000;
    pub const ROTATE_MAX_BYTES: u64 = 10 * 1024 * 1024;
}

/// Geodesy
pub mod geo {
    /// Mean Earth radius (m), haversine
    pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

    /// Krasovsky 1940 ellipsoid, used by the GCJ-02 obfuscation
    pub const KRASOVSKY_A: f64 = 6_378_245.0;
    pub const KRASOVSKY_EE: f64 = 0.006_693_421_622_965_943;

    /// Iterative inverse-transform convergence (degrees) and cap
    pub const INVERSE_EPSILON_DEG: f64 = 1e-9;
    pub const INVERSE_MAX_ITERATIONS: usize = 16;
}
