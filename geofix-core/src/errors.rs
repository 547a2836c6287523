//! Error types for the correction pipeline
//!
//! Keep errors small - they travel through hot paths. Stage and detector
//! faults are recovered inside the consumer loop (drop + counter + log);
//! only configuration and invariant violations reach public APIs.

use thiserror::Error;

/// Configuration faults. Fatal at init: the pipeline refuses to start.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Accuracy window inverted (max below min)
    #[error("accuracy range inverted: min {min} > max {max}")]
    AccuracyRangeInverted { min: f64, max: f64 },

    /// A value that must be strictly positive was not
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    /// A ratio/threshold escaped the unit interval
    #[error("{field} must lie in [0, 1], got {value}")]
    OutOfUnitRange { field: &'static str, value: f64 },

    /// Every collector flag is off
    #[error("no location sources enabled")]
    NoSourcesEnabled,

    /// Fusion can never trigger with this source set
    #[error("min_required_sources {required} exceeds enabled sources {enabled}")]
    TooFewSources { required: usize, enabled: usize },
}

/// Faults raised by a single processor stage.
///
/// A stage returning `Err` drops the offending fix; it never poisons the
/// pipeline. `StateInvariant` is the exception: it marks stage state as
/// corrupted and terminates the consumer loop with a fatal status.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    /// Coordinate outside latitude/longitude bounds
    #[error("coordinate out of range: lat {lat}, lon {lon}")]
    CoordinateOutOfRange { lat: f64, lon: f64 },

    /// A numeric field is NaN or infinite
    #[error("non-finite {field} in fix")]
    NonFinite { field: &'static str },

    /// Stage-internal invariant broken; unrecoverable
    #[error("stage state invariant violated: {reason}")]
    StateInvariant { reason: &'static str },
}

/// Faults raised by the fusion engine.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum FusionError {
    /// Fewer distinct valid sources than the policy requires
    #[error("not enough sources for fusion: need {required}, have {available}")]
    InsufficientSources { required: usize, available: usize },

    /// Every candidate was invalid or anomalous
    #[error("no valid fixes to fuse")]
    NoValidFixes,
}

/// History-store faults. Surfaced to the supervisor as a degradation
/// event; the pipeline keeps running.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// Record line missing or mangling a fixed field
    #[error("malformed record: bad {field}")]
    MalformedRecord { field: &'static str },

    #[error("store is closed")]
    Closed,
}

/// Collector faults.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("collector already running")]
    AlreadyRunning,

    #[error("collector failed to start: {reason}")]
    StartFailed { reason: &'static str },
}

/// Pipeline lifecycle faults reported by `start()` / `stop()`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("pipeline already running")]
    AlreadyRunning,

    #[error("pipeline is not running")]
    NotRunning,

    #[error(transparent)]
    Source(#[from] SourceError),
}
