//! GeoFix Core - Multi-Source Location Correction Engine
//!
//! ## Overview
//!
//! GeoFix ingests raw geographic fixes emitted concurrently by several
//! positioning providers (satellite navigation, Wi-Fi triangulation,
//! cellular cell identification, inertial estimates), filters and
//! sanitises them, detects anomalies against temporal and kinematic
//! constraints, fuses the surviving fixes into a single best-estimate
//! position, and publishes corrected fixes to subscribers and a
//! historical store.
//!
//! ## Architecture
//!
//! Data flows leaves-first through a staged pipeline:
//!
//! ```text
//! Collectors ──▶ Ingest Queue ──▶ Processor Chain ──▶ Anomaly Bank
//!  (threads)     (bounded,         accuracy/stale/     time-gap/speed/
//!                 drop-oldest)     outlier/transform   statistical/pattern
//!                                                           │
//!        Subscribers ◀── Publisher ◀── Fusion ◀── Slots ◀───┘
//!        + History           │          (scene-adaptive
//!          Store             ▼           strategy)
//!                      CorrectedFix
//! ```
//!
//! The deterministic core is [`pipeline::CorrectionEngine`]: one call
//! takes one fix through the whole chain, driven by an injected clock.
//! [`pipeline::Pipeline`] wraps it with the thread model - collector
//! producers, a single consumer, and a dispatcher that delivers
//! listener callbacks outside all internal locks.
//!
//! ## Design Principles
//!
//! 1. **Explicit results**: stages and detectors return values, never
//!    panic across the pipeline boundary. A faulting stage drops one
//!    fix; only configuration faults and invariant violations surface.
//! 2. **Owned state, internal locks**: sliding windows expose only
//!    `push`/`snapshot`/`clear`; no lock is ever held across caller
//!    code or listener callbacks.
//! 3. **No singletons**: a [`sources::PipelineContext`] owns collectors,
//!    store and configuration, and is handed to the pipeline.
//! 4. **Deterministic under test**: every time-sensitive decision reads
//!    an injected [`time::TimeSource`].
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use geofix_core::config::CorrectionConfig;
//! use geofix_core::pipeline::Pipeline;
//! use geofix_core::sources::{PipelineContext, ReplayCollector};
//! use geofix_core::store::MemoryStore;
//! use geofix_core::SourceKind;
//!
//! # fn demo(track: Vec<geofix_core::Fix>) -> Result<(), geofix_core::errors::PipelineError> {
//! let store = Arc::new(MemoryStore::default());
//! let context = PipelineContext::new(CorrectionConfig::default(), store)
//!     .with_collector(
//!         SourceKind::Gnss,
//!         Box::new(ReplayCollector::new(track, Duration::from_millis(100))),
//!     );
//!
//! let mut pipeline = Pipeline::with_system_clock(context)?;
//! pipeline.start()?;
//! // ... corrected fixes flow to subscribers and the store ...
//! pipeline.stop();
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod anomaly;
pub mod confidence;
pub mod config;
pub mod constants;
pub mod errors;
pub mod fix;
pub mod fusion;
pub mod geo;
pub mod pipeline;
pub mod processors;
pub mod queue;
pub mod scene;
pub mod sources;
pub mod store;
pub mod time;
pub mod window;

// Public API
pub use confidence::Confidence;
pub use config::{CorrectionConfig, CorrectionMode, FusionStrategyKind, SceneConfig};
pub use fix::{CorrectedFix, Fix, FixBuilder, FixStatus, SourceKind};
pub use pipeline::{CorrectionEngine, LocationListener, Pipeline, PipelineState, PipelineStatus};
pub use scene::Scene;

/// Crate version, for telemetry and runtime checks.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
