//! Shared helpers for integration tests
#![allow(dead_code)]

use std::sync::Arc;

use geofix_core::config::CorrectionConfig;
use geofix_core::pipeline::CorrectionEngine;
use geofix_core::time::{FixedClock, TimeSource};
use geofix_core::{Fix, FixBuilder, SourceKind};

/// Install the test log subscriber. Idempotent - later calls are no-ops,
/// so every test can call it unconditionally. Run tests with
/// `-- --nocapture` to see the pipeline's tracing output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A fix at an explicit position/accuracy/time.
pub fn fix(source: SourceKind, lat: f64, lon: f64, accuracy: f64, time: u64) -> Fix {
    FixBuilder::new(source, time)
        .position(lat, lon)
        .accuracy(accuracy)
        .source_id(format!("{}0", source.name()))
        .build()
}

/// Engine driven by a shared steppable clock.
pub fn engine_with_clock(
    config: CorrectionConfig,
    now: u64,
) -> (CorrectionEngine, Arc<FixedClock>) {
    init_tracing();
    let clock = Arc::new(FixedClock::new(now));
    let engine = CorrectionEngine::new(config, Arc::clone(&clock) as Arc<dyn TimeSource>)
        .expect("valid test config");
    (engine, clock)
}

/// A straight northbound track at constant speed, one fix per step.
///
/// Sources alternate through `sources` so the track exercises fusion.
pub fn constant_speed_track(
    sources: &[SourceKind],
    speed_mps: f64,
    step_ms: u64,
    count: usize,
    accuracy: f64,
) -> Vec<Fix> {
    let deg_per_step = speed_mps * (step_ms as f64 / 1_000.0) / 111_320.0;
    (0..count)
        .map(|i| {
            let source = sources[i % sources.len()];
            fix(
                source,
                39.9 + deg_per_step * i as f64,
                116.4,
                accuracy,
                10_000 + i as u64 * step_ms,
            )
        })
        .collect()
}
