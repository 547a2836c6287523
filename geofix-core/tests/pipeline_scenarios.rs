//! End-to-end scenarios for the correction engine
//!
//! Each test drives the synchronous engine through a concrete scenario:
//! calm two-source fusion, teleport rejection, staleness, scene-adaptive
//! policy switching, queue overflow and footprint isolation.

mod common;

use common::{constant_speed_track, engine_with_clock, fix};

use std::sync::Arc;

use geofix_core::anomaly::{FixPattern, Region};
use geofix_core::config::{
    AnomalyThresholds, CorrectionConfig, FusionStrategyKind, SceneConfig, VerdictRule,
};
use geofix_core::geo::Datum;
use geofix_core::pipeline::{DropReason, Outcome};
use geofix_core::processors::{
    AccuracyFilter, OutlierStage, ProcessorChain, StalenessFilter, TransformStage,
};
use geofix_core::queue::IngestQueue;
use geofix_core::time::{FixedClock, TimeSource};
use geofix_core::{CorrectedFix, FixBuilder, Scene, SourceKind};

fn expect_emitted(outcome: Outcome) -> CorrectedFix {
    match outcome {
        Outcome::Emitted(corrected) => corrected,
        other => panic!("expected emission, got {other:?}"),
    }
}

#[test]
fn two_source_calm_fusion() {
    let config = CorrectionConfig {
        fusion_strategy: FusionStrategyKind::WeightedAverage,
        ..Default::default()
    };
    let (mut engine, _clock) = engine_with_clock(config, 1_100);

    let sat = fix(SourceKind::Gnss, 39.9042, 116.4074, 5.0, 1_000);
    let wifi = fix(SourceKind::Wifi, 39.9043, 116.4076, 20.0, 1_050);

    assert_eq!(engine.ingest(sat), Outcome::Pending);
    let corrected = expect_emitted(engine.ingest(wifi));

    // Accuracy-based weights 0.8/0.2: satellite-dominant average
    assert!((corrected.latitude - 39.90422).abs() < 1e-5);
    assert!((corrected.longitude - 116.40744).abs() < 1e-5);
    assert_eq!(corrected.time, 1_050);
    assert!(corrected.fused);
    assert_eq!(corrected.source_count, 2);
    assert_eq!(corrected.source, SourceKind::Fused);

    // Universal emission invariants
    assert!(corrected.time >= corrected.original.time);
    let confidence = corrected.confidence.as_float();
    assert!((0.0..=1.0).contains(&confidence));
}

#[test]
fn teleport_anomaly_rejected() {
    let (mut engine, clock) = engine_with_clock(CorrectionConfig::default(), 10_100);

    // Ten satellite fixes inside a tight cluster around (39.9, 116.4)
    for i in 0..10u64 {
        let jitter = (i % 4) as f64 * 5e-6;
        clock.set(10_100 + i * 1_000);
        let outcome = engine.ingest(fix(
            SourceKind::Gnss,
            39.9 + jitter,
            116.4,
            5.0,
            10_000 + i * 1_000,
        ));
        assert!(
            !matches!(outcome, Outcome::Anomaly(_)),
            "cluster fix {i} flagged: {outcome:?}"
        );
    }

    // One second later, a fix a whole degree away
    clock.set(20_100);
    let outcome = engine.ingest(fix(SourceKind::Gnss, 40.9, 117.4, 5.0, 20_000));
    let Outcome::Anomaly(anomaly) = outcome else {
        panic!("teleport not flagged: {outcome:?}");
    };
    assert_eq!(anomaly.status, geofix_core::FixStatus::Anomaly);

    let (emitted, anomalies) = engine.counters();
    assert_eq!(emitted, 0, "single-source input must never fuse");
    assert_eq!(anomalies, 1);

    // The trajectory continues undisturbed afterwards
    clock.set(21_100);
    let outcome = engine.ingest(fix(SourceKind::Gnss, 39.900012, 116.4, 5.0, 21_000));
    assert!(!matches!(outcome, Outcome::Anomaly(_)));
}

#[test]
fn stale_fix_dropped_before_fusion() {
    let config = CorrectionConfig {
        max_time_diff_ms: 60_000,
        ..Default::default()
    };
    let (mut engine, _clock) = engine_with_clock(config, 200_000);

    // 120 s old against the 60 s cutoff
    let outcome = engine.ingest(fix(SourceKind::Gnss, 39.9, 116.4, 5.0, 80_000));
    assert_eq!(outcome, Outcome::Dropped(DropReason::Invalid));
    assert_eq!(engine.slot_count(), 0);
}

#[test]
fn scene_switch_to_driving_policy() {
    let mut config = CorrectionConfig {
        fusion_strategy: FusionStrategyKind::Adaptive,
        scene_check_interval_ms: 1,
        min_correction_interval_ms: 0,
        // A constant-velocity track is legitimate motion, not an outlier
        threshold_factor: 5.0,
        anomaly: AnomalyThresholds {
            max_speed_mps: 60.0,
            ..Default::default()
        },
        ..Default::default()
    };
    config.add_scene_config(
        SceneConfig::new(Scene::Driving, FusionStrategyKind::Priority)
            .with_priority(SourceKind::Gnss, 120),
    );
    let (mut engine, clock) = engine_with_clock(config, 10_050);

    let track = constant_speed_track(
        &[SourceKind::Gnss, SourceKind::Wifi],
        30.0, // m/s: inside the driving band, below highway
        500,
        20,
        5.0,
    );

    let mut last_emission = None;
    for fix in track {
        clock.set(fix.time + 50);
        match engine.ingest(fix) {
            Outcome::Emitted(corrected) => last_emission = Some(corrected),
            Outcome::Anomaly(anomaly) => panic!("steady driving flagged: {anomaly:?}"),
            _ => {}
        }
    }

    assert_eq!(engine.scene(), Scene::Driving);

    let corrected = last_emission.expect("driving track should fuse");
    assert!(
        corrected.method.contains("driving") && corrected.method.contains("priority"),
        "method tag should carry the driving policy: {}",
        corrected.method
    );
    assert_eq!(
        corrected.details.get("selectedSource").map(String::as_str),
        Some("gnss")
    );
}

#[test]
fn queue_overflow_drops_oldest_keeps_order() {
    let queue = IngestQueue::new(4);
    for i in 0..10u64 {
        let source = if i % 2 == 0 { SourceKind::Gnss } else { SourceKind::Wifi };
        queue.push(fix(source, 39.9042, 116.4074, 5.0, 1_000 + i * 10));
    }

    assert_eq!(
        queue.stats().dropped.load(std::sync::atomic::Ordering::Relaxed),
        6
    );

    // The surviving four drain through the engine in arrival order
    let config = CorrectionConfig {
        min_correction_interval_ms: 0,
        ..Default::default()
    };
    let (mut engine, _clock) = engine_with_clock(config, 1_200);

    let mut survivor_times = Vec::new();
    let mut emission_times = Vec::new();
    while let Some(fix) = queue.pop() {
        survivor_times.push(fix.time);
        if let Outcome::Emitted(corrected) = engine.ingest(fix) {
            emission_times.push(corrected.time);
        }
    }

    assert_eq!(survivor_times, vec![1_060, 1_070, 1_080, 1_090]);
    assert!(!emission_times.is_empty());
    assert!(emission_times.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn footprint_isolation_in_pipeline() {
    let config = CorrectionConfig {
        fusion_strategy: FusionStrategyKind::FootprintCoherence,
        min_correction_interval_ms: 0,
        ..Default::default()
    };
    let (mut engine, _clock) = engine_with_clock(config, 1_100);

    // A and B nearly coincide; their footprints overlap heavily
    let a = fix(SourceKind::Gnss, 39.90000, 116.40000, 10.0, 1_000);
    let b = fix(SourceKind::Wifi, 39.90005, 116.40005, 10.0, 1_050);

    assert_eq!(engine.ingest(a), Outcome::Pending);
    let corrected = expect_emitted(engine.ingest(b));

    assert_eq!(corrected.method, "footprint-coherence");
    // Output stays inside the A/B cluster
    assert!(corrected.latitude >= 39.90000 && corrected.latitude <= 39.90005);
    assert!(corrected.longitude >= 116.40000 && corrected.longitude <= 116.40005);
}

#[test]
fn all_invalid_window_produces_no_emission() {
    let config = CorrectionConfig {
        max_time_diff_ms: 1_000,
        ..Default::default()
    };
    let (mut engine, _clock) = engine_with_clock(config, 100_000);

    // Every input in the window is stale
    for i in 0..5u64 {
        let outcome = engine.ingest(fix(SourceKind::Gnss, 39.9, 116.4, 5.0, 10_000 + i));
        assert_eq!(outcome, Outcome::Dropped(DropReason::Invalid));
    }

    let (emitted, _) = engine.counters();
    assert_eq!(emitted, 0);
    assert_eq!(engine.slot_count(), 0);
}

#[test]
fn configured_pattern_flags_matching_fix() {
    let config = CorrectionConfig {
        // A single pattern hit is decisive under the threshold rule
        verdict_rule: VerdictRule::Threshold,
        anomaly_patterns: vec![FixPattern::new("spoofed-ap")
            .source(SourceKind::Wifi)
            .accuracy_range(50.0, 500.0)
            .region(Region {
                min_lat: 39.9,
                max_lat: 40.0,
                min_lon: 116.4,
                max_lon: 116.5,
            })
            .attribute("bssid", "de:ad:be:ef:00:01")
            .strict()],
        ..Default::default()
    };
    let (mut engine, _clock) = engine_with_clock(config, 1_100);

    // A fix matching the signature is rejected with its provenance
    let spoofed = FixBuilder::new(SourceKind::Wifi, 1_000)
        .position(39.95, 116.45)
        .accuracy(80.0)
        .attribute("bssid", "de:ad:be:ef:00:01")
        .build();
    let outcome = engine.ingest(spoofed);
    let Outcome::Anomaly(anomaly) = outcome else {
        panic!("pattern match not flagged: {outcome:?}");
    };
    assert_eq!(anomaly.attribute("anomaly.type"), Some("pattern-match"));
    assert_eq!(anomaly.attribute("anomaly.patternName"), Some("spoofed-ap"));

    // An ordinary fix sails through the same bank
    let outcome = engine.ingest(fix(SourceKind::Gnss, 39.9042, 116.4074, 5.0, 1_050));
    assert!(!matches!(outcome, Outcome::Anomaly(_)));

    let (_, anomalies) = engine.counters();
    assert_eq!(anomalies, 1);
}

#[test]
fn processor_chain_is_idempotent() {
    common::init_tracing();
    let clock: Arc<dyn TimeSource> = Arc::new(FixedClock::new(10_000));
    let mut chain = ProcessorChain::new()
        .with_stage(Box::new(AccuracyFilter::new(0.0, 100.0)))
        .with_stage(Box::new(StalenessFilter::new(60_000, Arc::clone(&clock))))
        .with_stage(Box::new(OutlierStage::new(50, 2.0, 5)))
        .with_stage(Box::new(TransformStage::new(Datum::Wgs84, Datum::Gcj02)));

    for sample in [
        fix(SourceKind::Gnss, 39.9042, 116.4074, 5.0, 9_500), // converted
        fix(SourceKind::Wifi, 48.8566, 2.3522, 250.0, 9_600), // low accuracy, outside region
    ] {
        let once = chain.process(sample).unwrap();
        let twice = chain.process(once.clone()).unwrap();
        assert_eq!(once, twice);
    }
}

#[test]
fn emissions_monotonic_across_scenes() {
    let config = CorrectionConfig {
        min_correction_interval_ms: 100,
        ..Default::default()
    };
    let (mut engine, clock) = engine_with_clock(config, 1_100);

    let mut times = Vec::new();
    for round in 0u64..8 {
        let base = 1_000 + round * 300;
        clock.set(base + 100);
        engine.ingest(fix(SourceKind::Gnss, 39.9042, 116.4074, 5.0, base));
        if let Outcome::Emitted(c) =
            engine.ingest(fix(SourceKind::Wifi, 39.904201, 116.407401, 20.0, base + 50))
        {
            times.push(c.time);
        }
    }

    assert!(times.len() >= 3);
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}
