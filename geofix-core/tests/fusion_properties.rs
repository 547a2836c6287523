//! Property-style tests for the fusion engine
//!
//! Exercises the engine's hard guarantees: bounding-box containment,
//! single-source passthrough, footprint subset isolation and the
//! round-trip law of the coordinate transform.

mod common;

use common::fix;

use geofix_core::config::{CorrectionConfig, FusionStrategyKind};
use geofix_core::fusion::FusionEngine;
use geofix_core::geo::{gcj02_to_wgs84, wgs84_to_gcj02};
use geofix_core::{Scene, SourceKind};

fn engine(strategy: FusionStrategyKind) -> FusionEngine {
    common::init_tracing();
    FusionEngine::from_config(&CorrectionConfig {
        fusion_strategy: strategy,
        ..Default::default()
    })
}

#[test]
fn fused_coordinate_always_inside_bbox() {
    // A spread of candidate sets across strategies
    let sets = vec![
        vec![
            fix(SourceKind::Gnss, 39.9042, 116.4074, 5.0, 1_000),
            fix(SourceKind::Wifi, 39.9043, 116.4076, 20.0, 1_050),
        ],
        vec![
            fix(SourceKind::Gnss, -33.8688, 151.2093, 8.0, 2_000),
            fix(SourceKind::Wifi, -33.8690, 151.2095, 30.0, 2_100),
            fix(SourceKind::Cellular, -33.8686, 151.2091, 120.0, 2_050),
        ],
        vec![
            fix(SourceKind::Gnss, 0.0001, 0.0001, 5.0, 3_000),
            fix(SourceKind::Inertial, -0.0001, -0.0001, 15.0, 3_010),
        ],
    ];

    for strategy in [
        FusionStrategyKind::Priority,
        FusionStrategyKind::WeightedAverage,
        FusionStrategyKind::FootprintCoherence,
        FusionStrategyKind::Adaptive,
    ] {
        let engine = engine(strategy);
        for fixes in &sets {
            let outcome = engine.fuse(fixes, Scene::Unknown).unwrap();

            let min_lat = fixes.iter().map(|f| f.latitude).fold(f64::INFINITY, f64::min);
            let max_lat = fixes.iter().map(|f| f.latitude).fold(f64::NEG_INFINITY, f64::max);
            let min_lon = fixes.iter().map(|f| f.longitude).fold(f64::INFINITY, f64::min);
            let max_lon = fixes.iter().map(|f| f.longitude).fold(f64::NEG_INFINITY, f64::max);

            assert!(
                outcome.latitude >= min_lat && outcome.latitude <= max_lat,
                "{strategy:?}: latitude escaped bbox"
            );
            assert!(
                outcome.longitude >= min_lon && outcome.longitude <= max_lon,
                "{strategy:?}: longitude escaped bbox"
            );

            // Max-of-contributors time and unit-range confidence
            assert_eq!(outcome.time, fixes.iter().map(|f| f.time).max().unwrap());
            let confidence = outcome.confidence.as_float();
            assert!((0.0..=1.0).contains(&confidence));
        }
    }
}

#[test]
fn single_source_returns_unchanged_with_priority_confidence() {
    common::init_tracing();
    let engine = FusionEngine::from_config(&CorrectionConfig {
        min_required_sources: 1,
        ..Default::default()
    });

    let wifi = fix(SourceKind::Wifi, 39.9, 116.4, 20.0, 1_000);
    let outcome = engine.fuse(std::slice::from_ref(&wifi), Scene::Unknown).unwrap();

    assert_eq!(outcome.latitude, wifi.latitude);
    assert_eq!(outcome.longitude, wifi.longitude);
    assert_eq!(outcome.accuracy, wifi.accuracy);
    // wifi priority 80 of gnss's 100
    assert!((outcome.confidence.as_float() - 0.8).abs() < 0.01);
}

#[test]
fn footprint_excludes_disjoint_contributor() {
    let engine = engine(FusionStrategyKind::FootprintCoherence);

    // A and B overlap heavily; C is disjoint from both
    let a = fix(SourceKind::Gnss, 39.90000, 116.40000, 10.0, 1_000);
    let b = fix(SourceKind::Wifi, 39.90004, 116.40004, 10.0, 1_020);
    let c = fix(SourceKind::Cellular, 39.93, 116.43, 10.0, 1_040);

    let outcome = engine.fuse(&[a.clone(), b.clone(), c], Scene::Unknown).unwrap();

    assert_eq!(
        outcome.details.get("selectedSourceCount").map(String::as_str),
        Some("2")
    );
    // The estimate sits between A and B, far from C
    assert!(outcome.latitude <= 39.90004 + 1e-9);
    assert!(outcome.longitude <= 116.40004 + 1e-9);
}

#[test]
fn transform_round_trip_within_epsilon() {
    common::init_tracing();
    // Sweep a grid across the region of validity
    let mut checked = 0;
    for lat_step in 0..8 {
        for lon_step in 0..8 {
            let lat = 20.0 + lat_step as f64 * 4.0;
            let lon = 80.0 + lon_step as f64 * 6.0;

            let (g_lat, g_lon) = wgs84_to_gcj02(lat, lon);
            let (w_lat, w_lon) = gcj02_to_wgs84(g_lat, g_lon);
            assert!(
                (w_lat - lat).abs() < 1e-7 && (w_lon - lon).abs() < 1e-7,
                "round trip failed at ({lat}, {lon})"
            );
            checked += 1;
        }
    }
    assert_eq!(checked, 64);
}
