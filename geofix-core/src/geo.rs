//! Geodesy: great-circle math and the WGS84 <-> GCJ-02 datum transform
//!
//! ## Distance and bearing
//!
//! Distances use the haversine formula on a spherical Earth
//! (R = 6 371 000 m). At the accuracies this pipeline works with (meters
//! to tens of meters) the spherical approximation error is negligible.
//!
//! ## GCJ-02
//!
//! GCJ-02 is the obfuscated datum mandated for maps of mainland China: a
//! position-dependent pseudo-random offset added to WGS84 coordinates,
//! built from sine series over the Krasovsky 1940 ellipsoid. The forward
//! transform is closed-form; the published inverse is only approximate,
//! so [`gcj02_to_wgs84`] refines it by fixed-point iteration until the
//! forward image of the estimate lands within 1e-9 degrees of the input.
//! That keeps `forward(inverse(p))` within 1e-7 degrees everywhere in the
//! declared region of validity.
//!
//! Outside mainland China the offset is not defined and both transforms
//! are the identity.

use crate::constants::geo::{
    EARTH_RADIUS_M, INVERSE_EPSILON_DEG, INVERSE_MAX_ITERATIONS, KRASOVSKY_A, KRASOVSKY_EE,
};

/// Great-circle distance between two coordinates, in meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let rad_lat1 = lat1.to_radians();
    let rad_lat2 = lat2.to_radians();
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + rad_lat1.cos() * rad_lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial bearing from point 1 to point 2, degrees in 0..360.
pub fn bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let rad_lat1 = lat1.to_radians();
    let rad_lat2 = lat2.to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let y = d_lon.sin() * rad_lat2.cos();
    let x = rad_lat1.cos() * rad_lat2.sin() - rad_lat1.sin() * rad_lat2.cos() * d_lon.cos();
    let bearing = y.atan2(x).to_degrees();

    if bearing < 0.0 {
        bearing + 360.0
    } else {
        bearing
    }
}

/// Geodetic datums the transform stage converts between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Datum {
    Wgs84,
    Gcj02,
}

/// Region of validity of the GCJ-02 offset: a mainland-China bounding box.
pub fn in_transform_region(lat: f64, lon: f64) -> bool {
    (0.8293..=55.8271).contains(&lat) && (73.4976..=135.0841).contains(&lon)
}

fn offset_lat(x: f64, y: f64) -> f64 {
    use std::f64::consts::PI;
    let mut ret =
        -100.0 + 2.0 * x + 3.0 * y + 0.2 * y * y + 0.1 * x * y + 0.2 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (y * PI).sin() + 40.0 * (y / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (160.0 * (y / 12.0 * PI).sin() + 320.0 * (y * PI / 30.0).sin()) * 2.0 / 3.0;
    ret
}

fn offset_lon(x: f64, y: f64) -> f64 {
    use std::f64::consts::PI;
    let mut ret = 300.0 + x + 2.0 * y + 0.1 * x * x + 0.1 * x * y + 0.1 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (x * PI).sin() + 40.0 * (x / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (150.0 * (x / 12.0 * PI).sin() + 300.0 * (x / 30.0 * PI).sin()) * 2.0 / 3.0;
    ret
}

/// Forward transform: WGS84 -> GCJ-02. Identity outside the region.
pub fn wgs84_to_gcj02(lat: f64, lon: f64) -> (f64, f64) {
    use std::f64::consts::PI;

    if !in_transform_region(lat, lon) {
        return (lat, lon);
    }

    let d_lat = offset_lat(lon - 105.0, lat - 35.0);
    let d_lon = offset_lon(lon - 105.0, lat - 35.0);

    let rad_lat = lat.to_radians();
    let magic = 1.0 - KRASOVSKY_EE * rad_lat.sin().powi(2);
    let sqrt_magic = magic.sqrt();

    let d_lat = (d_lat * 180.0) / ((KRASOVSKY_A * (1.0 - KRASOVSKY_EE)) / (magic * sqrt_magic) * PI);
    let d_lon = (d_lon * 180.0) / (KRASOVSKY_A / sqrt_magic * rad_lat.cos() * PI);

    (lat + d_lat, lon + d_lon)
}

/// Inverse transform: GCJ-02 -> WGS84, iterative refinement.
pub fn gcj02_to_wgs84(lat: f64, lon: f64) -> (f64, f64) {
    if !in_transform_region(lat, lon) {
        return (lat, lon);
    }

    let mut wgs_lat = lat;
    let mut wgs_lon = lon;
    for _ in 0..INVERSE_MAX_ITERATIONS {
        let (f_lat, f_lon) = wgs84_to_gcj02(wgs_lat, wgs_lon);
        let (e_lat, e_lon) = (f_lat - lat, f_lon - lon);
        wgs_lat -= e_lat;
        wgs_lon -= e_lon;
        if e_lat.abs() < INVERSE_EPSILON_DEG && e_lon.abs() < INVERSE_EPSILON_DEG {
            break;
        }
    }

    (wgs_lat, wgs_lon)
}

/// Convert between two datums. Identity when they match.
pub fn convert(from: Datum, to: Datum, lat: f64, lon: f64) -> (f64, f64) {
    match (from, to) {
        (Datum::Wgs84, Datum::Gcj02) => wgs84_to_gcj02(lat, lon),
        (Datum::Gcj02, Datum::Wgs84) => gcj02_to_wgs84(lat, lon),
        _ => (lat, lon),
    }
}
