//! Fix and CorrectedFix - the data model of the pipeline
//!
//! ## Overview
//!
//! A [`Fix`] is one raw position reading from one source. It is born at
//! collector emission, travels through the ingest queue and the processor
//! chain as a value, and is either dropped or folded into a
//! [`CorrectedFix`] by the fusion engine. Nothing mutates a fix after it
//! has been published; every stage works on its own copy.
//!
//! ## Status flow
//!
//! ```text
//! Valid ──accuracy filter──▶ LowAccuracy   (annotated, not suppressed)
//! Valid ──staleness filter─▶ Invalid       (dropped by the consumer)
//! Valid ──outlier/detector─▶ Anomaly       (recorded, never fused)
//! ```
//!
//! ## Attributes
//!
//! Sources attach free-form metadata (satellite count, signal strength,
//! BSSID, cell ids) as string key/value pairs. A `BTreeMap` keeps the
//! iteration order stable so serialized records are deterministic.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::confidence::Confidence;
use crate::time::Timestamp;

/// Kind of positioning provider that produced a fix.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Satellite navigation (GPS/BeiDou/Galileo/...)
    Gnss,
    /// Wireless AP triangulation
    Wifi,
    /// Cellular cell identification
    Cellular,
    /// Inertial dead-reckoning estimate
    Inertial,
    /// Output of the fusion engine
    Fused,
    /// Anything else
    Other,
}

impl SourceKind {
    /// Stable lowercase name, also the on-disk encoding.
    pub const fn name(&self) -> &'static str {
        match self {
            SourceKind::Gnss => "gnss",
            SourceKind::Wifi => "wifi",
            SourceKind::Cellular => "cellular",
            SourceKind::Inertial => "inertial",
            SourceKind::Fused => "fused",
            SourceKind::Other => "other",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "gnss" => Some(SourceKind::Gnss),
            "wifi" => Some(SourceKind::Wifi),
            "cellular" => Some(SourceKind::Cellular),
            "inertial" => Some(SourceKind::Inertial),
            "fused" => Some(SourceKind::Fused),
            "other" => Some(SourceKind::Other),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validation status carried by a fix.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum FixStatus {
    Valid,
    Invalid,
    LowAccuracy,
    Anomaly,
}

impl FixStatus {
    pub const fn name(&self) -> &'static str {
        match self {
            FixStatus::Valid => "valid",
            FixStatus::Invalid => "invalid",
            FixStatus::LowAccuracy => "low-accuracy",
            FixStatus::Anomaly => "anomaly",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "valid" => Some(FixStatus::Valid),
            "invalid" => Some(FixStatus::Invalid),
            "low-accuracy" => Some(FixStatus::LowAccuracy),
            "anomaly" => Some(FixStatus::Anomaly),
            _ => None,
        }
    }
}

/// One raw position reading from a single source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    /// Degrees, -90..90
    pub latitude: f64,
    /// Degrees, -180..180
    pub longitude: f64,
    /// Meters above the reference ellipsoid, when the source reports it
    pub altitude: Option<f64>,
    /// Horizontal accuracy radius in meters, > 0 for a usable fix
    pub accuracy: f64,
    /// Ground speed in m/s, when reported
    pub speed: Option<f64>,
    /// Bearing in degrees, 0..360, when reported
    pub bearing: Option<f64>,
    /// Capture time, ms since epoch, > 0
    pub time: Timestamp,
    /// Producing provider kind
    pub source: SourceKind,
    /// Provider instance id (e.g. "gnss0", a BSSID, a cell id)
    pub source_id: String,
    pub status: FixStatus,
    /// Free-form source metadata
    pub attributes: BTreeMap<String, String>,
}

impl Fix {
    /// A fix is valid iff its status says so and every mandatory field is
    /// inside its range.
    pub fn is_valid(&self) -> bool {
        self.status == FixStatus::Valid
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && self.accuracy > 0.0
            && self.time > 0
    }

    /// Coordinates are finite and inside their ranges, regardless of status.
    pub fn coordinates_in_range(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }
}

/// Builder for fixes; collectors and tests construct through this.
pub struct FixBuilder {
    fix: Fix,
}

impl FixBuilder {
    pub fn new(source: SourceKind, time: Timestamp) -> Self {
        Self {
            fix: Fix {
                latitude: 0.0,
                longitude: 0.0,
                altitude: None,
                accuracy: 0.0,
                speed: None,
                bearing: None,
                time,
                source,
                source_id: String::new(),
                status: FixStatus::Valid,
                attributes: BTreeMap::new(),
            },
        }
    }

    pub fn position(mut self, latitude: f64, longitude: f64) -> Self {
        self.fix.latitude = latitude;
        self.fix.longitude = longitude;
        self
    }

    pub fn accuracy(mut self, meters: f64) -> Self {
        self.fix.accuracy = meters;
        self
    }

    pub fn altitude(mut self, meters: f64) -> Self {
        self.fix.altitude = Some(meters);
        self
    }

    pub fn speed(mut self, mps: f64) -> Self {
        self.fix.speed = Some(mps);
        self
    }

    pub fn bearing(mut self, degrees: f64) -> Self {
        self.fix.bearing = Some(degrees);
        self
    }

    pub fn source_id(mut self, id: impl Into<String>) -> Self {
        self.fix.source_id = id.into();
        self
    }

    pub fn status(mut self, status: FixStatus) -> Self {
        self.fix.status = status;
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fix.attributes.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Fix {
        self.fix
    }
}

/// Pipeline output: one or more fixes folded into a best-estimate
/// position with provenance and confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectedFix {
    /// The fix that completed the correlation window
    pub original: Fix,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub accuracy: f64,
    /// Max of contributor capture times; never before `original.time`
    pub time: Timestamp,
    /// `Fused` whenever more than one source contributed
    pub source: SourceKind,
    /// Product of fusion quality and the anomaly-adjusted penalty
    pub confidence: Confidence,
    /// Human-readable strategy tag, e.g. `"weighted-average"` or
    /// `"adaptive/driving/priority"`
    pub method: String,
    /// Great-circle distance from the original fix (m)
    pub distance_from_original: f64,
    pub fused: bool,
    /// Distinct sources that contributed
    pub source_count: usize,
    /// Strategy-specific provenance (weights, coherence score, scene)
    pub details: BTreeMap<String, String>,
}

impl CorrectedFix {
    /// Flatten into a storable fix. Provenance rides in the attribute
    /// map so the textual store round-trips it.
    pub fn to_fix(&self) -> Fix {
        let mut attributes = self.details.clone();
        attributes.insert("confidence".into(), format!("{:.4}", self.confidence.as_float()));
        attributes.insert("method".into(), self.method.clone());
        attributes.insert("sourceCount".into(), self.source_count.to_string());
        Fix {
            latitude: self.latitude,
            longitude: self.longitude,
            altitude: self.altitude,
            accuracy: self.accuracy,
            speed: self.original.speed,
            bearing: self.original.bearing,
            time: self.time,
            source: self.source,
            source_id: String::from("corrector"),
            status: FixStatus::Valid,
            attributes,
        }
    }
}
