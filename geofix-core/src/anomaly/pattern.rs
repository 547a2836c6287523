//! Pattern-matching detector
//!
//! Compares each fix against a list of named bad-data signatures.
//! A pattern is a conjunction of optional predicates - source kind,
//! accuracy range, status, bounding region, attribute equalities - and
//! similarity is the weighted sum of the predicates that match:
//! region 0.3, source 0.2, accuracy 0.2, status 0.1, each attribute
//! 0.05. A fix whose similarity reaches the threshold is an anomaly with
//! confidence equal to the similarity. Strict patterns short-circuit the
//! scan on first match.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{AnomalyDetector, Verdict};
use crate::constants::anomaly::PATTERN_THRESHOLD;
use crate::fix::{Fix, FixStatus, SourceKind};

/// Rectangular lat/lon region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Region {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat)
            && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

/// A named bad-data signature. Deployments declare these in the
/// configuration; the pipeline loads them into the detector at build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FixPattern {
    pub name: String,
    pub source: Option<SourceKind>,
    /// Inclusive accuracy band (min, max)
    pub accuracy: Option<(f64, f64)>,
    pub status: Option<FixStatus>,
    pub region: Option<Region>,
    pub attributes: BTreeMap<String, String>,
    /// Strict patterns stop the scan on first match
    pub strict: bool,
}

impl Default for FixPattern {
    fn default() -> Self {
        Self::new("")
    }
}

impl FixPattern {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            accuracy: None,
            status: None,
            region: None,
            attributes: BTreeMap::new(),
            strict: false,
        }
    }

    pub fn source(mut self, source: SourceKind) -> Self {
        self.source = Some(source);
        self
    }

    pub fn accuracy_range(mut self, min: f64, max: f64) -> Self {
        self.accuracy = Some((min.min(max), min.max(max)));
        self
    }

    pub fn status(mut self, status: FixStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Weighted similarity in [0, 1].
    fn similarity(&self, fix: &Fix) -> f64 {
        let mut similarity: f64 = 0.0;

        if let Some(region) = &self.region {
            if region.contains(fix.latitude, fix.longitude) {
                similarity += 0.3;
            }
        }
        if let Some(source) = self.source {
            if fix.source == source {
                similarity += 0.2;
            }
        }
        if let Some((min, max)) = self.accuracy {
            if (min..=max).contains(&fix.accuracy) {
                similarity += 0.2;
            }
        }
        if let Some(status) = self.status {
            if fix.status == status {
                similarity += 0.1;
            }
        }
        for (key, value) in &self.attributes {
            if fix.attribute(key) == Some(value.as_str()) {
                similarity += 0.05;
            }
        }

        similarity.min(1.0)
    }
}

pub struct PatternDetector {
    patterns: Vec<FixPattern>,
    threshold: f64,
}

impl PatternDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            patterns: Vec::new(),
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn with_pattern(mut self, pattern: FixPattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn add_pattern(&mut self, pattern: FixPattern) {
        self.patterns.push(pattern);
    }

    pub fn remove_pattern(&mut self, name: &str) -> bool {
        let before = self.patterns.len();
        self.patterns.retain(|p| p.name != name);
        self.patterns.len() != before
    }
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new(PATTERN_THRESHOLD)
    }
}

impl AnomalyDetector for PatternDetector {
    fn detect(&self, fix: &Fix, _context: &[Fix]) -> Verdict {
        let mut best: Option<(&FixPattern, f64)> = None;

        for pattern in &self.patterns {
            let similarity = pattern.similarity(fix);
            if similarity < self.threshold {
                continue;
            }
            if best.map_or(true, |(_, s)| similarity > s) {
                best = Some((pattern, similarity));
            }
            if pattern.strict {
                best = Some((pattern, similarity));
                break;
            }
        }

        match best {
            Some((pattern, similarity)) => Verdict::anomaly(similarity)
                .with_info("type", "pattern-match")
                .with_info("patternName", pattern.name.clone())
                .with_info("similarity", format!("{similarity:.3}")),
            None => Verdict::normal(),
        }
    }

    fn name(&self) -> &'static str {
        "pattern-match"
    }
}
