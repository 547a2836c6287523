//! Weighted-average fusion
//!
//! Coordinates are the weight-normalised sum of contributor coordinates;
//! weights are equal, inversely proportional to accuracy, or supplied
//! per source. Combined accuracy is the harmonic mean `1 / sum(w_i/a_i)`
//! (a tight contributor should tighten the estimate, which an arithmetic
//! mean would not do); on a degenerate zero total weight everything
//! falls back to the plain arithmetic mean.
//!
//! Reported quality reflects contributor agreement: the RMS spread of
//! contributors around the fused point, normalised by the combined
//! accuracy - tightly-agreeing sources fuse confidently, scattered ones
//! do not.

use std::collections::BTreeMap;

use super::{max_time, mean_altitude, FuseStrategy, FusionOutcome};
use crate::confidence::Confidence;
use crate::errors::FusionError;
use crate::fix::{Fix, SourceKind};
use crate::geo::haversine_m;

enum Weighting {
    Equal,
    InverseAccuracy,
    Custom(BTreeMap<SourceKind, f64>),
}

pub struct WeightedFusion {
    weighting: Weighting,
}

impl WeightedFusion {
    pub fn equal() -> Self {
        Self {
            weighting: Weighting::Equal,
        }
    }

    pub fn inverse_accuracy() -> Self {
        Self {
            weighting: Weighting::InverseAccuracy,
        }
    }

    pub fn custom(weights: BTreeMap<SourceKind, f64>) -> Self {
        Self {
            weighting: Weighting::Custom(weights),
        }
    }

    /// Normalised weights, one per fix. `None` when the total weight is
    /// degenerate and the caller should fall back to equal weights.
    fn weights(&self, fixes: &[Fix]) -> Option<Vec<f64>> {
        let raw: Vec<f64> = match &self.weighting {
            Weighting::Equal => vec![1.0; fixes.len()],
            Weighting::InverseAccuracy => fixes
                .iter()
                .map(|f| if f.accuracy > 0.0 { 1.0 / f.accuracy } else { 1.0 })
                .collect(),
            Weighting::Custom(weights) => fixes
                .iter()
                .map(|f| weights.get(&f.source).copied().unwrap_or(1.0).max(0.0))
                .collect(),
        };

        let total: f64 = raw.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return None;
        }
        Some(raw.into_iter().map(|w| w / total).collect())
    }
}

impl Default for WeightedFusion {
    fn default() -> Self {
        Self::inverse_accuracy()
    }
}

impl FuseStrategy for WeightedFusion {
    fn name(&self) -> &'static str {
        "weighted-average"
    }

    fn fuse(&self, fixes: &[Fix]) -> Result<FusionOutcome, FusionError> {
        if fixes.is_empty() {
            return Err(FusionError::NoValidFixes);
        }

        let n = fixes.len() as f64;
        let (weights, degenerate) = match self.weights(fixes) {
            Some(w) => (w, false),
            None => (vec![1.0 / n; fixes.len()], true),
        };

        let latitude: f64 = fixes.iter().zip(&weights).map(|(f, w)| f.latitude * w).sum();
        let longitude: f64 = fixes.iter().zip(&weights).map(|(f, w)| f.longitude * w).sum();

        // Harmonic-mean accuracy; arithmetic mean when degenerate
        let inverse_accuracy: f64 = fixes
            .iter()
            .zip(&weights)
            .filter(|(f, _)| f.accuracy > 0.0)
            .map(|(f, w)| w / f.accuracy)
            .sum();
        let accuracy = if degenerate || inverse_accuracy <= 0.0 {
            fixes.iter().map(|f| f.accuracy).sum::<f64>() / n
        } else {
            1.0 / inverse_accuracy
        };

        // Agreement quality: RMS contributor spread vs combined accuracy
        let rms_spread = (fixes
            .iter()
            .map(|f| haversine_m(f.latitude, f.longitude, latitude, longitude).powi(2))
            .sum::<f64>()
            / n)
            .sqrt();
        let agreement = 1.0 / (1.0 + rms_spread / accuracy.max(1.0));
        let confidence = Confidence::from_float(agreement as f32);

        let mut details = BTreeMap::new();
        details.insert("weights".into(), format_weights(fixes, &weights));
        if degenerate {
            details.insert("degenerateWeights".into(), "true".into());
        }

        Ok(FusionOutcome {
            latitude,
            longitude,
            altitude: mean_altitude(fixes),
            accuracy,
            time: max_time(fixes),
            confidence,
            method: self.name().into(),
            source_count: fixes.len(),
            details,
        })
    }
}

fn format_weights(fixes: &[Fix], weights: &[f64]) -> String {
    let parts: Vec<String> = fixes
        .iter()
        .zip(weights)
        .map(|(f, w)| format!("{}:{:.3}", f.source.name(), w))
        .collect();
    format!("[{}]", parts.join(", "))
}
