//! Footprint-coherence fusion
//!
//! Every fix is treated as an uncertainty disc centred on its coordinate
//! with radius `min(2 x accuracy, max_radius)`. Pairwise coherence is
//! the Jaccard index of the two discs - intersection area over union
//! area - so identical discs score 1.0 and disjoint discs 0.0.
//!
//! A greedy scan picks the largest, best-scoring subset whose members
//! all cohere with a seed fix at or above the threshold; the subset is
//! then fused by accuracy-weighted average. When no subset of the
//! required size exists, all fixes participate.

use super::{FuseStrategy, FusionOutcome, WeightedFusion};
use crate::constants::fusion::{
    COHERENCE_THRESHOLD, MAX_FOOTPRINT_RADIUS_M, MIN_REQUIRED_SOURCES,
};
use crate::errors::FusionError;
use crate::fix::Fix;
use crate::geo::haversine_m;

pub struct FootprintFusion {
    coherence_threshold: f64,
    max_radius_m: f64,
    min_required: usize,
    inner: WeightedFusion,
}

impl FootprintFusion {
    pub fn new(coherence_threshold: f64, max_radius_m: f64, min_required: usize) -> Self {
        Self {
            coherence_threshold: coherence_threshold.clamp(0.0, 1.0),
            max_radius_m: max_radius_m.max(f64::MIN_POSITIVE),
            min_required: min_required.max(1),
            inner: WeightedFusion::inverse_accuracy(),
        }
    }

    fn radius(&self, fix: &Fix) -> f64 {
        (2.0 * fix.accuracy).min(self.max_radius_m)
    }

    /// Jaccard index of two discs at centre distance `d`.
    fn disc_overlap(d: f64, r1: f64, r2: f64) -> f64 {
        use std::f64::consts::PI;

        if d >= r1 + r2 {
            return 0.0;
        }

        let (small, large) = if r1 < r2 { (r1, r2) } else { (r2, r1) };
        if d + small <= large {
            // One disc contains the other: intersection is the small disc
            return (small * small) / (large * large);
        }

        // Circular-lens intersection area
        let a = (r1 * r1 - r2 * r2 + d * d) / (2.0 * d);
        let h = (r1 * r1 - a * a).max(0.0).sqrt();
        let lens = r1 * r1 * (a / r1).clamp(-1.0, 1.0).acos() - a * h
            + r2 * r2 * ((d - a) / r2).clamp(-1.0, 1.0).acos() - (d - a) * h;

        let union = PI * (r1 * r1 + r2 * r2) - lens;
        (lens / union).clamp(0.0, 1.0)
    }

    fn coherence_matrix(&self, fixes: &[Fix]) -> Vec<Vec<f64>> {
        let n = fixes.len();
        let mut matrix = vec![vec![0.0; n]; n];
        for i in 0..n {
            matrix[i][i] = 1.0;
            for j in (i + 1)..n {
                let d = haversine_m(
                    fixes[i].latitude,
                    fixes[i].longitude,
                    fixes[j].latitude,
                    fixes[j].longitude,
                );
                let overlap = Self::disc_overlap(d, self.radius(&fixes[i]), self.radius(&fixes[j]));
                matrix[i][j] = overlap;
                matrix[j][i] = overlap;
            }
        }
        matrix
    }

    /// Greedy best coherent subset: for each seed, gather every fix that
    /// coheres with it, score the set by mean pairwise coherence, keep
    /// the best set meeting the size floor.
    fn select_subset(&self, fixes: &[Fix], matrix: &[Vec<f64>]) -> (Vec<usize>, f64) {
        let n = fixes.len();
        let mut best: Vec<usize> = Vec::new();
        let mut best_score = 0.0;

        for seed in 0..n {
            let mut set = vec![seed];
            for other in 0..n {
                if other != seed && matrix[seed][other] >= self.coherence_threshold {
                    set.push(other);
                }
            }
            if set.len() < self.min_required {
                continue;
            }

            let mut total = 0.0;
            let mut pairs = 0usize;
            for a in 0..set.len() {
                for b in (a + 1)..set.len() {
                    total += matrix[set[a]][set[b]];
                    pairs += 1;
                }
            }
            let score = if pairs > 0 { total / pairs as f64 } else { 0.0 };

            if set.len() > best.len() || (set.len() == best.len() && score > best_score) {
                best = set;
                best_score = score;
            }
        }

        if best.is_empty() {
            // Fallback: no coherent subset of the required size
            ((0..n).collect(), 0.0)
        } else {
            (best, best_score)
        }
    }
}

impl Default for FootprintFusion {
    fn default() -> Self {
        Self::new(COHERENCE_THRESHOLD, MAX_FOOTPRINT_RADIUS_M, MIN_REQUIRED_SOURCES)
    }
}

impl FuseStrategy for FootprintFusion {
    fn name(&self) -> &'static str {
        "footprint-coherence"
    }

    fn fuse(&self, fixes: &[Fix]) -> Result<FusionOutcome, FusionError> {
        if fixes.is_empty() {
            return Err(FusionError::NoValidFixes);
        }

        let matrix = self.coherence_matrix(fixes);
        let (selected, score) = self.select_subset(fixes, &matrix);
        let subset: Vec<Fix> = selected.iter().map(|&i| fixes[i].clone()).collect();

        let mut outcome = self.inner.fuse(&subset)?;
        outcome.method = self.name().into();
        outcome.confidence = outcome.confidence * score.clamp(0.0, 1.0) as f32;
        outcome
            .details
            .insert("coherenceScore".into(), format!("{score:.3}"));
        outcome
            .details
            .insert("selectedSourceCount".into(), subset.len().to_string());
        outcome
            .details
            .insert("totalSourceCount".into(), fixes.len().to_string());
        // Keep output time covering all candidates, selected or not
        outcome.time = super::max_time(fixes);
        outcome.source_count = subset.len();

        Ok(outcome)
    }
}
