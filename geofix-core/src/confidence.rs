//! Confidence scoring for corrections
//!
//! A [`Confidence`] quantifies how much the pipeline trusts a corrected
//! fix. Scores live in `[0, 1]` and are stored as a 16-bit fixed-point
//! mantissa: comparisons and combination stay exact and `Ord`-able, and
//! the score costs two bytes wherever it is embedded.
//!
//! The emitted confidence is the product of the fusion strategy's
//! self-reported quality and an anomaly-adjusted penalty applied by the
//! engine.

use core::ops::Mul;

use serde::{Deserialize, Serialize};

/// Confidence score in `[0, 1]`, fixed-point `u16` (0 -> 0.0, 65535 -> 1.0).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Confidence {
    value: u16,
}

impl Confidence {
    /// No confidence.
    pub const ZERO: Self = Self { value: 0 };

    /// Full confidence.
    pub const FULL: Self = Self { value: u16::MAX };

    /// Moderate confidence (50%).
    pub const MODERATE: Self = Self { value: 0x8000 };

    /// Clamp a float into the unit interval and quantize.
    pub fn from_float(confidence: f32) -> Self {
        let clamped = confidence.clamp(0.0, 1.0);
        Self {
            value: (clamped * u16::MAX as f32) as u16,
        }
    }

    pub fn as_float(&self) -> f32 {
        self.value as f32 / u16::MAX as f32
    }

    /// Raw fixed-point mantissa.
    pub fn value(&self) -> u16 {
        self.value
    }

    /// Combine several scores into one.
    ///
    /// Arithmetic mean with a 61/64 haircut: the mean overestimates the
    /// geometric mean (the proper combinator for independent quality
    /// factors), and the haircut compensates for typical score variance.
    pub fn combine(scores: &[Self]) -> Self {
        if scores.is_empty() {
            return Self::ZERO;
        }

        let sum: u32 = scores.iter().map(|s| s.value as u32).sum();
        let mean = sum / scores.len() as u32;
        Self {
            value: ((mean * 61) / 64) as u16,
        }
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self::MODERATE
    }
}

impl Mul<f32> for Confidence {
    type Output = Self;

    fn mul(self, factor: f32) -> Self {
        Self::from_float(self.as_float() * factor)
    }
}
