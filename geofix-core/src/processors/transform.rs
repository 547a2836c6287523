//! Coordinate transform stage
//!
//! Converts fix coordinates between geodetic datums (WGS84 <-> GCJ-02).
//! The transform applies only inside its declared region of validity;
//! outside it, and when source and target datums match, the fix passes
//! through unchanged. Converted fixes are stamped with the resulting
//! datum so reprocessing is the identity.

use tracing::debug;

use super::ProcessorStage;
use crate::constants::processors::PRIORITY_TRANSFORM;
use crate::errors::StageError;
use crate::fix::Fix;
use crate::geo::{convert, in_transform_region, Datum};

const DATUM_ATTR: &str = "coordinateSystem";

pub struct TransformStage {
    source: Datum,
    target: Datum,
}

impl TransformStage {
    pub fn new(source: Datum, target: Datum) -> Self {
        Self { source, target }
    }

    fn datum_name(datum: Datum) -> &'static str {
        match datum {
            Datum::Wgs84 => "WGS84",
            Datum::Gcj02 => "GCJ02",
        }
    }
}

impl ProcessorStage for TransformStage {
    fn process(&mut self, mut fix: Fix) -> Result<Fix, StageError> {
        if self.source == self.target {
            return Ok(fix);
        }

        // Already in the target datum: reprocessing is the identity
        if fix.attribute(DATUM_ATTR) == Some(Self::datum_name(self.target)) {
            return Ok(fix);
        }

        if !in_transform_region(fix.latitude, fix.longitude) {
            return Ok(fix);
        }

        let (lat, lon) = convert(self.source, self.target, fix.latitude, fix.longitude);
        debug!(
            from = Self::datum_name(self.source),
            to = Self::datum_name(self.target),
            "converted coordinates"
        );
        fix.latitude = lat;
        fix.longitude = lon;
        fix.set_attribute(DATUM_ATTR, Self::datum_name(self.target));

        Ok(fix)
    }

    fn name(&self) -> &'static str {
        "coordinate-transform"
    }

    fn priority(&self) -> i32 {
        PRIORITY_TRANSFORM
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::{FixBuilder, SourceKind};
    use crate::geo::haversine_m;

    fn fix_at(lat: f64, lon: f64) -> Fix {
        FixBuilder::new(SourceKind::Gnss, 1_000)
            .position(lat, lon)
            .accuracy(5.0)
            .build()
    }

    #[test]
    fn identity_when_datums_match() {
        let mut stage = TransformStage::new(Datum::Wgs84, Datum::Wgs84);
        let fix = fix_at(39.9042, 116.4074);
        let out = stage.process(fix.clone()).unwrap();
        assert_eq!(out, fix);
    }

    #[test]
    fn converts_inside_region() {
        let mut stage = TransformStage::new(Datum::Wgs84, Datum::Gcj02);
        let out = stage.process(fix_at(39.9042, 116.4074)).unwrap();

        let shift = haversine_m(39.9042, 116.4074, out.latitude, out.longitude);
        assert!(shift > 100.0, "expected a GCJ-02 offset, got {shift} m");
        assert_eq!(out.attribute("coordinateSystem"), Some("GCJ02"));
    }

    #[test]
    fn passes_through_outside_region() {
        let mut stage = TransformStage::new(Datum::Wgs84, Datum::Gcj02);
        let out = stage.process(fix_at(48.8566, 2.3522)).unwrap();
        assert_eq!(out.latitude, 48.8566);
        assert_eq!(out.longitude, 2.3522);
        assert_eq!(out.attribute("coordinateSystem"), None);
    }

    #[test]
    fn reprocessing_is_idempotent() {
        let mut stage = TransformStage::new(Datum::Wgs84, Datum::Gcj02);
        let once = stage.process(fix_at(39.9042, 116.4074)).unwrap();
        let twice = stage.process(once.clone()).unwrap();
        assert_eq!(once, twice);
    }
}
