//! Priority-based fusion
//!
//! Picks the fix whose source has the highest configured priority;
//! ties break on smaller accuracy, then on more recent capture time.
//! Confidence is the selected priority normalised by the highest
//! configured priority.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::{mean_altitude, max_time, FuseStrategy, FusionOutcome};
use crate::confidence::Confidence;
use crate::constants::fusion::{
    PRIORITY_CELLULAR, PRIORITY_GNSS, PRIORITY_INERTIAL, PRIORITY_WIFI,
};
use crate::errors::FusionError;
use crate::fix::{Fix, SourceKind};

pub struct PriorityFusion {
    priorities: BTreeMap<SourceKind, i32>,
    max_priority: i32,
}

impl PriorityFusion {
    pub fn new(priorities: BTreeMap<SourceKind, i32>) -> Self {
        let max_priority = priorities.values().copied().max().unwrap_or(1).max(1);
        Self {
            priorities,
            max_priority,
        }
    }

    pub fn priority_of(&self, source: SourceKind) -> i32 {
        self.priorities.get(&source).copied().unwrap_or(0)
    }
}

impl Default for PriorityFusion {
    fn default() -> Self {
        Self::new(BTreeMap::from([
            (SourceKind::Gnss, PRIORITY_GNSS),
            (SourceKind::Wifi, PRIORITY_WIFI),
            (SourceKind::Cellular, PRIORITY_CELLULAR),
            (SourceKind::Inertial, PRIORITY_INERTIAL),
        ]))
    }
}

impl FuseStrategy for PriorityFusion {
    fn name(&self) -> &'static str {
        "priority"
    }

    fn fuse(&self, fixes: &[Fix]) -> Result<FusionOutcome, FusionError> {
        let selected = fixes
            .iter()
            .max_by(|a, b| {
                let by_priority = self.priority_of(a.source).cmp(&self.priority_of(b.source));
                if by_priority != Ordering::Equal {
                    return by_priority;
                }
                // Smaller accuracy wins, then the newer fix
                match b.accuracy.partial_cmp(&a.accuracy).unwrap_or(Ordering::Equal) {
                    Ordering::Equal => a.time.cmp(&b.time),
                    other => other,
                }
            })
            .ok_or(FusionError::NoValidFixes)?;

        let priority = self.priority_of(selected.source);
        let confidence = Confidence::from_float(
            (priority.max(0) as f32 / self.max_priority as f32).min(1.0),
        );

        let mut details = BTreeMap::new();
        details.insert("selectedSource".into(), selected.source.name().into());
        details.insert("selectedPriority".into(), priority.to_string());

        Ok(FusionOutcome {
            latitude: selected.latitude,
            longitude: selected.longitude,
            altitude: selected.altitude.or_else(|| mean_altitude(fixes)),
            accuracy: selected.accuracy,
            time: max_time(fixes),
            confidence,
            method: self.name().into(),
            source_count: fixes.len(),
            details,
        })
    }
}
