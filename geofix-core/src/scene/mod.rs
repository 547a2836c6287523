//! Scene inference: coarse motion/context labels from recent history
//!
//! The classifier is purely observational - it looks at the recent
//! accepted fixes and emits a [`Scene`] label. Policy lookup (which
//! fusion strategy, which weights) happens in the fusion engine.

mod classifier;

pub use classifier::{SceneClassifier, SceneThresholds};

use serde::{Deserialize, Serialize};

/// Coarse motion/context label.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Scene {
    Stationary,
    Walking,
    Running,
    Driving,
    Indoor,
    Outdoor,
    UrbanCanyon,
    Highway,
    Unknown,
}

impl Scene {
    pub const fn name(&self) -> &'static str {
        match self {
            Scene::Stationary => "stationary",
            Scene::Walking => "walking",
            Scene::Running => "running",
            Scene::Driving => "driving",
            Scene::Indoor => "indoor",
            Scene::Outdoor => "outdoor",
            Scene::UrbanCanyon => "urban-canyon",
            Scene::Highway => "highway",
            Scene::Unknown => "unknown",
        }
    }

    /// Scenes inferred from motion rather than signal environment.
    pub const fn is_motion(&self) -> bool {
        matches!(
            self,
            Scene::Stationary | Scene::Walking | Scene::Running | Scene::Driving | Scene::Highway
        )
    }
}

impl std::fmt::Display for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
