//! Processor chain: ordered, stateful sanitisation stages
//!
//! ## Overview
//!
//! Each raw fix runs through an ordered chain of stages before anomaly
//! detection. A stage is a pure function of `(fix, stage state)`; it may
//! annotate the fix (set `LowAccuracy`, mark it `Invalid`, flag an
//! outlier) but never decides on its own to suppress it - the consumer
//! loop does, uniformly, from the returned status.
//!
//! Stage order is significant and encoded as ascending priorities:
//! accuracy -> staleness -> outlier -> transform. The chain is
//! idempotent: running an already-processed fix through again yields the
//! same fix (stages either recompute the same annotation or skip work
//! they have marked as done).
//!
//! ## Failure semantics
//!
//! A stage returning `Err` drops that fix only: the chain increments the
//! stage's failure counter, logs, and the loop continues with the next
//! fix. `StageError::StateInvariant` is the one unrecoverable case and
//! terminates the consumer loop.

mod accuracy;
mod outlier;
mod staleness;
mod transform;

pub use accuracy::AccuracyFilter;
pub use outlier::OutlierStage;
pub use staleness::StalenessFilter;
pub use transform::TransformStage;

use tracing::warn;

use crate::errors::StageError;
use crate::fix::Fix;

/// One stage of the processor chain.
pub trait ProcessorStage: Send {
    /// Process a fix, returning the (possibly annotated) fix.
    fn process(&mut self, fix: Fix) -> Result<Fix, StageError>;

    /// Stage name for logs and counters.
    fn name(&self) -> &'static str;

    /// Disabled stages are skipped by the chain.
    fn enabled(&self) -> bool {
        true
    }

    /// Stages run in ascending priority order.
    fn priority(&self) -> i32 {
        0
    }

    /// Clear accumulated state.
    fn reset(&mut self) {}
}

/// A fault attributed to a specific stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageFault {
    pub stage: &'static str,
    pub error: StageError,
}

/// Ordered chain of processor stages with per-stage failure counters.
pub struct ProcessorChain {
    stages: Vec<Box<dyn ProcessorStage>>,
    failures: Vec<u64>,
}

impl ProcessorChain {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Add a stage, keeping the chain sorted by ascending priority.
    pub fn add_stage(&mut self, stage: Box<dyn ProcessorStage>) {
        self.stages.push(stage);
        self.stages.sort_by_key(|s| s.priority());
        self.failures = vec![0; self.stages.len()];
    }

    /// Builder-style variant of [`Self::add_stage`].
    pub fn with_stage(mut self, stage: Box<dyn ProcessorStage>) -> Self {
        self.add_stage(stage);
        self
    }

    /// Run every enabled stage over the fix in priority order.
    pub fn process(&mut self, fix: Fix) -> Result<Fix, StageFault> {
        let mut current = fix;
        for (idx, stage) in self.stages.iter_mut().enumerate() {
            if !stage.enabled() {
                continue;
            }
            match stage.process(current) {
                Ok(next) => current = next,
                Err(error) => {
                    self.failures[idx] += 1;
                    warn!(stage = stage.name(), %error, "stage fault, dropping fix");
                    return Err(StageFault {
                        stage: stage.name(),
                        error,
                    });
                }
            }
        }
        Ok(current)
    }

    /// Per-stage failure counts, in chain order.
    pub fn failure_counts(&self) -> Vec<(&'static str, u64)> {
        self.stages
            .iter()
            .zip(&self.failures)
            .map(|(stage, &count)| (stage.name(), count))
            .collect()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
        self.failures.iter_mut().for_each(|c| *c = 0);
    }
}

impl Default for ProcessorChain {
    fn default() -> Self {
        Self::new()
    }
}
