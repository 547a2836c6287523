//! Collector contract and the owning pipeline context
//!
//! ## Collector contract
//!
//! A [`Collector`] wraps one positioning provider: it starts and stops
//! on demand, exposes its most recent fix, and pushes every new fix
//! into a registered update handler. The pipeline wires that handler to
//! the ingest queue when it starts. Actual hardware drivers live
//! outside this crate; [`ReplayCollector`] is the reference
//! implementation, replaying a recorded track on its own thread.
//!
//! ## Context instead of singletons
//!
//! There is no process-wide registry. A [`PipelineContext`] owns the
//! registered collectors, the history store and the configuration, and
//! is handed to the pipeline at construction.

mod replay;

pub use replay::ReplayCollector;

use std::sync::Arc;

use crate::config::CorrectionConfig;
use crate::errors::SourceError;
use crate::fix::{Fix, SourceKind};
use crate::store::HistoryStore;

/// Callback invoked by a collector for every new fix.
pub type UpdateHandler = Arc<dyn Fn(Fix) + Send + Sync>;

/// One positioning provider.
pub trait Collector: Send {
    fn start(&mut self) -> Result<(), SourceError>;

    fn stop(&mut self);

    /// Most recent fix this collector produced.
    fn latest(&self) -> Option<Fix>;

    /// Register the sink for new fixes. Must be called before `start`.
    fn on_update(&mut self, handler: UpdateHandler);
}

/// Owning aggregate handed to the pipeline: collectors, store, config.
pub struct PipelineContext {
    config: CorrectionConfig,
    store: Arc<dyn HistoryStore>,
    collectors: Vec<(SourceKind, Box<dyn Collector>)>,
}

impl PipelineContext {
    pub fn new(config: CorrectionConfig, store: Arc<dyn HistoryStore>) -> Self {
        Self {
            config,
            store,
            collectors: Vec::new(),
        }
    }

    /// Register a producer for a source kind.
    pub fn register(&mut self, kind: SourceKind, collector: Box<dyn Collector>) {
        self.collectors.push((kind, collector));
    }

    /// Builder-style variant of [`Self::register`].
    pub fn with_collector(mut self, kind: SourceKind, collector: Box<dyn Collector>) -> Self {
        self.register(kind, collector);
        self
    }

    /// Whether configuration wires collectors of this kind.
    pub fn source_enabled(&self, kind: SourceKind) -> bool {
        self.config.source_enabled(kind)
    }

    pub fn config(&self) -> &CorrectionConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn HistoryStore> {
        Arc::clone(&self.store)
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        CorrectionConfig,
        Arc<dyn HistoryStore>,
        Vec<(SourceKind, Box<dyn Collector>)>,
    ) {
        (self.config, self.store, self.collectors)
    }
}
