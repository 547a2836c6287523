//! Threaded pipeline service
//!
//! ## Threads
//!
//! - **Collectors** run their own producer threads and push raw fixes
//!   into the ingest queue (or the batch buffer) via their update
//!   handlers.
//! - **Consumer**: a single thread drains the queue through the
//!   [`CorrectionEngine`], persists results, and forwards notifications.
//! - **Dispatcher**: listener callbacks run here, outside every internal
//!   lock. A listener that blocks or panics delays later notifications
//!   but never the consumer loop.
//!
//! ## Lifecycle
//!
//! `Stopped -> Starting -> Running -> Stopping -> Stopped`. `start()`
//! blocks until the consumer is ready and fails synchronously on an
//! invalid configuration or a collector that will not start. `stop()`
//! closes the queue, joins the consumer and then the dispatcher - once
//! it returns, no further listener call happens.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use super::{
    BatchBuffer, CorrectionCache, CorrectionEngine, LocationListener, Outcome, PipelineState,
    PipelineStatus, Subscription,
};
use crate::config::{CorrectionConfig, CorrectionMode};
use crate::constants::queue::POP_WAIT_MS;
use crate::errors::PipelineError;
use crate::fix::{CorrectedFix, Fix, SourceKind};
use crate::queue::IngestQueue;
use crate::sources::{Collector, PipelineContext, UpdateHandler};
use crate::store::HistoryStore;
use crate::time::{SystemClock, TimeSource};

enum Notice {
    Location(CorrectedFix),
    Status(PipelineStatus),
}

struct StateCell {
    state: Mutex<PipelineState>,
    changed: Condvar,
}

type Subscribers = Arc<Mutex<Vec<Weak<dyn LocationListener>>>>;

pub struct Pipeline {
    config: CorrectionConfig,
    clock: Arc<dyn TimeSource>,
    store: Arc<dyn HistoryStore>,
    collectors: Vec<(SourceKind, Box<dyn Collector>)>,
    queue: Arc<IngestQueue>,
    subscribers: Subscribers,
    latest: Arc<Mutex<Option<CorrectedFix>>>,
    fatal: Arc<Mutex<Option<String>>>,
    state: Arc<StateCell>,
    mode: Arc<Mutex<CorrectionMode>>,
    cache: Option<Arc<CorrectionCache>>,
    batch: Option<Arc<BatchBuffer>>,
    notice_tx: Option<Sender<Notice>>,
    consumer: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Build a pipeline from an owning context. Fails fast on an
    /// invalid configuration.
    pub fn new(context: PipelineContext, clock: Arc<dyn TimeSource>) -> Result<Self, PipelineError> {
        let (config, store, collectors) = context.into_parts();
        config.validate()?;

        let cache = config
            .enable_caching
            .then(|| Arc::new(CorrectionCache::new(config.cache_size, config.cache_timeout_ms)));
        let batch = config
            .enable_batching
            .then(|| Arc::new(BatchBuffer::new(config.batch_size, config.batch_timeout_ms)));

        Ok(Self {
            queue: Arc::new(IngestQueue::new(config.queue_capacity)),
            mode: Arc::new(Mutex::new(config.mode)),
            config,
            clock,
            store,
            collectors,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            latest: Arc::new(Mutex::new(None)),
            fatal: Arc::new(Mutex::new(None)),
            state: Arc::new(StateCell {
                state: Mutex::new(PipelineState::Stopped),
                changed: Condvar::new(),
            }),
            cache,
            batch,
            notice_tx: None,
            consumer: None,
            dispatcher: None,
        })
    }

    /// Convenience constructor on the wall clock.
    pub fn with_system_clock(context: PipelineContext) -> Result<Self, PipelineError> {
        Self::new(context, Arc::new(SystemClock))
    }

    /// Start collectors, consumer and dispatcher. Blocks until the
    /// consumer loop is ready.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        {
            let mut state = self.state.state.lock().expect("pipeline state lock poisoned");
            if *state != PipelineState::Stopped {
                return Err(PipelineError::AlreadyRunning);
            }
            *state = PipelineState::Starting;
        }

        // Configuration faults are fatal before any thread spawns
        let engine = match CorrectionEngine::new(self.config.clone(), Arc::clone(&self.clock)) {
            Ok(engine) => engine,
            Err(error) => {
                let mut state = self.state.state.lock().expect("pipeline state lock poisoned");
                *state = PipelineState::Stopped;
                return Err(error.into());
            }
        };

        // A restarted pipeline needs a fresh queue
        if self.queue.is_closed() {
            self.queue = Arc::new(IngestQueue::new(self.config.queue_capacity));
        }
        self.fatal.lock().expect("pipeline fatal lock poisoned").take();

        let (tx, rx) = mpsc::channel();
        self.dispatcher = Some(spawn_dispatcher(rx, Arc::clone(&self.subscribers)));
        let _ = tx.send(Notice::Status(PipelineStatus::Starting));
        self.notice_tx = Some(tx.clone());

        let consumer = Consumer {
            engine,
            queue: Arc::clone(&self.queue),
            state: Arc::clone(&self.state),
            latest: Arc::clone(&self.latest),
            fatal: Arc::clone(&self.fatal),
            store: Arc::clone(&self.store),
            cache: self.cache.clone(),
            batch: self.batch.clone(),
            clock: Arc::clone(&self.clock),
            notices: tx,
            mode: Arc::clone(&self.mode),
            degraded: false,
            overflow_seen: 0,
        };
        self.consumer = Some(
            thread::Builder::new()
                .name("geofix-consumer".into())
                .spawn(move || consumer.run())
                .expect("spawn consumer thread"),
        );

        // Block until the consumer flips the state to Running
        {
            let mut state = self.state.state.lock().expect("pipeline state lock poisoned");
            while *state == PipelineState::Starting {
                state = self
                    .state
                    .changed
                    .wait(state)
                    .expect("pipeline state lock poisoned");
            }
        }

        if let Err(error) = self.wire_collectors() {
            warn!(%error, "collector failed to start, stopping pipeline");
            self.stop();
            return Err(error);
        }

        info!("pipeline started");
        Ok(())
    }

    fn wire_collectors(&mut self) -> Result<(), PipelineError> {
        for (kind, collector) in &mut self.collectors {
            if !self.config.source_enabled(*kind) {
                continue;
            }

            let queue = Arc::clone(&self.queue);
            let batch = self.batch.clone();
            let handler: UpdateHandler = Arc::new(move |fix: Fix| {
                match &batch {
                    Some(buffer) => {
                        if let Some(ready) = buffer.push(fix) {
                            for fix in ready {
                                queue.push(fix);
                            }
                        }
                    }
                    None => {
                        queue.push(fix);
                    }
                }
            });
            collector.on_update(handler);
            collector.start()?;
            info!(source = kind.name(), "collector wired");
        }
        Ok(())
    }

    /// Stop everything. Blocks until the consumer loop has exited and
    /// the dispatcher has drained; after this returns no listener is
    /// called again.
    pub fn stop(&mut self) {
        {
            let mut state = self.state.state.lock().expect("pipeline state lock poisoned");
            if *state == PipelineState::Stopped {
                return;
            }
            *state = PipelineState::Stopping;
        }
        if let Some(tx) = &self.notice_tx {
            let _ = tx.send(Notice::Status(PipelineStatus::Stopping));
        }

        for (_, collector) in &mut self.collectors {
            collector.stop();
        }

        self.queue.close();
        if let Some(consumer) = self.consumer.take() {
            let _ = consumer.join();
        }

        if let Some(tx) = &self.notice_tx {
            let _ = tx.send(Notice::Status(PipelineStatus::Stopped));
        }
        self.notice_tx = None; // closes the channel
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.join();
        }

        let mut state = self.state.state.lock().expect("pipeline state lock poisoned");
        *state = PipelineState::Stopped;
        self.state.changed.notify_all();
        info!("pipeline stopped");
    }

    /// Latest corrected fix, if any. Consults the cache first when
    /// caching is enabled.
    pub fn current(&self) -> Option<CorrectedFix> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.current(self.clock.now()) {
                return Some(hit);
            }
        }
        self.latest.lock().expect("pipeline latest lock poisoned").clone()
    }

    /// Register a listener; the subscription handle keeps it alive.
    pub fn subscribe<L: LocationListener + 'static>(&self, listener: L) -> Subscription {
        let listener: Arc<dyn LocationListener> = Arc::new(listener);
        self.subscribers
            .lock()
            .expect("pipeline subscribers lock poisoned")
            .push(Arc::downgrade(&listener));
        Subscription::new(listener)
    }

    /// Producer-side handle for pushing fixes without a collector.
    pub fn ingest_handle(&self) -> Arc<IngestQueue> {
        Arc::clone(&self.queue)
    }

    pub fn state(&self) -> PipelineState {
        *self.state.state.lock().expect("pipeline state lock poisoned")
    }

    /// Swap the correction mode at runtime. Mode only throttles the
    /// emission debounce (and, for `Offline`, persistence); the scene
    /// keeps driving strategy and weights.
    pub fn set_mode(&self, mode: CorrectionMode) {
        *self.mode.lock().expect("pipeline mode lock poisoned") = mode;
    }

    pub fn mode(&self) -> CorrectionMode {
        *self.mode.lock().expect("pipeline mode lock poisoned")
    }

    /// Reason the consumer loop terminated, if it hit a fatal fault.
    pub fn fatal_status(&self) -> Option<String> {
        self.fatal.lock().expect("pipeline fatal lock poisoned").clone()
    }

    pub fn config(&self) -> &CorrectionConfig {
        &self.config
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Consumer {
    engine: CorrectionEngine,
    queue: Arc<IngestQueue>,
    state: Arc<StateCell>,
    latest: Arc<Mutex<Option<CorrectedFix>>>,
    fatal: Arc<Mutex<Option<String>>>,
    store: Arc<dyn HistoryStore>,
    cache: Option<Arc<CorrectionCache>>,
    batch: Option<Arc<BatchBuffer>>,
    clock: Arc<dyn TimeSource>,
    notices: Sender<Notice>,
    mode: Arc<Mutex<CorrectionMode>>,
    degraded: bool,
    overflow_seen: u64,
}

impl Consumer {
    fn run(mut self) {
        {
            let mut state = self.state.state.lock().expect("pipeline state lock poisoned");
            *state = PipelineState::Running;
            self.state.changed.notify_all();
        }
        let _ = self.notices.send(Notice::Status(PipelineStatus::Running));

        loop {
            if self.queue.is_closed() {
                break;
            }

            // Time-based flush of a partial batch
            if let Some(buffer) = &self.batch {
                if let Some(ready) = buffer.flush_if_stale() {
                    for fix in ready {
                        self.queue.push(fix);
                    }
                }
            }
            self.report_overflow();

            let Some(fix) = self.queue.pop_timeout(Duration::from_millis(POP_WAIT_MS)) else {
                continue;
            };

            let mode = *self.mode.lock().expect("pipeline mode lock poisoned");
            self.engine.set_mode(mode);

            match self.engine.ingest(fix) {
                Outcome::Dropped(_) | Outcome::Pending => {}
                Outcome::Anomaly(anomaly) => self.persist(&anomaly),
                Outcome::Emitted(corrected) => self.publish(corrected),
                Outcome::Fatal(reason) => {
                    *self.fatal.lock().expect("pipeline fatal lock poisoned") = Some(reason);
                    let _ = self.notices.send(Notice::Status(PipelineStatus::Fatal));
                    break;
                }
            }
        }
    }

    fn publish(&mut self, corrected: CorrectedFix) {
        *self.latest.lock().expect("pipeline latest lock poisoned") = Some(corrected.clone());
        if let Some(cache) = &self.cache {
            let now = self.clock.now();
            cache.insert(&corrected, now);
            cache.sweep(now);
        }
        self.persist(&corrected.to_fix());
        let _ = self.notices.send(Notice::Location(corrected));
    }

    fn persist(&mut self, fix: &Fix) {
        let mode = *self.mode.lock().expect("pipeline mode lock poisoned");
        if !mode.persists() {
            return;
        }
        match self.store.save(fix) {
            Ok(()) => {
                if self.degraded {
                    info!("history store recovered");
                    self.degraded = false;
                }
            }
            Err(error) => {
                if !self.degraded {
                    warn!(%error, "history store failing, continuing without persistence");
                    self.degraded = true;
                    let _ = self.notices.send(Notice::Status(PipelineStatus::StoreDegraded));
                }
            }
        }
    }

    fn report_overflow(&mut self) {
        let dropped = self.queue.stats().dropped.load(Ordering::Relaxed);
        if dropped > self.overflow_seen {
            self.overflow_seen = dropped;
            let _ = self
                .notices
                .send(Notice::Status(PipelineStatus::QueueOverflow { dropped }));
        }
    }
}

fn spawn_dispatcher(rx: Receiver<Notice>, subscribers: Subscribers) -> JoinHandle<()> {
    thread::Builder::new()
        .name("geofix-dispatcher".into())
        .spawn(move || {
            for notice in rx {
                let listeners: Vec<Arc<dyn LocationListener>> = {
                    let mut subs = subscribers.lock().expect("subscribers lock poisoned");
                    subs.retain(|weak| weak.strong_count() > 0);
                    subs.iter().filter_map(Weak::upgrade).collect()
                };

                for listener in listeners {
                    let delivered = catch_unwind(AssertUnwindSafe(|| match &notice {
                        Notice::Location(fix) => listener.on_location_changed(fix),
                        Notice::Status(status) => listener.on_status_changed(status.clone()),
                    }));
                    if delivered.is_err() {
                        warn!("listener panicked during notification");
                    }
                }
            }
        })
        .expect("spawn dispatcher thread")
}
