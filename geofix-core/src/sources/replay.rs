//! Replay collector: feeds a recorded track at a fixed cadence
//!
//! Reference [`Collector`] implementation for tests, simulations and
//! reprocessing of stored tracks. Runs its own producer thread, emits
//! one fix per interval, and stops either at the end of the track or
//! when asked.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use super::{Collector, UpdateHandler};
use crate::errors::SourceError;
use crate::fix::Fix;

pub struct ReplayCollector {
    track: Vec<Fix>,
    interval: Duration,
    handler: Option<UpdateHandler>,
    latest: Arc<Mutex<Option<Fix>>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ReplayCollector {
    pub fn new(track: Vec<Fix>, interval: Duration) -> Self {
        Self {
            track,
            interval,
            handler: None,
            latest: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Emit the whole track back-to-back (for tests).
    pub fn immediate(track: Vec<Fix>) -> Self {
        Self::new(track, Duration::from_millis(0))
    }
}

impl Collector for ReplayCollector {
    fn start(&mut self) -> Result<(), SourceError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SourceError::AlreadyRunning);
        }
        let Some(handler) = self.handler.clone() else {
            self.running.store(false, Ordering::SeqCst);
            return Err(SourceError::StartFailed {
                reason: "no update handler registered",
            });
        };

        let track = self.track.clone();
        let interval = self.interval;
        let latest = Arc::clone(&self.latest);
        let running = Arc::clone(&self.running);

        self.worker = Some(thread::spawn(move || {
            for fix in track {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                *latest.lock().expect("replay latest lock poisoned") = Some(fix.clone());
                handler(fix);
                if !interval.is_zero() {
                    thread::sleep(interval);
                }
            }
            running.store(false, Ordering::SeqCst);
            debug!("replay track exhausted");
        }));

        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    fn latest(&self) -> Option<Fix> {
        self.latest.lock().expect("replay latest lock poisoned").clone()
    }

    fn on_update(&mut self, handler: UpdateHandler) {
        self.handler = Some(handler);
    }
}

impl Drop for ReplayCollector {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::{FixBuilder, SourceKind};

    fn track(count: usize) -> Vec<Fix> {
        (0..count)
            .map(|i| {
                FixBuilder::new(SourceKind::Gnss, 1_000 + i as u64)
                    .position(39.9, 116.4)
                    .accuracy(5.0)
                    .build()
            })
            .collect()
    }

    #[test]
    fn replays_whole_track_to_handler() {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&collected);

        let mut collector = ReplayCollector::immediate(track(5));
        collector.on_update(Arc::new(move |fix| {
            sink.lock().unwrap().push(fix);
        }));
        collector.start().unwrap();
        collector.stop();

        let fixes = collected.lock().unwrap();
        assert_eq!(fixes.len(), 5);
        assert_eq!(fixes[0].time, 1_000);
        assert_eq!(fixes[4].time, 1_004);
    }

    #[test]
    fn start_without_handler_fails() {
        let mut collector = ReplayCollector::immediate(track(1));
        assert!(matches!(
            collector.start(),
            Err(SourceError::StartFailed { .. })
        ));
    }

    #[test]
    fn latest_tracks_emission() {
        let mut collector = ReplayCollector::immediate(track(3));
        collector.on_update(Arc::new(|_| {}));
        collector.start().unwrap();
        collector.stop();

        assert_eq!(collector.latest().unwrap().time, 1_002);
    }

    #[test]
    fn double_start_rejected() {
        let mut collector = ReplayCollector::new(track(1_000), Duration::from_millis(5));
        collector.on_update(Arc::new(|_| {}));
        collector.start().unwrap();
        assert!(matches!(collector.start(), Err(SourceError::AlreadyRunning)));
        collector.stop();
    }
}
