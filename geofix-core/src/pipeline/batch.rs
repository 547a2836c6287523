//! Batch buffer for the high-throughput variant
//!
//! Collectors deposit into the buffer instead of the queue; when the
//! buffer reaches its size or its oldest entry exceeds the timeout, the
//! whole batch is handed over as one unit, amortising queue locking
//! under bursty load.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::constants::pipeline::{BATCH_SIZE, BATCH_TIMEOUT_MS};
use crate::fix::Fix;

struct State {
    buffer: Vec<Fix>,
    oldest: Option<Instant>,
}

pub struct BatchBuffer {
    state: Mutex<State>,
    capacity: usize,
    timeout: Duration,
}

impl BatchBuffer {
    pub fn new(capacity: usize, timeout_ms: u64) -> Self {
        Self {
            state: Mutex::new(State {
                buffer: Vec::new(),
                oldest: None,
            }),
            capacity: capacity.max(1),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Deposit a fix. Returns the full batch once the size is reached.
    pub fn push(&self, fix: Fix) -> Option<Vec<Fix>> {
        let mut state = self.state.lock().expect("batch buffer lock poisoned");
        if state.buffer.is_empty() {
            state.oldest = Some(Instant::now());
        }
        state.buffer.push(fix);

        if state.buffer.len() >= self.capacity {
            state.oldest = None;
            Some(std::mem::take(&mut state.buffer))
        } else {
            None
        }
    }

    /// Hand over a partial batch whose oldest entry has waited past the
    /// timeout. Called periodically by the consumer.
    pub fn flush_if_stale(&self) -> Option<Vec<Fix>> {
        let mut state = self.state.lock().expect("batch buffer lock poisoned");
        match state.oldest {
            Some(oldest) if oldest.elapsed() >= self.timeout && !state.buffer.is_empty() => {
                state.oldest = None;
                Some(std::mem::take(&mut state.buffer))
            }
            _ => None,
        }
    }

    /// Unconditionally drain whatever is buffered.
    pub fn flush(&self) -> Vec<Fix> {
        let mut state = self.state.lock().expect("batch buffer lock poisoned");
        state.oldest = None;
        std::mem::take(&mut state.buffer)
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("batch buffer lock poisoned").buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BatchBuffer {
    fn default() -> Self {
        Self::new(BATCH_SIZE, BATCH_TIMEOUT_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::{FixBuilder, SourceKind};

    fn fix_at(time: u64) -> Fix {
        FixBuilder::new(SourceKind::Gnss, time)
            .position(39.9, 116.4)
            .accuracy(5.0)
            .build()
    }

    #[test]
    fn full_buffer_hands_over_batch() {
        let buffer = BatchBuffer::new(3, 1_000);
        assert!(buffer.push(fix_at(1)).is_none());
        assert!(buffer.push(fix_at(2)).is_none());

        let batch = buffer.push(fix_at(3)).expect("batch at capacity");
        assert_eq!(batch.len(), 3);
        assert!(buffer.is_empty());
    }

    #[test]
    fn stale_partial_batch_flushes() {
        let buffer = BatchBuffer::new(10, 10);
        buffer.push(fix_at(1));
        assert!(buffer.flush_if_stale().is_none());

        std::thread::sleep(Duration::from_millis(20));
        let batch = buffer.flush_if_stale().expect("stale batch");
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn flush_drains_everything() {
        let buffer = BatchBuffer::new(10, 1_000);
        buffer.push(fix_at(1));
        buffer.push(fix_at(2));

        assert_eq!(buffer.flush().len(), 2);
        assert!(buffer.flush().is_empty());
    }
}
