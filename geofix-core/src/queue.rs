//! Bounded ingest queue between collectors and the consumer loop
//!
//! ## Overview
//!
//! Collectors on their own threads deposit raw fixes here; a single
//! consumer drains them in insertion order. The queue is a bounded FIFO
//! with a drop-oldest overflow policy: `push` never blocks, and when the
//! queue is full the oldest fix is evicted and counted. The downstream
//! pipeline tolerates the loss - the staleness filter and the
//! statistical detector re-anchor on time.
//!
//! ## Discipline
//!
//! Multi-writer, single-reader. The internal lock is held only for the
//! enqueue/dequeue itself; statistics are atomics updated outside any
//! lock-sensitive path. The consumer waits on a condvar with a bounded
//! timeout (default 50 ms) so cancellation is always observed promptly.
//! `close()` wakes every waiter; producers pushing into a closed queue
//! have their fixes counted as dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::fix::Fix;

/// Queue health counters, readable without taking the queue lock.
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total fixes accepted
    pub pushed: AtomicU64,
    /// Total fixes handed to the consumer
    pub popped: AtomicU64,
    /// Fixes lost to overflow or a closed queue
    pub dropped: AtomicU64,
    /// High-water mark of queue depth
    pub max_depth: AtomicU64,
}

impl QueueStats {
    fn update_max_depth(&self, current: u64) {
        let mut max = self.max_depth.load(Ordering::Relaxed);
        while current > max {
            match self.max_depth.compare_exchange_weak(
                max,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => max = actual,
            }
        }
    }
}

#[derive(Debug)]
struct Inner {
    deque: VecDeque<Fix>,
    closed: bool,
}

/// Bounded multi-producer / single-consumer fix queue.
#[derive(Debug)]
pub struct IngestQueue {
    inner: Mutex<Inner>,
    available: Condvar,
    capacity: usize,
    stats: QueueStats,
}

impl IngestQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                deque: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
            stats: QueueStats::default(),
        }
    }

    /// Enqueue a fix. Never blocks.
    ///
    /// Returns `true` when the fix was accepted without evicting
    /// anything; `false` when the oldest entry was dropped to make room
    /// or the queue is closed.
    pub fn push(&self, fix: Fix) -> bool {
        let depth;
        let clean;
        {
            let mut inner = self.inner.lock().expect("ingest queue lock poisoned");
            if inner.closed {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }

            clean = if inner.deque.len() == self.capacity {
                inner.deque.pop_front();
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                false
            } else {
                true
            };

            inner.deque.push_back(fix);
            depth = inner.deque.len() as u64;
        }

        self.stats.pushed.fetch_add(1, Ordering::Relaxed);
        self.stats.update_max_depth(depth);
        self.available.notify_one();
        clean
    }

    /// Dequeue the oldest fix, or `None` when empty.
    pub fn pop(&self) -> Option<Fix> {
        let mut inner = self.inner.lock().expect("ingest queue lock poisoned");
        let fix = inner.deque.pop_front();
        if fix.is_some() {
            self.stats.popped.fetch_add(1, Ordering::Relaxed);
        }
        fix
    }

    /// Dequeue, waiting up to `timeout` for a fix to arrive.
    ///
    /// Returns `None` on timeout or when the queue is closed and empty.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Fix> {
        let mut inner = self.inner.lock().expect("ingest queue lock poisoned");
        if inner.deque.is_empty() && !inner.closed {
            let (guard, _) = self
                .available
                .wait_timeout(inner, timeout)
                .expect("ingest queue lock poisoned");
            inner = guard;
        }

        let fix = inner.deque.pop_front();
        if fix.is_some() {
            self.stats.popped.fetch_add(1, Ordering::Relaxed);
        }
        fix
    }

    /// Close the queue: reject further pushes and wake all waiters.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("ingest queue lock poisoned");
        inner.closed = true;
        drop(inner);
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().expect("ingest queue lock poisoned").closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("ingest queue lock poisoned").deque.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}
