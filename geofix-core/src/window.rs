//! Bounded sliding window of fixes with an internal lock
//!
//! Detectors and the scene classifier need a recent-history window that
//! several parts of the pipeline read while one writer appends. The
//! window owns its lock and exposes only `push` / `snapshot` / `clear`,
//! so the lock is never held across caller code.
//!
//! Two invariants are enforced at the boundary:
//! - entry times are monotonically non-decreasing (a fix older than the
//!   newest entry is rejected, the pipeline re-anchors on time);
//! - a fix marked `Anomaly` never enters the window (anomalies must not
//!   drift the statistics they are judged against).

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::fix::{Fix, FixStatus};
use crate::time::Timestamp;

/// Fixed-capacity sliding window; oldest entries fall off when full.
#[derive(Debug)]
pub struct FixWindow {
    inner: Mutex<VecDeque<Fix>>,
    capacity: usize,
}

impl FixWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
        }
    }

    /// Append a fix, evicting the oldest entry at capacity.
    ///
    /// Returns `false` (without inserting) for anomalous fixes and for
    /// fixes that would break time monotonicity.
    pub fn push(&self, fix: &Fix) -> bool {
        if fix.status == FixStatus::Anomaly {
            return false;
        }

        let mut window = self.inner.lock().expect("fix window lock poisoned");
        if let Some(last) = window.back() {
            if fix.time < last.time {
                return false;
            }
        }

        if window.len() == self.capacity {
            window.pop_front();
        }
        window.push_back(fix.clone());
        true
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<Fix> {
        let window = self.inner.lock().expect("fix window lock poisoned");
        window.iter().cloned().collect()
    }

    /// Most recent entry.
    pub fn last(&self) -> Option<Fix> {
        let window = self.inner.lock().expect("fix window lock poisoned");
        window.back().cloned()
    }

    /// Time of the most recent entry.
    pub fn last_time(&self) -> Option<Timestamp> {
        let window = self.inner.lock().expect("fix window lock poisoned");
        window.back().map(|fix| fix.time)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("fix window lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.inner.lock().expect("fix window lock poisoned").clear();
    }
}
