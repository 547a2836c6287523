//! In-memory history store
//!
//! Bounded deque, drop-oldest at capacity (default 10 000). The
//! reference backend for tests and for deployments that do not need
//! durability.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::HistoryStore;
use crate::constants::store::MEMORY_CAPACITY;
use crate::errors::StoreError;
use crate::fix::Fix;
use crate::time::Timestamp;

pub struct MemoryStore {
    inner: Mutex<VecDeque<Fix>>,
    capacity: usize,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("memory store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MEMORY_CAPACITY)
    }
}

impl HistoryStore for MemoryStore {
    fn save(&self, fix: &Fix) -> Result<(), StoreError> {
        let mut store = self.inner.lock().expect("memory store lock poisoned");
        if store.len() == self.capacity {
            store.pop_front();
        }
        store.push_back(fix.clone());
        Ok(())
    }

    fn latest(&self) -> Option<Fix> {
        self.inner
            .lock()
            .expect("memory store lock poisoned")
            .back()
            .cloned()
    }

    fn query_by_time(&self, from: Timestamp, to: Timestamp) -> Vec<Fix> {
        self.inner
            .lock()
            .expect("memory store lock poisoned")
            .iter()
            .filter(|f| f.time >= from && f.time <= to)
            .cloned()
            .collect()
    }

    fn recent(&self, n: usize) -> Vec<Fix> {
        let store = self.inner.lock().expect("memory store lock poisoned");
        let skip = store.len().saturating_sub(n);
        store.iter().skip(skip).cloned().collect()
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.inner.lock().expect("memory store lock poisoned").clear();
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        Ok(())
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
    fn capacity_drops_oldest() {
        let store = MemoryStore::new(3);
        for t in 1..=5 {
            store.save(&fix_at(t)).unwrap();
        }

        assert_eq!(store.len(), 3);
        let times: Vec<_> = store.recent(10).iter().map(|f| f.time).collect();
        assert_eq!(times, vec![3, 4, 5]);
    }

    #[test]
    fn latest_and_recent() {
        let store = MemoryStore::new(10);
        for t in 1..=5 {
            store.save(&fix_at(t)).unwrap();
        }

        assert_eq!(store.latest().unwrap().time, 5);
        let recent: Vec<_> = store.recent(2).iter().map(|f| f.time).collect();
        assert_eq!(recent, vec![4, 5]);
    }

    #[test]
    fn query_by_time_is_inclusive() {
        let store = MemoryStore::new(10);
        for t in 1..=5 {
            store.save(&fix_at(t * 100)).unwrap();
        }

        let hits: Vec<_> = store.query_by_time(200, 400).iter().map(|f| f.time).collect();
        assert_eq!(hits, vec![200, 300, 400]);
    }

    #[test]
    fn save_batch_and_clear() {
        let store = MemoryStore::new(10);
        store
            .save_batch(&[fix_at(1), fix_at(2), fix_at(3)])
            .unwrap();
        assert_eq!(store.len(), 3);

        store.clear().unwrap();
        assert!(store.is_empty());
        assert!(store.latest().is_none());
    }
}
