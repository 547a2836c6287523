//! Correction cache for the high-throughput variant
//!
//! Keyed by fix fingerprint (source kind + capture time rounded to the
//! key granularity), each entry holds the last-emitted correction for
//! that fingerprint with a TTL. Entries expire on read and in a
//! periodic sweep, and an entry is never served once a later-time
//! correction has been emitted - a cache hit can be stale in wall time
//! but never superseded.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::constants::pipeline::{CACHE_KEY_GRANULARITY_MS, CACHE_SIZE, CACHE_TTL_MS};
use crate::fix::{CorrectedFix, SourceKind};
use crate::time::Timestamp;

struct Entry {
    fix: CorrectedFix,
    inserted: Timestamp,
}

struct State {
    map: HashMap<String, Entry>,
    /// Largest emitted correction time seen; entries older than this
    /// are superseded
    newest_emission: Timestamp,
}

pub struct CorrectionCache {
    state: Mutex<State>,
    ttl_ms: u64,
    capacity: usize,
}

impl CorrectionCache {
    pub fn new(capacity: usize, ttl_ms: u64) -> Self {
        Self {
            state: Mutex::new(State {
                map: HashMap::new(),
                newest_emission: 0,
            }),
            ttl_ms: ttl_ms.max(1),
            capacity: capacity.max(1),
        }
    }

    fn key(source: SourceKind, time: Timestamp) -> String {
        format!("{}:{}", source.name(), time / CACHE_KEY_GRANULARITY_MS)
    }

    /// Record an emission under its original fix's fingerprint.
    pub fn insert(&self, corrected: &CorrectedFix, now: Timestamp) {
        let mut state = self.state.lock().expect("correction cache lock poisoned");
        state.newest_emission = state.newest_emission.max(corrected.time);

        let key = Self::key(corrected.original.source, corrected.original.time);
        state.map.insert(
            key,
            Entry {
                fix: corrected.clone(),
                inserted: now,
            },
        );

        // Bound the map: evict the oldest insertion
        while state.map.len() > self.capacity {
            let Some(oldest) = state
                .map
                .iter()
                .min_by_key(|(_, e)| e.inserted)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            state.map.remove(&oldest);
        }
    }

    /// Look up by fingerprint. Expired and superseded entries are
    /// removed on the way out.
    pub fn get(&self, source: SourceKind, time: Timestamp, now: Timestamp) -> Option<CorrectedFix> {
        let mut state = self.state.lock().expect("correction cache lock poisoned");
        let key = Self::key(source, time);

        let usable = match state.map.get(&key) {
            None => return None,
            Some(entry) => {
                now.saturating_sub(entry.inserted) <= self.ttl_ms
                    && entry.fix.time >= state.newest_emission
            }
        };
        if !usable {
            state.map.remove(&key);
            return None;
        }
        state.map.get(&key).map(|e| e.fix.clone())
    }

    /// Freshest non-expired, non-superseded correction, if any.
    pub fn current(&self, now: Timestamp) -> Option<CorrectedFix> {
        let state = self.state.lock().expect("correction cache lock poisoned");
        state
            .map
            .values()
            .filter(|e| {
                now.saturating_sub(e.inserted) <= self.ttl_ms
                    && e.fix.time >= state.newest_emission
            })
            .max_by_key(|e| e.fix.time)
            .map(|e| e.fix.clone())
    }

    /// Drop every expired entry.
    pub fn sweep(&self, now: Timestamp) {
        let mut state = self.state.lock().expect("correction cache lock poisoned");
        let ttl = self.ttl_ms;
        state.map.retain(|_, e| now.saturating_sub(e.inserted) <= ttl);
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("correction cache lock poisoned").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CorrectionCache {
    fn default() -> Self {
        Self::new(CACHE_SIZE, CACHE_TTL_MS)
    }
}
