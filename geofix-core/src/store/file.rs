//! Append-only file history store with rotation
//!
//! Records are written one per line (see [`super::record`]) to
//! `fixes_<opened-at-ms>_<seq>.log` inside the configured directory.
//! The active file rotates when it has been open longer than the
//! rotation interval (default 1 h) or has grown past the size cap
//! (default 10 MB). Reads scan every log file in name order - rotation
//! keeps names lexicographically increasing - and skip malformed lines
//! with a warning rather than failing the query.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use super::{record, HistoryStore};
use crate::constants::store::{ROTATE_INTERVAL_MS, ROTATE_MAX_BYTES};
use crate::errors::StoreError;
use crate::fix::Fix;
use crate::time::{TimeSource, Timestamp};

const FILE_PREFIX: &str = "fixes_";
const FILE_SUFFIX: &str = ".log";

#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    pub directory: PathBuf,
    pub rotate_interval_ms: u64,
    pub rotate_max_bytes: u64,
}

impl FileStoreConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            rotate_interval_ms: ROTATE_INTERVAL_MS,
            rotate_max_bytes: ROTATE_MAX_BYTES,
        }
    }

    pub fn rotate_interval_ms(mut self, ms: u64) -> Self {
        self.rotate_interval_ms = ms.max(1);
        self
    }

    pub fn rotate_max_bytes(mut self, bytes: u64) -> Self {
        self.rotate_max_bytes = bytes.max(1);
        self
    }
}

struct ActiveFile {
    writer: BufWriter<File>,
    bytes: u64,
    opened_at: Timestamp,
}

struct State {
    active: Option<ActiveFile>,
    seq: u32,
    closed: bool,
}

pub struct FileStore {
    config: FileStoreConfig,
    clock: Arc<dyn TimeSource>,
    state: Mutex<State>,
}

impl FileStore {
    pub fn new(config: FileStoreConfig, clock: Arc<dyn TimeSource>) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.directory)?;
        info!(directory = %config.directory.display(), "file store initialized");
        Ok(Self {
            config,
            clock,
            state: Mutex::new(State {
                active: None,
                seq: 0,
                closed: false,
            }),
        })
    }

    fn log_path(&self, opened_at: Timestamp, seq: u32) -> PathBuf {
        self.config
            .directory
            .join(format!("{FILE_PREFIX}{opened_at:013}_{seq:04}{FILE_SUFFIX}"))
    }

    fn open_active(&self, state: &mut State) -> Result<(), StoreError> {
        let opened_at = self.clock.now();
        state.seq += 1;
        let path = self.log_path(opened_at, state.seq);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let bytes = file.metadata()?.len();
        info!(path = %path.display(), "log file opened");
        state.active = Some(ActiveFile {
            writer: BufWriter::new(file),
            bytes,
            opened_at,
        });
        Ok(())
    }

    fn rotate_if_needed(&self, state: &mut State) -> Result<(), StoreError> {
        let needs_rotation = match &state.active {
            None => true,
            Some(active) => {
                let age = self.clock.now().saturating_sub(active.opened_at);
                age >= self.config.rotate_interval_ms || active.bytes >= self.config.rotate_max_bytes
            }
        };

        if needs_rotation {
            if let Some(mut old) = state.active.take() {
                old.writer.flush()?;
            }
            self.open_active(state)?;
        }
        Ok(())
    }

    fn log_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.config.directory) else {
            return Vec::new();
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_SUFFIX))
            })
            .collect();
        files.sort();
        files
    }

    fn read_file(path: &Path) -> Vec<Fix> {
        let Ok(file) = File::open(path) else {
            return Vec::new();
        };

        let mut fixes = Vec::new();
        for line in BufReader::new(file).lines() {
            let Ok(line) = line else { break };
            if line.is_empty() {
                continue;
            }
            match record::decode(&line) {
                Ok(fix) => fixes.push(fix),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping malformed record");
                }
            }
        }
        fixes
    }

    fn read_all(&self) -> Vec<Fix> {
        // Flush buffered writes so reads observe them
        {
            let mut state = self.state.lock().expect("file store lock poisoned");
            if let Some(active) = state.active.as_mut() {
                let _ = active.writer.flush();
            }
        }

        self.log_files()
            .iter()
            .flat_map(|path| Self::read_file(path))
            .collect()
    }
}

impl HistoryStore for FileStore {
    fn save(&self, fix: &Fix) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("file store lock poisoned");
        if state.closed {
            return Err(StoreError::Closed);
        }

        self.rotate_if_needed(&mut state)?;
        let active = state.active.as_mut().expect("active file after rotation");

        let line = record::encode(fix);
        active.writer.write_all(line.as_bytes())?;
        active.writer.write_all(b"\n")?;
        active.bytes += line.len() as u64 + 1;
        Ok(())
    }

    fn save_batch(&self, fixes: &[Fix]) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("file store lock poisoned");
        if state.closed {
            return Err(StoreError::Closed);
        }

        self.rotate_if_needed(&mut state)?;
        let active = state.active.as_mut().expect("active file after rotation");
        for fix in fixes {
            let line = record::encode(fix);
            active.writer.write_all(line.as_bytes())?;
            active.writer.write_all(b"\n")?;
            active.bytes += line.len() as u64 + 1;
        }
        active.writer.flush()?;
        Ok(())
    }

    fn latest(&self) -> Option<Fix> {
        self.read_all().into_iter().last()
    }

    fn query_by_time(&self, from: Timestamp, to: Timestamp) -> Vec<Fix> {
        self.read_all()
            .into_iter()
            .filter(|f| f.time >= from && f.time <= to)
            .collect()
    }

    fn recent(&self, n: usize) -> Vec<Fix> {
        let all = self.read_all();
        let skip = all.len().saturating_sub(n);
        all.into_iter().skip(skip).collect()
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("file store lock poisoned");
        state.active = None;
        for path in self.log_files() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("file store lock poisoned");
        if let Some(mut active) = state.active.take() {
            active.writer.flush()?;
        }
        state.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::{FixBuilder, SourceKind};
    use crate::time::FixedClock;

    fn fix_at(time: u64) -> Fix {
        FixBuilder::new(SourceKind::Gnss, time)
            .position(39.9, 116.4)
            .accuracy(5.0)
            .attribute("satellites", "9")
            .build()
    }

    fn store_in(dir: &Path, clock: Arc<FixedClock>) -> FileStore {
        FileStore::new(FileStoreConfig::new(dir), clock).unwrap()
    }

    #[test]
    fn save_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(1_000));
        let store = store_in(dir.path(), clock);

        store.save(&fix_at(100)).unwrap();
        store.save(&fix_at(200)).unwrap();

        assert_eq!(store.latest().unwrap().time, 200);
        let recent = store.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].attribute("satellites"), Some("9"));
    }

    #[test]
    fn rotates_on_size() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(1_000));
        let store = FileStore::new(
            FileStoreConfig::new(dir.path()).rotate_max_bytes(120),
            clock,
        )
        .unwrap();

        for t in 1..=10 {
            store.save(&fix_at(t)).unwrap();
        }

        assert!(store.log_files().len() > 1, "expected size rotation");
        // All records survive across files, in order
        let times: Vec<_> = store.recent(100).iter().map(|f| f.time).collect();
        assert_eq!(times, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn rotates_on_age() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(1_000));
        let store = FileStore::new(
            FileStoreConfig::new(dir.path()).rotate_interval_ms(1_000),
            Arc::clone(&clock) as Arc<dyn TimeSource>,
        )
        .unwrap();

        store.save(&fix_at(1)).unwrap();
        clock.advance(2_000);
        store.save(&fix_at(2)).unwrap();

        assert_eq!(store.log_files().len(), 2);
    }

    #[test]
    fn query_by_time_spans_files() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(1_000));
        let store = FileStore::new(
            FileStoreConfig::new(dir.path()).rotate_max_bytes(120),
            clock,
        )
        .unwrap();

        for t in 1..=10 {
            store.save(&fix_at(t * 100)).unwrap();
        }

        let hits: Vec<_> = store.query_by_time(300, 600).iter().map(|f| f.time).collect();
        assert_eq!(hits, vec![300, 400, 500, 600]);
    }

    #[test]
    fn malformed_lines_skipped_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(1_000));
        let store = store_in(dir.path(), clock);

        store.save(&fix_at(100)).unwrap();
        store.close().unwrap();

        // Corrupt the log by appending garbage
        let path = store.log_files().pop().unwrap();
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        writeln!(file, "garbage,line").unwrap();

        assert_eq!(store.recent(10).len(), 1);
    }

    #[test]
    fn closed_store_rejects_saves() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(1_000));
        let store = store_in(dir.path(), clock);

        store.close().unwrap();
        assert!(matches!(store.save(&fix_at(1)), Err(StoreError::Closed)));
    }

    #[test]
    fn clear_removes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(1_000));
        let store = store_in(dir.path(), clock);

        store.save(&fix_at(1)).unwrap();
        store.clear().unwrap();
        assert!(store.log_files().is_empty());
        assert!(store.latest().is_none());
    }
}
