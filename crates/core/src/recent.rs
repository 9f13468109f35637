//! Bounded, persisted most-recently-opened list.
//!
//! Five entries, newest first. Re-opening a listed note moves it to the
//! front rather than duplicating it. The list is rewritten to disk
//! synchronously on every change; observers are notified after the write so
//! a crash never leaves them ahead of the stored state.

use doc_model::{DocumentDescriptor, RecentEntry};
use noteshelf_cache::CacheError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

pub const MAX_RECENT: usize = 5;

const RECENT_SCHEMA_VERSION: u32 = 1;

type Observer = Box<dyn Fn(&[RecentEntry]) + Send>;

#[derive(Debug, Serialize, Deserialize)]
struct RecentEnvelope {
    version: u32,
    entries: Vec<RecentEntry>,
}

struct RecentState {
    entries: Vec<RecentEntry>,
    storage_path: PathBuf,
}

impl RecentState {
    /// Write `next` to disk, then adopt it. A failed write leaves the
    /// in-memory list at the last persisted state.
    fn commit(&mut self, next: Vec<RecentEntry>) -> Result<(), CacheError> {
        if let Some(parent) = self.storage_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let envelope = RecentEnvelope {
            version: RECENT_SCHEMA_VERSION,
            entries: next,
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(&self.storage_path, bytes)?;
        self.entries = envelope.entries;
        Ok(())
    }
}

#[derive(Clone)]
pub struct RecentlyOpenedTracker {
    state: Arc<Mutex<RecentState>>,
    observers: Arc<Mutex<Vec<Observer>>>,
}

impl RecentlyOpenedTracker {
    /// Load the tracker from `path`, creating an empty list if the file is
    /// absent or unreadable.
    pub fn with_storage_path<P: AsRef<Path>>(path: P) -> Self {
        let storage_path = path.as_ref().to_path_buf();
        let entries = Self::load(&storage_path);

        Self {
            state: Arc::new(Mutex::new(RecentState { entries, storage_path })),
            observers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn load(path: &Path) -> Vec<RecentEntry> {
        let Ok(bytes) = fs::read(path) else {
            return Vec::new();
        };
        match serde_json::from_slice::<RecentEnvelope>(&bytes) {
            Ok(envelope) if envelope.version == RECENT_SCHEMA_VERSION => envelope.entries,
            Ok(envelope) => {
                log::warn!("recent list schema v{} unsupported, starting fresh", envelope.version);
                Vec::new()
            }
            Err(e) => {
                log::warn!("recent list unreadable ({e}), starting fresh");
                Vec::new()
            }
        }
    }

    /// Record that a document was opened now.
    pub fn record_open(&self, descriptor: &DocumentDescriptor) -> Result<(), CacheError> {
        self.record(RecentEntry {
            id: descriptor
                .id
                .as_ref()
                .map(|id| id.as_str().to_owned())
                .unwrap_or_else(|| descriptor.cache_key()),
            title: descriptor.display_name.clone(),
            locator: descriptor.locator.as_ref().map(|l| l.as_str().to_owned()),
            last_opened_at: now_ms(),
        })
    }

    /// Insert an entry with an explicit timestamp. A matching id replaces
    /// the old entry; the list is kept newest-first and capped at
    /// [`MAX_RECENT`].
    pub fn record(&self, entry: RecentEntry) -> Result<(), CacheError> {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            let mut next = state.entries.clone();
            next.retain(|existing| existing.id != entry.id);
            next.push(entry);
            next.sort_by(|a, b| b.last_opened_at.cmp(&a.last_opened_at));
            next.truncate(MAX_RECENT);
            state.commit(next)?;
            state.entries.clone()
        };

        self.notify(&snapshot);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<(), CacheError> {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            let mut next = state.entries.clone();
            next.retain(|entry| entry.id != id);
            if next.len() == state.entries.len() {
                return Ok(());
            }
            state.commit(next)?;
            state.entries.clone()
        };

        self.notify(&snapshot);
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        {
            let mut state = self.state.lock().unwrap();
            state.commit(Vec::new())?;
        }
        self.notify(&[]);
        Ok(())
    }

    /// Current entries, newest first.
    pub fn list(&self) -> Vec<RecentEntry> {
        self.state.lock().unwrap().entries.clone()
    }

    /// Register a callback invoked after every persisted change.
    pub fn subscribe<F>(&self, observer: F)
    where
        F: Fn(&[RecentEntry]) + Send + 'static,
    {
        self.observers.lock().unwrap().push(Box::new(observer));
    }

    fn notify(&self, entries: &[RecentEntry]) {
        // Called without the state lock held, so an observer may read the
        // tracker back without deadlocking.
        for observer in self.observers.lock().unwrap().iter() {
            observer(entries);
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
