//! Persistent identifier -> local-path index.
//!
//! Maps a stable document identifier to a local file that has already been
//! validated as a well-formed document. The index is a JSON file under the
//! cache root, rewritten synchronously on every mutation. There is no TTL:
//! an entry is revalidated on read by checking the file still exists, and
//! dropped when it does not.

use crate::CacheError;
use doc_model::NoteId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

const INDEX_SCHEMA_VERSION: u32 = 1;
const INDEX_FILE: &str = "path_index.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPathEntry {
    pub path: PathBuf,
    /// Unix milliseconds of the last successful validation.
    pub validated_at: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexEnvelope {
    version: u32,
    entries: HashMap<String, LocalPathEntry>,
}

struct PathState {
    entries: HashMap<String, LocalPathEntry>,
    index_path: PathBuf,
}

impl PathState {
    fn persist(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.index_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let envelope = IndexEnvelope {
            version: INDEX_SCHEMA_VERSION,
            entries: self.entries.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(&self.index_path, bytes)?;
        Ok(())
    }
}

/// Thread-safe persistent map from document identifier to validated path.
#[derive(Clone)]
pub struct PathCache {
    state: Arc<Mutex<PathState>>,
}

impl PathCache {
    /// Open the index stored under `root`, creating an empty one if absent.
    ///
    /// A corrupt index file is discarded rather than failing construction;
    /// the cache is advisory and rebuilds itself through use.
    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        let index_path = root.as_ref().join(INDEX_FILE);
        let entries = Self::load_index(&index_path);

        Self {
            state: Arc::new(Mutex::new(PathState { entries, index_path })),
        }
    }

    fn load_index(index_path: &Path) -> HashMap<String, LocalPathEntry> {
        let Ok(bytes) = fs::read(index_path) else {
            return HashMap::new();
        };
        match serde_json::from_slice::<IndexEnvelope>(&bytes) {
            Ok(envelope) if envelope.version == INDEX_SCHEMA_VERSION => envelope.entries,
            Ok(envelope) => {
                log::warn!("path index schema v{} unsupported, starting fresh", envelope.version);
                HashMap::new()
            }
            Err(e) => {
                log::warn!("path index unreadable ({e}), starting fresh");
                HashMap::new()
            }
        }
    }

    /// Record a validated path for `id`. Call only after the file parsed as
    /// a well-formed document.
    pub fn insert(&self, id: &NoteId, path: &Path) -> Result<(), CacheError> {
        let mut state = self.state.lock().unwrap();
        state.entries.insert(
            id.as_str().to_owned(),
            LocalPathEntry { path: path.to_path_buf(), validated_at: now_ms() },
        );
        state.persist()
    }

    /// Validated local path for `id`, if the file still exists.
    ///
    /// A dangling entry is removed and persisted away on the spot.
    pub fn get(&self, id: &NoteId) -> Option<PathBuf> {
        let mut state = self.state.lock().unwrap();
        let entry = state.entries.get(id.as_str())?.clone();

        if entry.path.exists() {
            return Some(entry.path);
        }

        log::debug!("path cache entry for {} is dangling, dropping", id.as_str());
        state.entries.remove(id.as_str());
        if let Err(e) = state.persist() {
            log::warn!("failed to persist path index after drop: {e}");
        }
        None
    }

    pub fn contains(&self, id: &NoteId) -> bool {
        let state = self.state.lock().unwrap();
        state.entries.contains_key(id.as_str())
    }

    pub fn remove(&self, id: &NoteId) -> Result<(), CacheError> {
        let mut state = self.state.lock().unwrap();
        if state.entries.remove(id.as_str()).is_some() {
            state.persist()?;
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        let mut state = self.state.lock().unwrap();
        state.entries.clear();
        state.persist()
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
