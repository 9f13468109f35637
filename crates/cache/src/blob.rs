//! Content-addressed disk store for downloaded documents.
//!
//! Blobs are keyed by the hash of their remote locator and stored as whole
//! files under the cache root. Entries are immutable once written; a re-put
//! for the same locator replaces the file outright. LRU eviction keeps the
//! store within a configured byte budget.

use doc_model::Locator;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Statistics for monitoring blob cache behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlobCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entry_count: usize,
    pub disk_used: u64,
}

impl BlobCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct BlobState {
    /// locator hash -> (blob file, byte size)
    entries: HashMap<u64, (PathBuf, u64)>,
    /// Front = least recently used.
    lru_queue: VecDeque<u64>,
    stats: BlobCacheStats,
    disk_limit: u64,
    root: PathBuf,
}

impl BlobState {
    fn touch(&mut self, key: u64) {
        self.lru_queue.retain(|&k| k != key);
        self.lru_queue.push_back(key);
    }

    fn drop_entry(&mut self, key: u64) -> io::Result<()> {
        if let Some((path, size)) = self.entries.remove(&key) {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    return Err(e);
                }
            }
            self.stats.disk_used = self.stats.disk_used.saturating_sub(size);
            self.stats.entry_count = self.entries.len();
        }
        self.lru_queue.retain(|&k| k != key);
        Ok(())
    }

    fn evict_until_fits(&mut self, incoming: u64) -> io::Result<()> {
        while self.stats.disk_used + incoming > self.disk_limit && !self.lru_queue.is_empty() {
            if let Some(key) = self.lru_queue.front().copied() {
                self.drop_entry(key)?;
                self.stats.evictions += 1;
            }
        }
        Ok(())
    }
}

/// Thread-safe content-addressed store for raw document bytes.
///
/// No network access: callers hand it bytes (or an already-downloaded file)
/// and get back the path of the stored copy.
#[derive(Clone)]
pub struct BlobCache {
    state: Arc<Mutex<BlobState>>,
}

impl BlobCache {
    /// Open (or create) a blob store rooted at `root` with a byte budget.
    ///
    /// Blob files already present under the root are re-indexed, so cached
    /// documents survive process restarts.
    pub fn new<P: AsRef<Path>>(root: P, disk_limit: u64) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let mut state = BlobState {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            stats: BlobCacheStats::default(),
            disk_limit,
            root,
        };
        Self::reindex(&mut state)?;

        Ok(Self { state: Arc::new(Mutex::new(state)) })
    }

    pub fn with_mb_limit<P: AsRef<Path>>(root: P, megabytes: u64) -> io::Result<Self> {
        Self::new(root, megabytes * 1024 * 1024)
    }

    fn reindex(state: &mut BlobState) -> io::Result<()> {
        for entry in fs::read_dir(&state.root)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("bin") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(key) = u64::from_str_radix(stem, 16) else {
                continue;
            };

            let size = entry.metadata()?.len();
            state.entries.insert(key, (path, size));
            state.lru_queue.push_back(key);
            state.stats.disk_used += size;
        }
        state.stats.entry_count = state.entries.len();
        Ok(())
    }

    fn blob_path(root: &Path, key: u64) -> PathBuf {
        root.join(format!("{key:016x}.bin"))
    }

    /// Store raw bytes for a locator, returning the blob file path.
    pub fn put_bytes(&self, locator: &Locator, bytes: &[u8]) -> io::Result<PathBuf> {
        let mut state = self.state.lock().unwrap();
        let key = locator.hash_key();

        state.drop_entry(key)?;
        state.evict_until_fits(bytes.len() as u64)?;

        let path = Self::blob_path(&state.root, key);
        fs::write(&path, bytes)?;

        state.entries.insert(key, (path.clone(), bytes.len() as u64));
        state.touch(key);
        state.stats.disk_used += bytes.len() as u64;
        state.stats.entry_count = state.entries.len();

        log::debug!("blob cache stored {} ({} bytes)", locator.as_str(), bytes.len());
        Ok(path)
    }

    /// Copy an existing local file into the store.
    ///
    /// Used by the resolution pipeline after a download has validated: the
    /// staging file is adopted so later resolutions skip the network.
    pub fn put_file(&self, locator: &Locator, source: &Path) -> io::Result<PathBuf> {
        let mut state = self.state.lock().unwrap();
        let key = locator.hash_key();
        let size = fs::metadata(source)?.len();

        state.drop_entry(key)?;
        state.evict_until_fits(size)?;

        let path = Self::blob_path(&state.root, key);
        fs::copy(source, &path)?;

        state.entries.insert(key, (path.clone(), size));
        state.touch(key);
        state.stats.disk_used += size;
        state.stats.entry_count = state.entries.len();

        Ok(path)
    }

    /// Path of the stored blob for this locator, if present.
    ///
    /// Drops the entry and reports a miss when the backing file has
    /// disappeared out from under the index.
    pub fn get(&self, locator: &Locator) -> Option<PathBuf> {
        let mut state = self.state.lock().unwrap();
        let key = locator.hash_key();

        let path = match state.entries.get(&key) {
            Some((path, _)) => path.clone(),
            None => {
                state.stats.misses += 1;
                return None;
            }
        };

        if !path.exists() {
            let _ = state.drop_entry(key);
            state.stats.misses += 1;
            return None;
        }

        state.touch(key);
        state.stats.hits += 1;
        Some(path)
    }

    pub fn contains(&self, locator: &Locator) -> bool {
        let state = self.state.lock().unwrap();
        state.entries.contains_key(&locator.hash_key())
    }

    /// Remove a blob, e.g. after it failed validation at resolution time.
    pub fn remove(&self, locator: &Locator) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.drop_entry(locator.hash_key())
    }

    pub fn clear(&self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        let keys: Vec<u64> = state.entries.keys().copied().collect();
        for key in keys {
            state.drop_entry(key)?;
        }
        Ok(())
    }

    pub fn stats(&self) -> BlobCacheStats {
        let state = self.state.lock().unwrap();
        state.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator(s: &str) -> Locator {
        Locator(s.to_owned())
    }

    #[test]
    fn put_then_get_returns_stored_path() {
        let temp = tempfile::tempdir().unwrap();
        let cache = BlobCache::new(temp.path(), 1024 * 1024).unwrap();
        let loc = locator("https://blobs.example/a.pdf");

        let stored = cache.put_bytes(&loc, b"pdf bytes").unwrap();
        let fetched = cache.get(&loc).expect("entry should be present");

        assert_eq!(stored, fetched);
        assert_eq!(fs::read(&fetched).unwrap(), b"pdf bytes");
    }

    #[test]
    fn get_misses_for_unknown_locator() {
        let temp = tempfile::tempdir().unwrap();
        let cache = BlobCache::new(temp.path(), 1024 * 1024).unwrap();

        assert!(cache.get(&locator("https://blobs.example/none.pdf")).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn reput_replaces_previous_content() {
        let temp = tempfile::tempdir().unwrap();
        let cache = BlobCache::new(temp.path(), 1024 * 1024).unwrap();
        let loc = locator("https://blobs.example/a.pdf");

        cache.put_bytes(&loc, b"old").unwrap();
        cache.put_bytes(&loc, b"replacement").unwrap();

        let path = cache.get(&loc).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"replacement");
        assert_eq!(cache.stats().entry_count, 1);
    }

    #[test]
    fn eviction_drops_least_recently_used() {
        let temp = tempfile::tempdir().unwrap();
        // Budget fits two of the three 4-byte blobs.
        let cache = BlobCache::new(temp.path(), 8).unwrap();
        let (a, b, c) = (locator("a"), locator("b"), locator("c"));

        cache.put_bytes(&a, b"aaaa").unwrap();
        cache.put_bytes(&b, b"bbbb").unwrap();
        cache.get(&a); // a becomes most recently used
        cache.put_bytes(&c, b"cccc").unwrap();

        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
        assert!(cache.contains(&c));
        assert!(cache.stats().evictions >= 1);
    }

    #[test]
    fn entries_survive_reopen() {
        let temp = tempfile::tempdir().unwrap();
        let loc = locator("https://blobs.example/persist.pdf");

        {
            let cache = BlobCache::new(temp.path(), 1024 * 1024).unwrap();
            cache.put_bytes(&loc, b"still here").unwrap();
        }

        let reopened = BlobCache::new(temp.path(), 1024 * 1024).unwrap();
        let path = reopened.get(&loc).expect("blob should be reindexed");
        assert_eq!(fs::read(&path).unwrap(), b"still here");
    }

    #[test]
    fn remove_deletes_file_and_entry() {
        let temp = tempfile::tempdir().unwrap();
        let cache = BlobCache::new(temp.path(), 1024 * 1024).unwrap();
        let loc = locator("https://blobs.example/gone.pdf");

        let path = cache.put_bytes(&loc, b"bytes").unwrap();
        cache.remove(&loc).unwrap();

        assert!(!cache.contains(&loc));
        assert!(!path.exists());
    }

    #[test]
    fn put_file_copies_source_into_store() {
        let temp = tempfile::tempdir().unwrap();
        let staging = temp.path().join("staging.pdf");
        fs::write(&staging, b"downloaded").unwrap();

        let store_dir = temp.path().join("store");
        let cache = BlobCache::new(&store_dir, 1024 * 1024).unwrap();
        let loc = locator("https://blobs.example/d.pdf");

        let blob = cache.put_file(&loc, &staging).unwrap();
        assert!(blob.starts_with(&store_dir));
        assert_eq!(fs::read(&blob).unwrap(), b"downloaded");
        // The staging file is the caller's to clean up.
        assert!(staging.exists());
    }
}
