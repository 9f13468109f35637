//! Bounded in-memory thumbnail cache.
//!
//! Keys are descriptor cache keys; values are raw RGBA covers. The cache is
//! byte-budgeted with LRU eviction on insert, and exposes two pressure
//! hooks: `evict_all` for a host memory warning and `evict_except` to keep
//! only the currently visible rows alive.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub key: String,
    /// Raw pixel data (RGBA format).
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Thumbnail {
    pub fn new(key: impl Into<String>, pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self { key: key.into(), pixels, width, height }
    }

    pub fn memory_size(&self) -> usize {
        self.pixels.len()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThumbStats {
    pub entry_count: usize,
    pub memory_used: usize,
    pub memory_limit: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl ThumbStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct ThumbState {
    entries: HashMap<String, Thumbnail>,
    /// Front = least recently used.
    lru_queue: VecDeque<String>,
    memory_used: usize,
    memory_limit: usize,
    stats: ThumbStats,
}

impl ThumbState {
    fn touch(&mut self, key: &str) {
        self.lru_queue.retain(|k| k != key);
        self.lru_queue.push_back(key.to_owned());
    }

    fn drop_entry(&mut self, key: &str) -> Option<Thumbnail> {
        let thumb = self.entries.remove(key)?;
        self.memory_used = self.memory_used.saturating_sub(thumb.memory_size());
        self.lru_queue.retain(|k| k != key);
        self.sync_stats();
        Some(thumb)
    }

    fn evict_to_fit(&mut self, required: usize) {
        while self.memory_used + required > self.memory_limit && !self.lru_queue.is_empty() {
            if let Some(key) = self.lru_queue.front().cloned() {
                if self.drop_entry(&key).is_some() {
                    self.stats.evictions += 1;
                }
            }
        }
    }

    fn sync_stats(&mut self) {
        self.stats.entry_count = self.entries.len();
        self.stats.memory_used = self.memory_used;
    }
}

/// Thread-safe bounded map from item key to rendered cover.
///
/// Descriptors only hold the key; an eviction never invalidates anything but
/// the image itself, which enrichment can re-render on demand.
#[derive(Clone)]
pub struct ThumbnailMemoCache {
    state: Arc<Mutex<ThumbState>>,
}

impl ThumbnailMemoCache {
    pub fn new(memory_limit: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(ThumbState {
                entries: HashMap::new(),
                lru_queue: VecDeque::new(),
                memory_used: 0,
                memory_limit,
                stats: ThumbStats { memory_limit, ..Default::default() },
            })),
        }
    }

    pub fn with_mb_limit(megabytes: usize) -> Self {
        Self::new(megabytes * 1024 * 1024)
    }

    pub fn put(&self, thumbnail: Thumbnail) {
        let mut state = self.state.lock().unwrap();
        let key = thumbnail.key.clone();
        let size = thumbnail.memory_size();

        state.drop_entry(&key);
        state.evict_to_fit(size);

        state.memory_used += size;
        state.entries.insert(key.clone(), thumbnail);
        state.touch(&key);
        state.sync_stats();
    }

    pub fn get(&self, key: &str) -> Option<Thumbnail> {
        let mut state = self.state.lock().unwrap();

        if let Some(thumb) = state.entries.get(key).cloned() {
            state.touch(key);
            state.stats.hits += 1;
            Some(thumb)
        } else {
            state.stats.misses += 1;
            None
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.entries.contains_key(key)
    }

    /// Drop everything. Wired to the host memory-pressure signal.
    pub fn evict_all(&self) {
        let mut state = self.state.lock().unwrap();
        let dropped = state.entries.len() as u64;
        state.entries.clear();
        state.lru_queue.clear();
        state.memory_used = 0;
        state.stats.evictions += dropped;
        state.sync_stats();
        log::debug!("thumbnail cache cleared ({dropped} entries)");
    }

    /// Drop every entry except the protected (visible) keys.
    pub fn evict_except<S: AsRef<str>>(&self, visible_keys: &[S]) {
        let protected: HashSet<&str> = visible_keys.iter().map(|k| k.as_ref()).collect();
        let mut state = self.state.lock().unwrap();

        let doomed: Vec<String> = state
            .entries
            .keys()
            .filter(|key| !protected.contains(key.as_str()))
            .cloned()
            .collect();

        for key in doomed {
            if state.drop_entry(&key).is_some() {
                state.stats.evictions += 1;
            }
        }
    }

    pub fn stats(&self) -> ThumbStats {
        let state = self.state.lock().unwrap();
        state.stats
    }

    pub fn memory_used(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.memory_used
    }

    pub fn entry_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.entries.len()
    }
}

impl Default for ThumbnailMemoCache {
    /// 32MB default budget: roughly 250 list covers at 160x200 RGBA.
    fn default() -> Self {
        Self::with_mb_limit(32)
    }
}
