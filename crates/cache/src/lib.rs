//! NoteShelf local caches.
//!
//! Three stores sit between the remote collection and the viewer:
//! - [`BlobCache`]: content-addressed disk store, keyed by locator hash.
//! - [`PathCache`]: persistent identifier -> validated-local-path index.
//! - [`ThumbnailMemoCache`]: bounded in-memory cover thumbnails.
//!
//! All three are internally synchronized; worker threads may read and write
//! them concurrently.

pub mod blob;
pub mod paths;
pub mod thumbs;

pub use blob::{BlobCache, BlobCacheStats};
pub use paths::{LocalPathEntry, PathCache};
pub use thumbs::{Thumbnail, ThumbnailMemoCache, ThumbStats};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("unable to resolve local cache directory")]
    NoCacheDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Default on-disk cache root, e.g. `~/.cache/noteshelf` on Linux.
pub fn default_cache_root() -> Result<PathBuf, CacheError> {
    dirs::cache_dir()
        .map(|dir| dir.join("noteshelf"))
        .ok_or(CacheError::NoCacheDirectory)
}
