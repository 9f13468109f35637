//! Remote collaborators: blob downloads and the note collection.
//!
//! This crate owns every socket the pipeline touches. It deliberately has no
//! caching logic; the resolution pipeline layers that on top.

mod collection;
mod download;

pub use collection::{InMemoryCollection, NoteCollection};
pub use download::{BlobFetcher, Downloader, DownloaderConfig, SizeProbe};

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Locator unreachable, non-2xx status, or a malformed response.
    #[error("transport error: {0}")]
    Transport(String),
    #[error("download cancelled")]
    Cancelled,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no byte size available for {0}")]
    NoLength(String),
}
