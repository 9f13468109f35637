//! Blob downloads over HTTP.
//!
//! Bytes stream to a staging file next to the destination and are only moved
//! into place once the body completed; a cancelled or failed download never
//! leaves a partial file behind.

use crate::NetError;
use doc_model::Locator;
use noteshelf_scheduler::CancellationToken;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

const COPY_CHUNK: usize = 64 * 1024;

/// Fetches a remote blob into a local file. The pipeline's tier-4 seam;
/// tests substitute their own implementation with call counters.
pub trait BlobFetcher: Send + Sync {
    fn fetch(
        &self,
        locator: &Locator,
        dest: &Path,
        token: &CancellationToken,
    ) -> Result<(), NetError>;
}

/// Byte-size lookup for an item's locator, used by list enrichment.
pub trait SizeProbe: Send + Sync {
    fn byte_size(&self, locator: &Locator) -> Result<u64, NetError>;
}

#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub user_agent: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            user_agent: "NoteShelf".to_owned(),
        }
    }
}

/// Blocking HTTP downloader. No caching, no retry; callers own both.
pub struct Downloader {
    agent: ureq::Agent,
    user_agent: String,
}

impl Downloader {
    pub fn new(config: DownloaderConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .timeout_read(config.read_timeout)
            .build();

        Self { agent, user_agent: config.user_agent }
    }

    fn transport_error(locator: &Locator, err: ureq::Error) -> NetError {
        match err {
            ureq::Error::Status(code, _) => {
                NetError::Transport(format!("{} returned HTTP {code}", locator.as_str()))
            }
            ureq::Error::Transport(t) => {
                NetError::Transport(format!("{}: {t}", locator.as_str()))
            }
        }
    }
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new(DownloaderConfig::default())
    }
}

impl BlobFetcher for Downloader {
    fn fetch(
        &self,
        locator: &Locator,
        dest: &Path,
        token: &CancellationToken,
    ) -> Result<(), NetError> {
        let resp = self
            .agent
            .get(locator.as_str())
            .set("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| Self::transport_error(locator, e))?;

        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        let mut staging = tempfile::NamedTempFile::new_in(parent)?;

        let mut reader = resp.into_reader();
        let mut buffer = vec![0u8; COPY_CHUNK];
        let mut written = 0u64;

        loop {
            if token.is_cancelled() {
                // NamedTempFile removes itself on drop.
                log::debug!("download of {} cancelled after {written} bytes", locator.as_str());
                return Err(NetError::Cancelled);
            }

            let read = reader
                .read(&mut buffer)
                .map_err(|e| NetError::Transport(format!("{}: {e}", locator.as_str())))?;
            if read == 0 {
                break;
            }

            staging.write_all(&buffer[..read])?;
            written += read as u64;
        }

        staging.flush()?;
        staging
            .persist(dest)
            .map_err(|e| NetError::Io(e.error))?;

        log::debug!("downloaded {} ({written} bytes)", locator.as_str());
        Ok(())
    }
}

impl SizeProbe for Downloader {
    fn byte_size(&self, locator: &Locator) -> Result<u64, NetError> {
        let resp = self
            .agent
            .head(locator.as_str())
            .set("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| Self::transport_error(locator, e))?;

        resp.header("Content-Length")
            .and_then(|value| value.parse::<u64>().ok())
            .ok_or_else(|| NetError::NoLength(locator.as_str().to_owned()))
    }
}
