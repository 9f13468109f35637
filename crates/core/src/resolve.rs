//! Opaque reference -> validated local document file.
//!
//! Resolution walks four tiers in order, stopping at the first hit:
//!
//! 1. path cache: identifier already mapped to a validated local file
//! 2. blob cache: locator bytes already on disk from an earlier download
//! 3. local-file locator: the locator itself points at a file on this machine
//! 4. download: fetch to a staging file, validate, then adopt into the caches
//!
//! A file only enters the caches after it has parsed as a well-formed
//! document, so a cache hit never needs re-validation beyond existence.

use crate::error::ResolveError;
use doc_model::{Locator, NoteId};
use noteshelf_cache::{BlobCache, PathCache};
use noteshelf_net::BlobFetcher;
use noteshelf_scheduler::CancellationToken;
use pdf_engine::DocumentRenderer;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const FILE_SCHEME: &str = "file://";

pub struct ResolutionPipeline {
    paths: PathCache,
    blobs: BlobCache,
    fetcher: Arc<dyn BlobFetcher>,
    renderer: Arc<dyn DocumentRenderer>,
    /// Downloads land here before validation; adopted files are copied into
    /// the blob store and the staging copy removed.
    staging_root: PathBuf,
}

impl ResolutionPipeline {
    pub fn new(
        paths: PathCache,
        blobs: BlobCache,
        fetcher: Arc<dyn BlobFetcher>,
        renderer: Arc<dyn DocumentRenderer>,
        staging_root: PathBuf,
    ) -> Self {
        Self { paths, blobs, fetcher, renderer, staging_root }
    }

    /// Resolve a note reference to a local file containing a valid document.
    ///
    /// Either `id` or `locator` may be absent, but not both. The token is
    /// checked between tiers and after the download; a cancelled resolution
    /// leaves the caches untouched.
    pub fn resolve(
        &self,
        id: Option<&NoteId>,
        locator: Option<&Locator>,
        token: &CancellationToken,
    ) -> Result<PathBuf, ResolveError> {
        if id.is_none() && locator.is_none() {
            return Err(ResolveError::MissingReference);
        }

        if let Some(id) = id {
            if let Some(path) = self.paths.get(id) {
                log::debug!("resolved {} from path cache", id.as_str());
                return Ok(path);
            }
        }
        if token.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }

        let Some(locator) = locator else {
            // Identifier-only reference with no cached path: nothing left to
            // try, the note has no retrievable content.
            return Err(ResolveError::MissingReference);
        };

        if let Some(path) = self.blobs.get(locator) {
            match self.validate(&path) {
                Ok(()) => {
                    self.remember(id, &path)?;
                    log::debug!("resolved {} from blob cache", locator.as_str());
                    return Ok(path);
                }
                Err(e) => {
                    // Corrupt blob, likely a truncated earlier download.
                    // Drop it and fall through to the remaining tiers.
                    log::warn!("cached blob for {} failed validation: {e}", locator.as_str());
                    self.blobs.remove(locator).map_err(|e| ResolveError::Storage(e.into()))?;
                }
            }
        }
        if token.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }

        if let Some(local) = Self::as_local_path(locator) {
            if local.exists() {
                self.validate(&local)
                    .map_err(ResolveError::InvalidDocument)?;
                let stored = self
                    .blobs
                    .put_file(locator, &local)
                    .map_err(|e| ResolveError::Storage(e.into()))?;
                self.remember(id, &stored)?;
                log::debug!("resolved {} from local file", locator.as_str());
                return Ok(stored);
            }
        }

        self.download(id, locator, token)
    }

    fn download(
        &self,
        id: Option<&NoteId>,
        locator: &Locator,
        token: &CancellationToken,
    ) -> Result<PathBuf, ResolveError> {
        fs::create_dir_all(&self.staging_root)
            .map_err(|e| ResolveError::Storage(e.into()))?;
        let staging = self
            .staging_root
            .join(format!("dl-{:016x}.part", locator.hash_key()));

        let fetched = self.fetcher.fetch(locator, &staging, token);
        if let Err(e) = fetched {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }
        if token.is_cancelled() {
            let _ = fs::remove_file(&staging);
            return Err(ResolveError::Cancelled);
        }

        if let Err(e) = self.validate(&staging) {
            let _ = fs::remove_file(&staging);
            return Err(ResolveError::InvalidDocument(e));
        }

        let stored = self
            .blobs
            .put_file(locator, &staging)
            .map_err(|e| ResolveError::Storage(e.into()))?;
        let _ = fs::remove_file(&staging);
        self.remember(id, &stored)?;

        log::info!("downloaded and cached {}", locator.as_str());
        Ok(stored)
    }

    fn remember(&self, id: Option<&NoteId>, path: &Path) -> Result<(), ResolveError> {
        if let Some(id) = id {
            self.paths.insert(id, path)?;
        }
        Ok(())
    }

    fn validate(&self, path: &Path) -> Result<(), pdf_engine::RenderError> {
        self.renderer.open(path).map(|_| ())
    }

    /// A locator names a local file when it carries the file scheme or is a
    /// bare absolute path.
    fn as_local_path(locator: &Locator) -> Option<PathBuf> {
        let raw = locator.as_str();
        if let Some(stripped) = raw.strip_prefix(FILE_SCHEME) {
            return Some(PathBuf::from(stripped));
        }
        if raw.starts_with('/') {
            return Some(PathBuf::from(raw));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noteshelf_net::NetError;
    use pdf_engine::{OpenedDocument, PageSize, RenderError, RgbaImage, ThumbSize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        body: Vec<u8>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingFetcher {
        fn serving(body: &[u8]) -> Self {
            Self { body: body.to_vec(), calls: AtomicUsize::new(0), fail: false }
        }

        fn failing() -> Self {
            Self { body: Vec::new(), calls: AtomicUsize::new(0), fail: true }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl BlobFetcher for CountingFetcher {
        fn fetch(
            &self,
            _locator: &Locator,
            dest: &Path,
            _token: &CancellationToken,
        ) -> Result<(), NetError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(NetError::Transport("unreachable".into()));
            }
            fs::write(dest, &self.body)?;
            Ok(())
        }
    }

    /// Accepts any file whose contents start with b"ok".
    struct MarkerRenderer {
        opens: AtomicUsize,
    }

    impl MarkerRenderer {
        fn new() -> Self {
            Self { opens: AtomicUsize::new(0) }
        }
    }

    impl DocumentRenderer for MarkerRenderer {
        fn open(&self, path: &Path) -> Result<OpenedDocument, RenderError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let bytes = fs::read(path).map_err(RenderError::Io)?;
            if bytes.starts_with(b"ok") {
                Ok(OpenedDocument {
                    page_count: 1,
                    first_page: PageSize { width_pt: 612.0, height_pt: 792.0 },
                })
            } else {
                Err(RenderError::EmptyDocument)
            }
        }

        fn render_cover(&self, _path: &Path, target: ThumbSize) -> Result<RgbaImage, RenderError> {
            Ok(RgbaImage::new(target.width_px, target.height_px))
        }
    }

    struct Fixture {
        _temp: tempfile::TempDir,
        pipeline: ResolutionPipeline,
        fetcher: Arc<CountingFetcher>,
    }

    fn fixture(fetcher: CountingFetcher) -> Fixture {
        let temp = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(fetcher);
        let pipeline = ResolutionPipeline::new(
            PathCache::with_root(temp.path().join("index")),
            BlobCache::new(temp.path().join("blobs"), 64 * 1024 * 1024).unwrap(),
            fetcher.clone(),
            Arc::new(MarkerRenderer::new()),
            temp.path().join("staging"),
        );
        Fixture { _temp: temp, pipeline, fetcher }
    }

    fn note(id: &str) -> NoteId {
        NoteId(id.to_owned())
    }

    fn remote(name: &str) -> Locator {
        Locator(format!("https://blobs.example/{name}"))
    }

    #[test]
    fn missing_reference_is_rejected() {
        let fx = fixture(CountingFetcher::serving(b"ok"));
        let err = fx
            .pipeline
            .resolve(None, None, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, ResolveError::MissingReference));
    }

    #[test]
    fn download_happens_once_then_caches_serve() {
        let fx = fixture(CountingFetcher::serving(b"ok document"));
        let (id, loc) = (note("n1"), remote("n1.pdf"));
        let token = CancellationToken::new();

        let first = fx.pipeline.resolve(Some(&id), Some(&loc), &token).unwrap();
        let second = fx.pipeline.resolve(Some(&id), Some(&loc), &token).unwrap();

        assert_eq!(first, second);
        assert_eq!(fx.fetcher.calls(), 1, "second resolve must not re-download");
        assert_eq!(fs::read(&first).unwrap(), b"ok document");
    }

    #[test]
    fn path_cache_short_circuits_other_tiers() {
        let fx = fixture(CountingFetcher::serving(b"ok"));
        let id = note("n2");
        let temp = tempfile::tempdir().unwrap();
        let local = temp.path().join("already.pdf");
        fs::write(&local, b"ok pre-validated").unwrap();

        // Simulate an earlier successful resolution.
        fx.pipeline.paths.insert(&id, &local).unwrap();

        let resolved = fx
            .pipeline
            .resolve(Some(&id), Some(&remote("n2.pdf")), &CancellationToken::new())
            .unwrap();

        assert_eq!(resolved, local);
        assert_eq!(fx.fetcher.calls(), 0);
    }

    #[test]
    fn corrupt_cached_blob_is_dropped_and_refetched() {
        let fx = fixture(CountingFetcher::serving(b"ok fresh copy"));
        let loc = remote("n3.pdf");

        // Poison the blob cache with bytes that fail validation.
        fx.pipeline.blobs.put_bytes(&loc, b"garbage").unwrap();

        let resolved = fx
            .pipeline
            .resolve(None, Some(&loc), &CancellationToken::new())
            .unwrap();

        assert_eq!(fx.fetcher.calls(), 1);
        assert_eq!(fs::read(&resolved).unwrap(), b"ok fresh copy");
    }

    #[test]
    fn local_file_locator_skips_network() {
        let fx = fixture(CountingFetcher::serving(b"ok"));
        let temp = tempfile::tempdir().unwrap();
        let source = temp.path().join("on-disk.pdf");
        fs::write(&source, b"ok local bytes").unwrap();
        let loc = Locator(format!("file://{}", source.display()));

        let resolved = fx
            .pipeline
            .resolve(Some(&note("n4")), Some(&loc), &CancellationToken::new())
            .unwrap();

        assert_eq!(fx.fetcher.calls(), 0);
        assert_eq!(fs::read(&resolved).unwrap(), b"ok local bytes");
        // The adopted copy is now indexed under the id as well.
        assert_eq!(fx.pipeline.paths.get(&note("n4")), Some(resolved));
    }

    #[test]
    fn invalid_download_is_not_cached() {
        let fx = fixture(CountingFetcher::serving(b"not a document"));
        let loc = remote("n5.pdf");

        let err = fx
            .pipeline
            .resolve(None, Some(&loc), &CancellationToken::new())
            .unwrap_err();

        assert!(matches!(err, ResolveError::InvalidDocument(_)));
        assert!(!fx.pipeline.blobs.contains(&loc));
    }

    #[test]
    fn transport_failure_surfaces_as_retryable() {
        let fx = fixture(CountingFetcher::failing());
        let err = fx
            .pipeline
            .resolve(None, Some(&remote("n6.pdf")), &CancellationToken::new())
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn pre_cancelled_token_stops_before_network() {
        let fx = fixture(CountingFetcher::serving(b"ok"));
        let token = CancellationToken::new();
        token.cancel();

        let err = fx
            .pipeline
            .resolve(Some(&note("n7")), Some(&remote("n7.pdf")), &token)
            .unwrap_err();

        assert!(matches!(err, ResolveError::Cancelled));
        assert_eq!(fx.fetcher.calls(), 0);
    }
}
