//! Concurrent per-item metadata enrichment.
//!
//! Listing returns lean records; the byte size and cover thumbnail for each
//! item are fetched afterwards, in the background. Every item fans out into
//! two sub-fetches that run as separate pool tasks and are joined before the
//! item is reported ready, so a list row updates exactly once per pass.
//!
//! A shared in-flight set keyed by the item's cache key deduplicates
//! overlapping passes: re-listing while enrichment is still running does not
//! double-fetch.

use crate::resolve::ResolutionPipeline;
use doc_model::DocumentDescriptor;
use noteshelf_cache::{Thumbnail, ThumbnailMemoCache};
use noteshelf_net::SizeProbe;
use noteshelf_scheduler::{TaskPriority, WorkerPool};
use pdf_engine::{DocumentRenderer, ThumbSize};
use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

/// One enriched descriptor, tagged with its position in the submitted batch.
#[derive(Debug, Clone)]
pub struct EnrichedItem {
    pub index: usize,
    pub descriptor: DocumentDescriptor,
}

struct JoinState {
    index: usize,
    descriptor: DocumentDescriptor,
    remaining: u8,
}

#[derive(Clone)]
pub struct EnrichmentCoordinator {
    pool: Arc<WorkerPool>,
    pipeline: Arc<ResolutionPipeline>,
    renderer: Arc<dyn DocumentRenderer>,
    sizer: Arc<dyn SizeProbe>,
    thumbs: ThumbnailMemoCache,
    in_flight: Arc<Mutex<HashSet<String>>>,
    thumb_size: ThumbSize,
}

impl EnrichmentCoordinator {
    pub fn new(
        pool: Arc<WorkerPool>,
        pipeline: Arc<ResolutionPipeline>,
        renderer: Arc<dyn DocumentRenderer>,
        sizer: Arc<dyn SizeProbe>,
        thumbs: ThumbnailMemoCache,
    ) -> Self {
        Self {
            pool,
            pipeline,
            renderer,
            sizer,
            thumbs,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            thumb_size: ThumbSize::default(),
        }
    }

    pub fn with_thumb_size(mut self, size: ThumbSize) -> Self {
        self.thumb_size = size;
        self
    }

    pub fn thumbnails(&self) -> &ThumbnailMemoCache {
        &self.thumbs
    }

    /// Enrich a batch of descriptors on the pool at the given priority.
    ///
    /// Each descriptor is sent back on the returned channel exactly once,
    /// after both of its sub-fetches have finished (successfully or not).
    /// Items already fully enriched echo back immediately; items whose cache
    /// key is currently in flight from an earlier pass are skipped.
    pub fn enrich(
        &self,
        batch: Vec<DocumentDescriptor>,
        priority: TaskPriority,
    ) -> mpsc::Receiver<EnrichedItem> {
        let (sender, receiver) = mpsc::channel();

        for (index, mut descriptor) in batch.into_iter().enumerate() {
            let key = descriptor.cache_key();

            // A thumbnail key is only as good as the cache behind it: after
            // eviction the image must be re-rendered, not echoed.
            let thumbnail_warm = descriptor
                .thumbnail_key
                .as_deref()
                .is_some_and(|k| self.thumbs.contains(k));
            if descriptor.byte_size.is_some() && thumbnail_warm {
                descriptor.thumbnail_loading = false;
                let _ = sender.send(EnrichedItem { index, descriptor });
                continue;
            }

            {
                let mut in_flight = self.in_flight.lock().unwrap();
                if !in_flight.insert(key.clone()) {
                    log::debug!("enrichment for {key} already in flight, skipping");
                    continue;
                }
            }

            descriptor.thumbnail_loading = true;
            let join = Arc::new(Mutex::new(JoinState { index, descriptor, remaining: 2 }));

            self.spawn_size_fetch(priority, key.clone(), join.clone(), sender.clone());
            self.spawn_thumbnail_fetch(priority, key, join, sender.clone());
        }

        receiver
    }

    fn spawn_size_fetch(
        &self,
        priority: TaskPriority,
        key: String,
        join: Arc<Mutex<JoinState>>,
        sender: mpsc::Sender<EnrichedItem>,
    ) {
        let sizer = self.sizer.clone();
        let in_flight = self.in_flight.clone();
        let locator = join.lock().unwrap().descriptor.locator.clone();

        self.pool.submit(priority, move |_token| {
            let size = match &locator {
                Some(locator) => match sizer.byte_size(locator) {
                    Ok(size) => Some(size),
                    Err(e) => {
                        log::warn!("size fetch for {key} failed: {e}");
                        None
                    }
                },
                None => None,
            };

            let mut state = join.lock().unwrap();
            if let Some(size) = size {
                state.descriptor.byte_size = Some(size);
            }
            Self::arm_done(&mut state, &key, &in_flight, &sender);
        });
    }

    fn spawn_thumbnail_fetch(
        &self,
        priority: TaskPriority,
        key: String,
        join: Arc<Mutex<JoinState>>,
        sender: mpsc::Sender<EnrichedItem>,
    ) {
        let pipeline = self.pipeline.clone();
        let renderer = self.renderer.clone();
        let thumbs = self.thumbs.clone();
        let in_flight = self.in_flight.clone();
        let thumb_size = self.thumb_size;
        let (id, locator, cached_pages) = {
            let state = join.lock().unwrap();
            (
                state.descriptor.id.clone(),
                state.descriptor.locator.clone(),
                state.descriptor.page_count,
            )
        };

        self.pool.submit(priority, move |token| {
            // A warm thumbnail with a known page count needs no document
            // access at all.
            if cached_pages.is_some() && thumbs.contains(&key) {
                let mut state = join.lock().unwrap();
                state.descriptor.thumbnail_key = Some(key.clone());
                Self::arm_done(&mut state, &key, &in_flight, &sender);
                return;
            }

            let rendered = pipeline
                .resolve(id.as_ref(), locator.as_ref(), token)
                .and_then(|path| {
                    let opened = renderer.open(&path).map_err(crate::ResolveError::InvalidDocument)?;
                    let cover = renderer
                        .render_cover(&path, thumb_size)
                        .map_err(crate::ResolveError::InvalidDocument)?;
                    Ok((opened.page_count, cover))
                });

            let mut state = join.lock().unwrap();
            match rendered {
                Ok((page_count, cover)) => {
                    let (width, height) = (cover.width(), cover.height());
                    thumbs.put(Thumbnail::new(key.clone(), cover.into_raw(), width, height));
                    state.descriptor.page_count = Some(page_count);
                    state.descriptor.thumbnail_key = Some(key.clone());
                }
                Err(e) => {
                    log::warn!("thumbnail fetch for {key} failed: {e}");
                }
            }
            Self::arm_done(&mut state, &key, &in_flight, &sender);
        });
    }

    /// Called by each arm as it finishes; the last one out emits the item.
    fn arm_done(
        state: &mut JoinState,
        key: &str,
        in_flight: &Mutex<HashSet<String>>,
        sender: &mpsc::Sender<EnrichedItem>,
    ) {
        state.remaining -= 1;
        if state.remaining > 0 {
            return;
        }

        in_flight.lock().unwrap().remove(key);
        state.descriptor.thumbnail_loading = false;
        // Batch order is not preserved across the pool; the index says where
        // the item belongs.
        let item = EnrichedItem { index: state.index, descriptor: state.descriptor.clone() };
        if sender.send(item).is_err() {
            log::debug!("enrichment result for {key} dropped, receiver gone");
        }
    }
}
