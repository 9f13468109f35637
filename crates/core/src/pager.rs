//! Cursor-paged listing with scroll-driven prefetch.
//!
//! [`PagerState`] is the pure state machine: it decides when a fetch may
//! start, applies completed pages, and discards completions that belong to a
//! superseded listing (filter change, refresh) via a generation counter.
//! [`PaginatedLister`] drives it against a [`NoteCollection`] on the worker
//! pool and streams [`ListerEvent`]s to the caller.

use crate::enrich::EnrichmentCoordinator;
use doc_model::{CollectionFilter, DocumentDescriptor, QueryPage, QueryRequest, SortOrder};
use noteshelf_net::NoteCollection;
use noteshelf_scheduler::{TaskPriority, WorkerPool};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy)]
pub struct PagerConfig {
    /// Items requested per page.
    pub page_size: usize,
    /// Start fetching the next page when fewer than this many unseen items
    /// remain below the viewport.
    pub fetch_threshold: usize,
    /// How many items past the viewport get speculative thumbnail warm-up
    /// on scroll, independent of page fetching.
    pub lookahead: usize,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self { page_size: 15, fetch_threshold: 5, lookahead: 10 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Idle,
    Fetching,
    Exhausted,
    Failed,
}

/// Permission to run one page fetch, carrying the request parameters and the
/// generation the completion must present to be accepted.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    pub generation: u64,
    pub cursor: Option<String>,
    pub limit: usize,
}

pub struct PagerState {
    items: Vec<DocumentDescriptor>,
    cursor: Option<String>,
    phase: FetchPhase,
    generation: u64,
    config: PagerConfig,
}

impl PagerState {
    pub fn new(config: PagerConfig) -> Self {
        Self {
            items: Vec::new(),
            cursor: None,
            phase: FetchPhase::Idle,
            generation: 0,
            config,
        }
    }

    pub fn items(&self) -> &[DocumentDescriptor] {
        &self.items
    }

    pub fn phase(&self) -> FetchPhase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Claim the right to fetch the next page. At most one fetch is in
    /// flight per listing; further claims return `None` until the current
    /// one completes.
    pub fn begin_fetch(&mut self) -> Option<FetchTicket> {
        match self.phase {
            FetchPhase::Idle => {
                self.phase = FetchPhase::Fetching;
                Some(FetchTicket {
                    generation: self.generation,
                    cursor: self.cursor.clone(),
                    limit: self.config.page_size,
                })
            }
            FetchPhase::Fetching | FetchPhase::Exhausted | FetchPhase::Failed => None,
        }
    }

    /// Apply a completed page. Returns the appended range `(start, count)`,
    /// or `None` when the completion is stale and was discarded.
    pub fn complete_fetch(&mut self, generation: u64, page: QueryPage) -> Option<(usize, usize)> {
        if generation != self.generation {
            log::debug!(
                "discarding page for generation {generation}, listing is at {}",
                self.generation
            );
            return None;
        }

        let start = self.items.len();
        let count = page.items.len();
        self.items
            .extend(page.items.into_iter().map(DocumentDescriptor::from_record));
        self.cursor = page.next_cursor;
        // A short page means the collection ran out even when it claims
        // otherwise; trusting has_more alone could loop on short pages.
        self.phase = if page.has_more && count >= self.config.page_size {
            FetchPhase::Idle
        } else {
            FetchPhase::Exhausted
        };
        Some((start, count))
    }

    /// Record a failed fetch. Stale failures are ignored like stale pages.
    pub fn fail_fetch(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        self.phase = FetchPhase::Failed;
        true
    }

    /// Leave the `Failed` phase so the next scroll or explicit reload can
    /// fetch again. Already-loaded items are kept.
    pub fn retry(&mut self) {
        if self.phase == FetchPhase::Failed {
            self.phase = FetchPhase::Idle;
        }
    }

    /// Drop everything and start a new listing generation. In-flight
    /// completions from the old generation will be discarded on arrival.
    pub fn reset(&mut self) {
        self.items.clear();
        self.cursor = None;
        self.phase = FetchPhase::Idle;
        self.generation += 1;
    }

    /// Whether scrolling to `last_visible_index` should trigger a fetch.
    pub fn should_fetch_at(&self, last_visible_index: usize) -> bool {
        if self.phase != FetchPhase::Idle {
            return false;
        }
        let below_viewport = self.items.len().saturating_sub(last_visible_index + 1);
        below_viewport <= self.config.fetch_threshold
    }

    /// Items just past the viewport that qualify for speculative warm-up.
    pub fn lookahead_slice(&self, last_visible_index: usize) -> Vec<DocumentDescriptor> {
        let start = (last_visible_index + 1).min(self.items.len());
        let end = (start + self.config.lookahead).min(self.items.len());
        self.items[start..end].to_vec()
    }

    /// Accumulated items whose metadata matches `query`, preserving order.
    /// Purely a view: the cursor and fetch phase are untouched.
    pub fn filtered_items(&self, query: &str) -> Vec<DocumentDescriptor> {
        self.items
            .iter()
            .filter(|item| item.matches_query(query))
            .cloned()
            .collect()
    }

    /// Replace the stored descriptor matching `updated`'s cache key, if the
    /// item is still part of this listing. Returns its index.
    pub fn apply_enrichment(&mut self, updated: DocumentDescriptor) -> Option<usize> {
        let key = updated.cache_key();
        let index = self.items.iter().position(|item| item.cache_key() == key)?;
        self.items[index] = updated;
        Some(index)
    }
}

#[derive(Debug, Clone)]
pub enum ListerEvent {
    /// `count` items were appended starting at `start`.
    PageLoaded { start: usize, count: usize },
    /// The item at `index` gained enrichment data.
    ItemUpdated { index: usize },
    /// A page fetch failed; call [`PaginatedLister::retry`] to allow another.
    FetchFailed { message: String },
    /// The collection has no further pages for this listing.
    Exhausted,
}

/// Drives a [`PagerState`] against the collection on the worker pool.
///
/// One lister per view; the note list, my-notes and the attachment picker
/// each construct their own with the appropriate filter.
#[derive(Clone)]
pub struct PaginatedLister {
    state: Arc<Mutex<PagerState>>,
    collection: Arc<dyn NoteCollection>,
    enricher: EnrichmentCoordinator,
    pool: Arc<WorkerPool>,
    filter: CollectionFilter,
    order: SortOrder,
    events: mpsc::Sender<ListerEvent>,
}

impl PaginatedLister {
    pub fn new(
        collection: Arc<dyn NoteCollection>,
        enricher: EnrichmentCoordinator,
        pool: Arc<WorkerPool>,
        config: PagerConfig,
        filter: CollectionFilter,
    ) -> (Self, mpsc::Receiver<ListerEvent>) {
        let (events, receiver) = mpsc::channel();
        let lister = Self {
            state: Arc::new(Mutex::new(PagerState::new(config))),
            collection,
            enricher,
            pool,
            filter,
            order: SortOrder::UploadedDesc,
            events,
        };
        (lister, receiver)
    }

    /// Snapshot of the currently loaded items.
    pub fn items(&self) -> Vec<DocumentDescriptor> {
        self.state.lock().unwrap().items().to_vec()
    }

    pub fn phase(&self) -> FetchPhase {
        self.state.lock().unwrap().phase()
    }

    /// Discard loaded items and fetch the first page of a fresh listing.
    pub fn refresh(&self) {
        self.state.lock().unwrap().reset();
        self.request_next_page(TaskPriority::Interactive);
    }

    /// Report the last visible row. Items just past the viewport are
    /// submitted for speculative enrichment (re-warming evicted covers among
    /// them), and the next page is fetched when the viewport nears the end
    /// of the loaded range.
    pub fn notify_scroll(&self, last_visible_index: usize) {
        let (should_fetch, lookahead) = {
            let state = self.state.lock().unwrap();
            (
                state.should_fetch_at(last_visible_index),
                state.lookahead_slice(last_visible_index),
            )
        };

        if !lookahead.is_empty() {
            // Already-warm items echo back cheaply; in-flight ones are
            // skipped by the coordinator's dedup set.
            self.enrich_batch(lookahead, TaskPriority::Prefetch);
        }
        if should_fetch {
            self.request_next_page(TaskPriority::Prefetch);
        }
    }

    /// Accumulated items whose metadata matches `query`. A pure view over
    /// the loaded range; paging state is unaffected.
    pub fn filtered_items(&self, query: &str) -> Vec<DocumentDescriptor> {
        self.state.lock().unwrap().filtered_items(query)
    }

    /// Clear a failed fetch and try again.
    pub fn retry(&self) {
        self.state.lock().unwrap().retry();
        self.request_next_page(TaskPriority::Interactive);
    }

    /// Shrink the thumbnail cache under memory pressure, keeping only the
    /// covers for the given visible rows. An empty range evicts everything.
    pub fn relieve_memory_pressure(&self, visible: std::ops::Range<usize>) {
        let keys: Vec<String> = {
            let state = self.state.lock().unwrap();
            state
                .items()
                .get(visible)
                .unwrap_or(&[])
                .iter()
                .filter_map(|item| item.thumbnail_key.clone())
                .collect()
        };

        if keys.is_empty() {
            self.enricher.thumbnails().evict_all();
        } else {
            self.enricher.thumbnails().evict_except(&keys);
        }
    }

    fn request_next_page(&self, priority: TaskPriority) {
        let Some(ticket) = self.state.lock().unwrap().begin_fetch() else {
            return;
        };

        let lister = self.clone();
        self.pool.submit(priority, move |_token| {
            let request = QueryRequest {
                filter: lister.filter.clone(),
                order: lister.order,
                cursor: ticket.cursor.clone(),
                limit: ticket.limit,
            };

            match lister.collection.query(&request) {
                Ok(page) => lister.apply_page(ticket.generation, page),
                Err(e) => {
                    if lister.state.lock().unwrap().fail_fetch(ticket.generation) {
                        log::warn!("page fetch failed: {e}");
                        let _ = lister
                            .events
                            .send(ListerEvent::FetchFailed { message: e.to_string() });
                    }
                }
            }
        });
    }

    fn apply_page(&self, generation: u64, page: QueryPage) {
        let (start, count, batch, exhausted) = {
            let mut state = self.state.lock().unwrap();
            let Some((start, count)) = state.complete_fetch(generation, page) else {
                return;
            };
            let batch = state.items()[start..start + count].to_vec();
            (start, count, batch, state.phase() == FetchPhase::Exhausted)
        };

        let _ = self.events.send(ListerEvent::PageLoaded { start, count });
        if exhausted {
            let _ = self.events.send(ListerEvent::Exhausted);
        }
        if count > 0 {
            self.enrich_batch(batch, TaskPriority::Enrich);
        }
    }

    fn enrich_batch(&self, batch: Vec<DocumentDescriptor>, priority: TaskPriority) {
        let updates = self.enricher.enrich(batch, priority);
        let state = self.state.clone();
        let events = self.events.clone();

        // Drained on a plain thread: each update blocks on the channel, and
        // parking a pool worker on it would starve the enrichment arms.
        std::thread::spawn(move || {
            for update in updates {
                let applied = state.lock().unwrap().apply_enrichment(update.descriptor);
                if let Some(index) = applied {
                    let _ = events.send(ListerEvent::ItemUpdated { index });
                }
            }
        });
    }
}
