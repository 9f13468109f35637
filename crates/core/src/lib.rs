//! NoteShelf pipeline core.
//!
//! Everything between the remote collection and the viewer lives here:
//!
//! - [`ResolutionPipeline`]: opaque reference -> validated local file,
//!   through the path cache, blob cache, local-file check and downloader.
//! - [`EnrichmentCoordinator`]: per-item fan-out of size and cover/page-count
//!   sub-fetches, joined before the item is reported ready.
//! - [`PaginatedLister`] / [`PagerState`]: cursor-paged listing with
//!   scroll-proximity fetch and speculative thumbnail warm-up.
//! - [`RecentlyOpenedTracker`]: bounded, persisted most-recently-opened list.
//!
//! The same pipeline backs the note list, the my-notes view and the
//! assistant's attachment picker; only the collection filter differs.

pub mod enrich;
pub mod error;
pub mod pager;
pub mod recent;
pub mod resolve;

pub use enrich::{EnrichedItem, EnrichmentCoordinator};
pub use error::ResolveError;
pub use pager::{FetchPhase, FetchTicket, ListerEvent, PagerConfig, PagerState, PaginatedLister};
pub use recent::{RecentlyOpenedTracker, MAX_RECENT};
pub use resolve::ResolutionPipeline;
