//! NoteShelf background worker pool.
//!
//! All network fetches, disk copies and cover renders run here, off the
//! coordination context. Tasks are plain closures submitted into one of
//! three priority lanes (interactive resolution, list enrichment,
//! speculative prefetch) and receive a cancellation token they are expected
//! to check cooperatively.
//!
//! # Example
//!
//! ```
//! use noteshelf_scheduler::{TaskPriority, WorkerPool, WorkerPoolConfig};
//!
//! let pool = WorkerPool::new(WorkerPoolConfig::new(2));
//!
//! let token = pool.submit(TaskPriority::Enrich, |token| {
//!     if token.is_cancelled() {
//!         return;
//!     }
//!     // ... fetch metadata, render a cover ...
//! });
//!
//! // Tear down the owning view: the task sees the cancellation.
//! token.cancel();
//! pool.shutdown();
//! ```

mod cancel;
mod worker;

pub use cancel::CancellationToken;
pub use worker::{TaskPriority, WorkerPool, WorkerPoolConfig};
