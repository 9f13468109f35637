//! The remote note collection, seen through a trait seam.

use crate::NetError;
use doc_model::{NoteRecord, QueryPage, QueryRequest, SortOrder};
use std::sync::Mutex;

/// Cursor-paged metadata queries against the shared collection.
///
/// Implementations must page over a stable sort key so that consecutive
/// cursors never duplicate or skip records.
pub trait NoteCollection: Send + Sync {
    fn query(&self, request: &QueryRequest) -> Result<QueryPage, NetError>;
}

/// Collection backed by a local vector.
///
/// Reference implementation of the paging contract, used directly in tests
/// and for offline development. The cursor is the offset into the sorted,
/// filtered view, which is recomputed per query; stale cursors simply clamp.
pub struct InMemoryCollection {
    records: Mutex<Vec<NoteRecord>>,
}

impl InMemoryCollection {
    pub fn new(records: Vec<NoteRecord>) -> Self {
        Self { records: Mutex::new(records) }
    }

    pub fn push(&self, record: NoteRecord) {
        self.records.lock().unwrap().push(record);
    }

    fn parse_cursor(cursor: Option<&str>) -> Result<usize, NetError> {
        match cursor {
            None => Ok(0),
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| NetError::Transport(format!("malformed cursor '{raw}'"))),
        }
    }
}

impl NoteCollection for InMemoryCollection {
    fn query(&self, request: &QueryRequest) -> Result<QueryPage, NetError> {
        let records = self.records.lock().unwrap();

        let mut view: Vec<NoteRecord> = records
            .iter()
            .filter(|record| {
                let filter = &request.filter;
                if let Some(code) = &filter.subject_code {
                    if record.subject_code.as_deref() != Some(code.as_str()) {
                        return false;
                    }
                }
                if let Some(visibility) = filter.visibility {
                    if record.visibility.unwrap_or_default() != visibility {
                        return false;
                    }
                }
                if let Some(owner) = &filter.owner {
                    if record.owner.as_deref() != Some(owner.as_str()) {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        match request.order {
            SortOrder::UploadedDesc => {
                // Tie-break on id so paging stays stable for equal timestamps.
                view.sort_by(|a, b| {
                    b.uploaded_at
                        .unwrap_or(0)
                        .cmp(&a.uploaded_at.unwrap_or(0))
                        .then_with(|| a.id.cmp(&b.id))
                });
            }
        }

        let offset = Self::parse_cursor(request.cursor.as_deref())?.min(view.len());
        let limit = request.limit.max(1);
        let end = (offset + limit).min(view.len());

        let items = view[offset..end].to_vec();
        let has_more = end < view.len();
        let next_cursor = has_more.then(|| end.to_string());

        Ok(QueryPage { items, next_cursor, has_more })
    }
}
