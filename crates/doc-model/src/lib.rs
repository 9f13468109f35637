use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Sentinel substituted for missing subject fields on sparse records.
pub const UNKNOWN_SUBJECT: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NoteId(pub String);

impl NoteId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Opaque remote reference to a blob: a URL or a storage path convention.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator(pub String);

impl Locator {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable 64-bit key for content-addressed storage of this locator.
    pub fn hash_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.0.hash(&mut hasher);
        hasher.finish()
    }

    /// Last path segment without extension, used as a display-name fallback.
    pub fn file_stem(&self) -> Option<&str> {
        let tail = self.0.rsplit(['/', '\\']).next()?;
        let stem = tail.split('?').next().unwrap_or(tail);
        let stem = stem.strip_suffix(".pdf").unwrap_or(stem);
        if stem.is_empty() {
            None
        } else {
            Some(stem)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Public
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Newest uploads first. The stable sort key for paging.
    UploadedDesc,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::UploadedDesc
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionFilter {
    pub subject_code: Option<String>,
    pub visibility: Option<Visibility>,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub filter: CollectionFilter,
    pub order: SortOrder,
    pub cursor: Option<String>,
    pub limit: usize,
}

/// Raw metadata record as the remote collection returns it.
///
/// The backing store is schemaless; every field may be absent. Conversion to
/// a [`DocumentDescriptor`] applies the documented default substitutions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub locator: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub subject_name: Option<String>,
    #[serde(default)]
    pub subject_code: Option<String>,
    #[serde(default)]
    pub byte_size: Option<u64>,
    #[serde(default)]
    pub uploaded_at: Option<u64>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryPage {
    pub items: Vec<NoteRecord>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// A list item as the UI binds to it.
///
/// `byte_size`, `page_count` and `thumbnail_key` stay `None` until enrichment
/// fills them in. The descriptor never owns thumbnail bytes; `thumbnail_key`
/// points into the thumbnail cache, which may evict at any time.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentDescriptor {
    pub id: Option<NoteId>,
    pub locator: Option<Locator>,
    pub display_name: String,
    pub subject_name: String,
    pub subject_code: String,
    pub byte_size: Option<u64>,
    /// Upload timestamp, unix milliseconds.
    pub uploaded_at: u64,
    pub visibility: Visibility,
    pub page_count: Option<u32>,
    pub thumbnail_key: Option<String>,
    /// True while an enrichment pass owns this item. Guards against a second
    /// concurrent enrichment for the same key.
    pub thumbnail_loading: bool,
}

impl DocumentDescriptor {
    pub fn from_record(record: NoteRecord) -> Self {
        let locator = record.locator.map(Locator);
        let display_name = record
            .display_name
            .filter(|name| !name.trim().is_empty())
            .or_else(|| {
                locator
                    .as_ref()
                    .and_then(|loc| loc.file_stem())
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| "Untitled".to_owned());

        Self {
            id: record.id.map(NoteId),
            locator,
            display_name,
            subject_name: record
                .subject_name
                .unwrap_or_else(|| UNKNOWN_SUBJECT.to_owned()),
            subject_code: record
                .subject_code
                .unwrap_or_else(|| UNKNOWN_SUBJECT.to_owned()),
            byte_size: record.byte_size,
            uploaded_at: record.uploaded_at.unwrap_or(0),
            visibility: record.visibility.unwrap_or_default(),
            page_count: None,
            thumbnail_key: None,
            thumbnail_loading: false,
        }
    }

    /// Stable per-item key: the identifier when present, otherwise the
    /// locator hash. Used for enrichment dedup and thumbnail addressing.
    pub fn cache_key(&self) -> String {
        if let Some(id) = &self.id {
            return format!("id:{}", id.as_str());
        }
        if let Some(locator) = &self.locator {
            return format!("loc:{:016x}", locator.hash_key());
        }

        let mut hasher = DefaultHasher::new();
        self.display_name.hash(&mut hasher);
        self.uploaded_at.hash(&mut hasher);
        format!("adhoc:{:016x}", hasher.finish())
    }

    /// Substring match over the name/subject fields, case-insensitive.
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.display_name.to_lowercase().contains(&query)
            || self.subject_name.to_lowercase().contains(&query)
            || self.subject_code.to_lowercase().contains(&query)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentEntry {
    pub id: String,
    pub title: String,
    pub locator: Option<String>,
    /// Unix milliseconds.
    pub last_opened_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_record_gets_default_substitutions() {
        let record = NoteRecord {
            locator: Some("https://blobs.example/notes/calc-2-week-3.pdf".to_owned()),
            ..NoteRecord::default()
        };

        let descriptor = DocumentDescriptor::from_record(record);
        assert_eq!(descriptor.display_name, "calc-2-week-3");
        assert_eq!(descriptor.subject_name, UNKNOWN_SUBJECT);
        assert_eq!(descriptor.subject_code, UNKNOWN_SUBJECT);
        assert_eq!(descriptor.visibility, Visibility::Public);
        assert_eq!(descriptor.byte_size, None);
        assert_eq!(descriptor.page_count, None);
    }

    #[test]
    fn record_with_no_name_or_locator_is_untitled() {
        let descriptor = DocumentDescriptor::from_record(NoteRecord::default());
        assert_eq!(descriptor.display_name, "Untitled");
    }

    #[test]
    fn cache_key_prefers_id_over_locator() {
        let record = NoteRecord {
            id: Some("note-42".to_owned()),
            locator: Some("https://blobs.example/a.pdf".to_owned()),
            ..NoteRecord::default()
        };

        let descriptor = DocumentDescriptor::from_record(record);
        assert_eq!(descriptor.cache_key(), "id:note-42");
    }

    #[test]
    fn cache_key_is_stable_for_same_locator() {
        let make = |name: &str| {
            DocumentDescriptor::from_record(NoteRecord {
                locator: Some("https://blobs.example/b.pdf".to_owned()),
                display_name: Some(name.to_owned()),
                ..NoteRecord::default()
            })
        };

        assert_eq!(make("first").cache_key(), make("second").cache_key());
    }

    #[test]
    fn locator_file_stem_strips_query_and_extension() {
        let locator = Locator("https://blobs.example/x/linear-algebra.pdf?sig=abc".to_owned());
        assert_eq!(locator.file_stem(), Some("linear-algebra"));
    }

    #[test]
    fn matches_query_checks_name_and_subject_fields() {
        let descriptor = DocumentDescriptor::from_record(NoteRecord {
            display_name: Some("Week 3 Integrals".to_owned()),
            subject_name: Some("Calculus II".to_owned()),
            subject_code: Some("MATH-201".to_owned()),
            ..NoteRecord::default()
        });

        assert!(descriptor.matches_query("integrals"));
        assert!(descriptor.matches_query("calculus"));
        assert!(descriptor.matches_query("math-201"));
        assert!(descriptor.matches_query(""));
        assert!(!descriptor.matches_query("biology"));
    }

    #[test]
    fn note_record_round_trips_through_json() {
        let record = NoteRecord {
            id: Some("note-1".to_owned()),
            locator: Some("https://blobs.example/n1.pdf".to_owned()),
            display_name: Some("Notes".to_owned()),
            subject_name: Some("Physics".to_owned()),
            subject_code: Some("PHYS-101".to_owned()),
            byte_size: Some(12_345),
            uploaded_at: Some(1_700_000_000_000),
            visibility: Some(Visibility::Private),
            owner: Some("ada".to_owned()),
        };

        let json = serde_json::to_string(&record).unwrap();
        let parsed: NoteRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn note_record_tolerates_missing_fields_in_json() {
        let parsed: NoteRecord = serde_json::from_str(r#"{"id":"n"}"#).unwrap();
        assert_eq!(parsed.id.as_deref(), Some("n"));
        assert_eq!(parsed.locator, None);
        assert_eq!(parsed.visibility, None);
    }
}
