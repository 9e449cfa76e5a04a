//! Document storage seam.
//!
//! A store holds one collection of JSON documents keyed by their `id` field.
//! Writes are unordered upserts: each document succeeds or fails on its own,
//! and only a failure of the store as a whole surfaces as `Err`.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt::{self, Debug};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type Document = Map<String, Value>;

/// Field every document is keyed by.
pub const ID_FIELD: &str = "id";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("index '{0}' already exists")]
    IndexExists(String),

    #[error("invalid index definition: {0}")]
    InvalidIndex(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("document encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Ascending index over one or more top-level document fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub keys: Vec<String>,
    pub unique: bool,
}

impl IndexSpec {
    /// Name derived from the keys, `city_1_dt_1` style.
    pub fn ascending(keys: &[&str], unique: bool) -> Self {
        let name = keys.iter().map(|k| format!("{k}_1")).collect::<Vec<_>>().join("_");
        Self {
            name,
            keys: keys.iter().map(|k| (*k).to_string()).collect(),
            unique,
        }
    }

    /// The key tuple of `doc`, or `None` if any key is missing or null.
    pub(crate) fn key_of(&self, doc: &Document) -> Option<Vec<Value>> {
        self.keys
            .iter()
            .map(|k| doc.get(k).filter(|v| !v.is_null()).cloned())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteErrorKind {
    /// A unique index already holds the document's key under another id.
    DuplicateKey,
    /// The document has no usable `id`.
    InvalidDocument,
    /// Any other per-document failure reported by the backend.
    Backend,
}

impl fmt::Display for WriteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteErrorKind::DuplicateKey => "duplicate key",
            WriteErrorKind::InvalidDocument => "invalid document",
            WriteErrorKind::Backend => "backend error",
        })
    }
}

/// Failure of one document inside a bulk write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteError {
    /// Position of the document in the submitted batch.
    pub index: usize,
    pub id: Option<String>,
    pub kind: WriteErrorKind,
    pub message: String,
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} ({}): {}: {}",
            self.index,
            self.id.as_deref().unwrap_or("<no id>"),
            self.kind,
            self.message
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    /// Documents inserted under a new id.
    pub upserted: usize,
    /// Existing documents whose stored content changed.
    pub modified: usize,
    /// Existing documents that already held exactly this content.
    pub unchanged: usize,
    pub write_errors: Vec<WriteError>,
}

/// Per-document outcome shared by the backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Applied {
    Inserted,
    Modified,
    Unchanged,
}

impl BulkWriteResult {
    pub(crate) fn record(&mut self, outcome: Result<Applied, WriteError>) {
        match outcome {
            Ok(Applied::Inserted) => self.upserted += 1,
            Ok(Applied::Modified) => self.modified += 1,
            Ok(Applied::Unchanged) => self.unchanged += 1,
            Err(err) => self.write_errors.push(err),
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync + Debug {
    /// Create an index; `StoreError::IndexExists` if the name is taken.
    async fn create_index(&self, index: IndexSpec) -> Result<(), StoreError>;

    /// Unordered upsert keyed by `id`. Fields of each document overwrite the
    /// stored ones; stored fields the document lacks are kept.
    async fn bulk_upsert(&self, docs: Vec<Document>) -> Result<BulkWriteResult, StoreError>;

    /// Documents whose `updated_at` is at or after `since`, oldest first.
    async fn find_updated_since(&self, since: &str) -> Result<Vec<Document>, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}

/// `$set`-style merge of `update` into `existing`.
pub(crate) fn merge_set(existing: &Document, update: Document) -> Document {
    let mut merged = existing.clone();
    merged.extend(update);
    merged
}

/// The `id` of `doc`, or the write error describing why it has none.
pub(crate) fn document_id(index: usize, doc: &Document) -> Result<String, WriteError> {
    match doc.get(ID_FIELD) {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        _ => Err(WriteError {
            index,
            id: None,
            kind: WriteErrorKind::InvalidDocument,
            message: format!("document has no string '{ID_FIELD}' field"),
        }),
    }
}

/// Top-level field names usable in index definitions and queries.
pub(crate) fn is_plain_field(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn ascending_index_name() {
        let idx = IndexSpec::ascending(&["city", "dt"], true);
        assert_eq!(idx.name, "city_1_dt_1");
        assert_eq!(idx.keys, vec!["city".to_string(), "dt".to_string()]);
        assert!(idx.unique);
    }

    #[test]
    fn key_of_requires_every_field() {
        let idx = IndexSpec::ascending(&["city", "dt"], true);
        assert_eq!(
            idx.key_of(&doc(json!({ "city": "Austin", "dt": "T" }))),
            Some(vec![json!("Austin"), json!("T")])
        );
        assert_eq!(idx.key_of(&doc(json!({ "city": "Austin" }))), None);
        assert_eq!(idx.key_of(&doc(json!({ "city": "Austin", "dt": null }))), None);
    }

    #[test]
    fn merge_overwrites_and_keeps_extra_fields() {
        let existing = doc(json!({ "id": "a", "temp_c": 1.0, "legacy": true }));
        let merged = merge_set(&existing, doc(json!({ "id": "a", "temp_c": 2.0 })));
        assert_eq!(merged, doc(json!({ "id": "a", "temp_c": 2.0, "legacy": true })));
    }

    #[test]
    fn document_id_rejects_missing_or_non_string() {
        assert_eq!(document_id(0, &doc(json!({ "id": "a" }))), Ok("a".to_string()));

        let err = document_id(3, &doc(json!({ "id": 7 }))).unwrap_err();
        assert_eq!(err.index, 3);
        assert_eq!(err.kind, WriteErrorKind::InvalidDocument);
        assert!(document_id(0, &doc(json!({}))).is_err());
    }

    #[test]
    fn plain_field_names() {
        assert!(is_plain_field("updated_at"));
        assert!(is_plain_field("_id"));
        assert!(!is_plain_field("1dt"));
        assert!(!is_plain_field("dt'); DROP TABLE weather; --"));
        assert!(!is_plain_field(""));
    }
}
