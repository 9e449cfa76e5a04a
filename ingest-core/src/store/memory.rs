use async_trait::async_trait;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use super::{
    Applied, BulkWriteResult, Document, DocumentStore, IndexSpec, StoreError, WriteError,
    WriteErrorKind, document_id, is_plain_field, merge_set,
};

/// In-process collection. Enforces unique indexes the same way the SQLite
/// backend does: documents missing any key field are not constrained.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    docs: BTreeMap<String, Document>,
    indexes: Vec<IndexSpec>,
    offline: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn index_names(&self) -> Vec<String> {
        self.lock().indexes.iter().map(|i| i.name.clone()).collect()
    }

    #[cfg(test)]
    pub(crate) fn get(&self, id: &str) -> Option<Document> {
        self.lock().docs.get(id).cloned()
    }

    /// Store `doc` as-is, bypassing indexes.
    #[cfg(test)]
    pub(crate) fn seed(&self, id: &str, doc: Document) {
        self.lock().docs.insert(id.to_string(), doc);
    }

    /// Make every subsequent call fail as if the store were unreachable.
    #[cfg(test)]
    pub(crate) fn go_offline(&self) {
        self.lock().offline = true;
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn checked(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        let guard = self.lock();
        if guard.offline {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        Ok(guard)
    }
}

impl MemoryState {
    fn upsert_one(&mut self, index: usize, doc: Document) -> Result<Applied, WriteError> {
        let id = document_id(index, &doc)?;

        let (candidate, existed) = match self.docs.get(&id) {
            Some(existing) => {
                let merged = merge_set(existing, doc);
                if &merged == existing {
                    return Ok(Applied::Unchanged);
                }
                (merged, true)
            }
            None => (doc, false),
        };

        if let Some(spec) = self.unique_conflict(&id, &candidate) {
            return Err(WriteError {
                index,
                id: Some(id),
                kind: WriteErrorKind::DuplicateKey,
                message: format!("unique index '{}' already holds this key", spec.name),
            });
        }

        self.docs.insert(id, candidate);
        Ok(if existed { Applied::Modified } else { Applied::Inserted })
    }

    fn unique_conflict(&self, id: &str, candidate: &Document) -> Option<&IndexSpec> {
        self.indexes.iter().filter(|spec| spec.unique).find(|spec| {
            let Some(key) = spec.key_of(candidate) else {
                return false;
            };
            self.docs.iter().any(|(other_id, other)| {
                other_id != id && spec.key_of(other).as_ref() == Some(&key)
            })
        })
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_index(&self, index: IndexSpec) -> Result<(), StoreError> {
        let mut state = self.checked()?;

        if index.keys.is_empty() || !index.keys.iter().all(|k| is_plain_field(k)) {
            return Err(StoreError::InvalidIndex(index.name));
        }
        if state.indexes.iter().any(|i| i.name == index.name) {
            return Err(StoreError::IndexExists(index.name));
        }
        if index.unique {
            let mut seen = Vec::new();
            for doc in state.docs.values() {
                if let Some(key) = index.key_of(doc) {
                    if seen.contains(&key) {
                        return Err(StoreError::InvalidIndex(format!(
                            "existing documents violate unique index '{}'",
                            index.name
                        )));
                    }
                    seen.push(key);
                }
            }
        }

        state.indexes.push(index);
        Ok(())
    }

    async fn bulk_upsert(&self, docs: Vec<Document>) -> Result<BulkWriteResult, StoreError> {
        let mut state = self.checked()?;
        let mut result = BulkWriteResult::default();

        for (index, doc) in docs.into_iter().enumerate() {
            let outcome = state.upsert_one(index, doc);
            result.record(outcome);
        }

        Ok(result)
    }

    async fn find_updated_since(&self, since: &str) -> Result<Vec<Document>, StoreError> {
        let state = self.checked()?;

        let mut found: Vec<Document> = state
            .docs
            .values()
            .filter(|d| {
                matches!(d.get("updated_at"), Some(Value::String(u)) if u.as_str() >= since)
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| updated_at(a).cmp(updated_at(b)));

        Ok(found)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.checked()?.docs.len())
    }
}

fn updated_at(doc: &Document) -> &str {
    doc.get("updated_at").and_then(Value::as_str).unwrap_or_default()
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

    #[tokio::test]
    async fn insert_modify_and_unchanged_are_counted_separately() {
        let store = MemoryStore::new();
        let first = store
            .bulk_upsert(vec![doc(json!({ "id": "a", "v": 1 })), doc(json!({ "id": "b", "v": 1 }))])
            .await
            .unwrap();
        assert_eq!(first.upserted, 2);

        let second = store
            .bulk_upsert(vec![doc(json!({ "id": "a", "v": 1 })), doc(json!({ "id": "b", "v": 2 }))])
            .await
            .unwrap();
        assert_eq!(second.upserted, 0);
        assert_eq!(second.modified, 1);
        assert_eq!(second.unchanged, 1);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn duplicate_index_name_is_reported() {
        let store = MemoryStore::new();
        let idx = IndexSpec::ascending(&["updated_at"], false);
        store.create_index(idx.clone()).await.unwrap();

        let err = store.create_index(idx).await.unwrap_err();
        assert!(matches!(err, StoreError::IndexExists(name) if name == "updated_at_1"));
    }

    #[tokio::test]
    async fn unique_index_rejects_only_the_offending_document() {
        let store = MemoryStore::new();
        store.create_index(IndexSpec::ascending(&["city", "dt"], true)).await.unwrap();
        store.seed("legacy", doc(json!({ "id": "legacy", "city": "Austin", "dt": "T1" })));

        let res = store
            .bulk_upsert(vec![
                doc(json!({ "id": "Austin|T1", "city": "Austin", "dt": "T1" })),
                doc(json!({ "id": "Austin|T2", "city": "Austin", "dt": "T2" })),
            ])
            .await
            .unwrap();

        assert_eq!(res.upserted, 1);
        assert_eq!(res.write_errors.len(), 1);
        assert_eq!(res.write_errors[0].index, 0);
        assert_eq!(res.write_errors[0].kind, WriteErrorKind::DuplicateKey);
        assert!(store.get("Austin|T2").is_some());
        assert!(store.get("Austin|T1").is_none());
    }

    #[tokio::test]
    async fn find_updated_since_is_ordered() {
        let store = MemoryStore::new();
        store
            .bulk_upsert(vec![
                doc(json!({ "id": "c", "updated_at": "2024-01-03" })),
                doc(json!({ "id": "a", "updated_at": "2024-01-01" })),
                doc(json!({ "id": "b", "updated_at": "2024-01-02" })),
            ])
            .await
            .unwrap();

        let found = store.find_updated_since("2024-01-02").await.unwrap();
        let ids: Vec<_> = found.iter().map(|d| d["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn offline_store_fails_whole_calls() {
        let store = MemoryStore::new();
        store.go_offline();
        let err = store.bulk_upsert(vec![doc(json!({ "id": "a" }))]).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
