//! SQLite-backed document collection.
//!
//! One table per collection, one JSON document per row:
//!
//! ```sql
//! CREATE TABLE "<collection>" (id TEXT PRIMARY KEY NOT NULL, doc TEXT NOT NULL)
//! ```
//!
//! Indexes are expression indexes over `json_extract(doc, '$.<field>')`, so a
//! unique index is enforced by SQLite itself.

use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Transaction, params};
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::{debug, info, warn};

use super::{
    Applied, BulkWriteResult, Document, DocumentStore, IndexSpec, StoreError, WriteError,
    WriteErrorKind, document_id, is_plain_field, merge_set,
};

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    table: String,
    location: Option<PathBuf>,
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore")
            .field("table", &self.table)
            .field("location", &self.location)
            .finish()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path` and make sure `collection`
    /// exists. Parent directories are created as needed.
    pub fn open(path: &Path, collection: &str) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                StoreError::Unavailable(format!(
                    "failed to create database directory {}: {err}",
                    parent.display()
                ))
            })?;
        }

        let conn = Connection::open(path)?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            warn!("failed to enable WAL mode: {err}");
        }
        info!(path = %path.display(), collection, "opened document store");

        Self::with_connection(conn, collection, Some(path.to_path_buf()))
    }

    pub fn open_in_memory(collection: &str) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, collection, None)
    }

    fn with_connection(
        conn: Connection,
        collection: &str,
        location: Option<PathBuf>,
    ) -> Result<Self, StoreError> {
        if !is_plain_field(collection) {
            return Err(StoreError::Unavailable(format!(
                "invalid collection name '{collection}'"
            )));
        }

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{collection}\" (
                 id  TEXT PRIMARY KEY NOT NULL,
                 doc TEXT NOT NULL
             )"
        ))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: collection.to_string(),
            location,
        })
    }

    /// Run `task` on the blocking pool with exclusive access to the connection.
    async fn execute<F, T>(&self, task: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection, &str) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let table = self.table.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = match conn.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            task(&mut guard, &table)
        })
        .await
        .map_err(|err| StoreError::Unavailable(format!("database task failed: {err}")))?
    }
}

fn index_sql(table: &str, index: &IndexSpec) -> Result<String, StoreError> {
    if index.keys.is_empty() || !index.keys.iter().all(|k| is_plain_field(k)) {
        return Err(StoreError::InvalidIndex(index.name.clone()));
    }
    if !is_plain_field(&index.name) {
        return Err(StoreError::InvalidIndex(index.name.clone()));
    }

    let columns = index
        .keys
        .iter()
        .map(|k| format!("json_extract(doc, '$.{k}')"))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        "CREATE {unique}INDEX \"{table}_{name}\" ON \"{table}\" ({columns})",
        unique = if index.unique { "UNIQUE " } else { "" },
        name = index.name,
    ))
}

fn upsert_one(
    tx: &Transaction<'_>,
    table: &str,
    index: usize,
    doc: Document,
) -> Result<Applied, WriteError> {
    let id = document_id(index, &doc)?;
    let fail = |kind: WriteErrorKind, message: String| WriteError {
        index,
        id: Some(id.clone()),
        kind,
        message,
    };

    let existing: Option<String> = tx
        .query_row(
            &format!("SELECT doc FROM \"{table}\" WHERE id = ?1"),
            params![id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| fail(WriteErrorKind::Backend, err.to_string()))?;

    let (candidate, applied) = match existing {
        Some(raw) => {
            let stored: Document = serde_json::from_str(&raw).map_err(|err| {
                fail(WriteErrorKind::Backend, format!("stored document is corrupt: {err}"))
            })?;
            let merged = merge_set(&stored, doc);
            if merged == stored {
                return Ok(Applied::Unchanged);
            }
            (merged, Applied::Modified)
        }
        None => (doc, Applied::Inserted),
    };

    let body = serde_json::to_string(&candidate)
        .map_err(|err| fail(WriteErrorKind::InvalidDocument, err.to_string()))?;

    let sql = match applied {
        Applied::Inserted => format!("INSERT INTO \"{table}\" (id, doc) VALUES (?1, ?2)"),
        _ => format!("UPDATE \"{table}\" SET doc = ?2 WHERE id = ?1"),
    };

    tx.execute(&sql, params![id, body]).map_err(|err| {
        let kind = match err.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => WriteErrorKind::DuplicateKey,
            _ => WriteErrorKind::Backend,
        };
        fail(kind, err.to_string())
    })?;

    Ok(applied)
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn create_index(&self, index: IndexSpec) -> Result<(), StoreError> {
        self.execute(move |conn, table| {
            let sql = index_sql(table, &index)?;
            match conn.execute_batch(&sql) {
                Ok(()) => {
                    debug!(index = %index.name, "created index");
                    Ok(())
                }
                Err(err) if err.to_string().contains("already exists") => {
                    Err(StoreError::IndexExists(index.name))
                }
                Err(err) => Err(err.into()),
            }
        })
        .await
    }

    async fn bulk_upsert(&self, docs: Vec<Document>) -> Result<BulkWriteResult, StoreError> {
        self.execute(move |conn, table| {
            let tx = conn.transaction()?;
            let mut result = BulkWriteResult::default();

            // A failed statement only rolls back itself, the rest of the
            // transaction carries on.
            for (index, doc) in docs.into_iter().enumerate() {
                result.record(upsert_one(&tx, table, index, doc));
            }

            tx.commit()?;
            Ok(result)
        })
        .await
    }

    async fn find_updated_since(&self, since: &str) -> Result<Vec<Document>, StoreError> {
        let since = since.to_string();

        self.execute(move |conn, table| {
            let mut stmt = conn.prepare(&format!(
                "SELECT doc FROM \"{table}\"
                 WHERE json_extract(doc, '$.updated_at') >= ?1
                 ORDER BY json_extract(doc, '$.updated_at')"
            ))?;

            let raw = stmt
                .query_map(params![since], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            raw.iter()
                .map(|body| serde_json::from_str::<Document>(body).map_err(StoreError::from))
                .collect()
        })
        .await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.execute(|conn, table| {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))?;
            Ok(usize::try_from(n).unwrap_or_default())
        })
        .await
    }
}
