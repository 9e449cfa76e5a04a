use tracing::{debug, error, warn};

use crate::{
    model::CanonicalWeatherDocument,
    store::{Document, DocumentStore, IndexSpec, StoreError, WriteError, WriteErrorKind},
};

/// Collection the forecast documents live in unless configured otherwise.
pub const DEFAULT_COLLECTION: &str = "weather";

/// Indexes the weather collection relies on:
/// `updated_at` for incremental readers, and a unique `(city, dt)` that backs
/// the `city|dt` identity.
pub fn weather_indexes() -> [IndexSpec; 2] {
    [
        IndexSpec::ascending(&["updated_at"], false),
        IndexSpec::ascending(&["city", "dt"], true),
    ]
}

/// Create the weather indexes. Never fails: an existing index is fine, and
/// any other error is logged and ignored.
pub async fn ensure_indexes(store: &dyn DocumentStore) {
    for index in weather_indexes() {
        let name = index.name.clone();
        match store.create_index(index).await {
            Ok(()) => debug!(index = %name, "index created"),
            Err(StoreError::IndexExists(_)) => {}
            Err(err) => warn!(index = %name, error = %err, "creating index failed"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub upserted: usize,
    pub modified: usize,
    pub unchanged: usize,
    /// Documents the store refused; the rest of the batch was still applied.
    pub failures: Vec<WriteError>,
}

impl UpsertOutcome {
    /// Inserted plus modified documents.
    pub fn changed(&self) -> usize {
        self.upserted + self.modified
    }
}

/// Upsert `docs` by `id` in one unordered batch.
///
/// An empty batch never reaches the store. Per-document failures are logged
/// and returned in the outcome; only a whole-store failure is an `Err`.
pub async fn upsert_batch(
    store: &dyn DocumentStore,
    docs: &[CanonicalWeatherDocument],
) -> Result<UpsertOutcome, StoreError> {
    if docs.is_empty() {
        return Ok(UpsertOutcome::default());
    }

    let batch = docs.iter().map(to_document).collect::<Result<Vec<_>, _>>()?;
    let res = store.bulk_upsert(batch).await?;

    for failure in &res.write_errors {
        match failure.kind {
            WriteErrorKind::DuplicateKey => {
                error!(
                    %failure,
                    "unique (city, dt) index rejected a document; ids and keys disagree"
                )
            }
            _ => warn!(%failure, "document was not applied"),
        }
    }

    debug!(
        upserted = res.upserted,
        modified = res.modified,
        unchanged = res.unchanged,
        failed = res.write_errors.len(),
        "batch applied"
    );

    Ok(UpsertOutcome {
        upserted: res.upserted,
        modified: res.modified,
        unchanged: res.unchanged,
        failures: res.write_errors,
    })
}

fn to_document(doc: &CanonicalWeatherDocument) -> Result<Document, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(doc)?)?)
}
