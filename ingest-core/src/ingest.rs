//! One ingestion run: fetch, normalize, upsert, report.

use anyhow::{Context, Result};
use std::fmt;
use tracing::{debug, info};

use crate::{
    normalize::normalize,
    provider::ForecastSource,
    reconcile::{ensure_indexes, upsert_batch},
    store::{DocumentStore, WriteError},
    time::Clock,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub fetched: usize,
    pub upserted: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub failures: Vec<WriteError>,
}

impl IngestReport {
    pub fn changed(&self) -> usize {
        self.upserted + self.modified
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fetched={}, upserted/modified={}", self.fetched, self.changed())
    }
}

/// Run the pipeline once, strictly in sequence.
///
/// A fetch failure ends the run before anything is written. Documents the
/// store rejects individually are returned in the report; a store that
/// cannot take the batch at all ends the run with an error.
pub async fn run_ingestion(
    source: &dyn ForecastSource,
    store: &dyn DocumentStore,
    clock: &dyn Clock,
) -> Result<IngestReport> {
    ensure_indexes(store).await;

    let records = source
        .fetch_hourly()
        .await
        .with_context(|| format!("Failed to fetch hourly forecast from {}", source.provider()))?;
    debug!(records = records.len(), "fetched raw records");

    let docs: Vec<_> = records.iter().map(|rec| normalize(rec, clock)).collect();

    let outcome = upsert_batch(store, &docs)
        .await
        .context("Failed to write forecast batch")?;

    let report = IngestReport {
        fetched: records.len(),
        upserted: outcome.upserted,
        modified: outcome.modified,
        unchanged: outcome.unchanged,
        failures: outcome.failures,
    };

    info!(
        fetched = report.fetched,
        changed = report.changed(),
        failed = report.failures.len(),
        "ingestion run finished"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::RawHourlyRecord,
        provider::ProviderId,
        store::MemoryStore,
        time::FixedClock,
    };
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[derive(Debug)]
    struct CannedSource(Result<Vec<RawHourlyRecord>, String>);

    impl CannedSource {
        fn hours(city: &str, n: i64) -> Self {
            let records = (0..n)
                .map(|h| {
                    serde_json::from_value(json!({
                        "city_name": city,
                        "ts": 1_700_000_000 + h * 3600,
                        "temp": 18.0,
                    }))
                    .unwrap()
                })
                .collect();
            Self(Ok(records))
        }
    }

    #[async_trait]
    impl ForecastSource for CannedSource {
        fn provider(&self) -> ProviderId {
            ProviderId::Weatherbit
        }

        async fn fetch_hourly(&self) -> Result<Vec<RawHourlyRecord>> {
            self.0.clone().map_err(|msg| anyhow!(msg))
        }
    }

    fn clock(minute: u32) -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap())
    }

    #[tokio::test]
    async fn second_run_adds_no_documents() {
        let store = MemoryStore::new();
        let source = CannedSource::hours("Austin", 24);

        let first = run_ingestion(&source, &store, &clock(0)).await.unwrap();
        assert_eq!(first.fetched, 24);
        assert_eq!(first.upserted, 24);
        assert_eq!(first.to_string(), "fetched=24, upserted/modified=24");
        assert_eq!(store.count().await.unwrap(), 24);

        let second = run_ingestion(&source, &store, &clock(5)).await.unwrap();
        assert_eq!(second.upserted, 0);
        assert_eq!(second.modified, 24);
        assert_eq!(store.count().await.unwrap(), 24);
        assert!(second.is_clean());
    }

    #[tokio::test]
    async fn empty_fetch_writes_nothing() {
        let store = MemoryStore::new();
        let source = CannedSource(Ok(Vec::new()));

        let report = run_ingestion(&source, &store, &clock(0)).await.unwrap();
        assert_eq!(report.fetched, 0);
        assert_eq!(report.changed(), 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_is_fatal_and_writes_nothing() {
        let store = MemoryStore::new();
        let source = CannedSource(Err("status 503".into()));

        let err = run_ingestion(&source, &store, &clock(0)).await.unwrap_err();
        assert!(err.to_string().contains("Failed to fetch hourly forecast from weatherbit"));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unavailable_store_is_fatal() {
        let store = MemoryStore::new();
        store.go_offline();
        let source = CannedSource::hours("Austin", 2);

        let err = run_ingestion(&source, &store, &clock(0)).await.unwrap_err();
        assert!(err.to_string().contains("Failed to write forecast batch"));
    }
}
