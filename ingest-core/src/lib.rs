//! Core library for the `weather-ingest` tool.
//!
//! This crate defines:
//! - Canonical timestamps and record normalization
//! - Idempotent batch upserts against a document store
//! - The forecast provider fetch layer
//! - Configuration & credentials handling
//!
//! It is used by `weather-ingest`, but the pipeline pieces can be driven by any
//! binary or service that brings its own source and store.

pub mod config;
pub mod ingest;
mod lenient;
pub mod model;
pub mod normalize;
pub mod provider;
pub mod reconcile;
pub mod store;
pub mod time;

pub use config::{Config, ProviderConfig, StoreConfig};
pub use ingest::{IngestReport, run_ingestion};
pub use model::{
    CanonicalWeatherDocument, ForecastPayload, LocationMeta, RawHourlyRecord, WeatherCondition,
};
pub use normalize::normalize;
pub use provider::{ForecastSource, ProviderId};
pub use store::{DocumentStore, MemoryStore, SqliteStore, StoreError};
pub use time::{Clock, FixedClock, SystemClock};
