//! Core library for the scheduled weather ingestion job.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Abstraction over the weather source and a weatherapi.com client
//! - Fetching with bounded retries and concurrency
//! - Normalization of raw payloads into flat `current_weather` / `forecast` rows
//! - The raw/processed zone writer handed the result of each run
//!
//! It is used by `weather-ingest`, but can also be driven from any other
//! scheduler (a serverless handler, cron, a test harness).

pub mod config;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod provider;
pub mod retry;
pub mod storage;

pub use config::{Config, ProviderConfig};
pub use error::{
    ConfigurationError, FetchError, FetchErrorKind, NormalizationError, NormalizationErrorKind,
};
pub use fetcher::{FetchOutcome, Fetcher, LocationFetch};
pub use model::{
    CurrentRecord, ForecastRecord, Location, NO_ALERTS, RawWeatherResponse, ResponseKind, Table,
};
pub use normalize::{NormalizedBatch, Normalizer};
pub use pipeline::{Pipeline, RunResult, RunStatus, run_extraction};
pub use provider::{ProviderId, WeatherProvider};
pub use retry::RetryPolicy;
pub use storage::{LocalZones, WriteReport, ZoneWriter};
