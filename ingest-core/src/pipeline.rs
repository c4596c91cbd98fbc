use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::{
    Config,
    error::{ConfigurationError, FetchError, NormalizationError},
    fetcher::Fetcher,
    model::{CurrentRecord, ForecastRecord, Location, RawWeatherResponse},
    normalize::Normalizer,
    provider::{WeatherProvider, default_provider_from_config},
};

/// How a run went, from the scheduler's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every location fetched and normalized cleanly.
    Success,
    /// Some records were produced, some locations failed.
    Degraded,
    /// Nothing usable was produced.
    Failed,
}

/// Everything one scheduled run produced. Nothing is dropped silently:
/// every failure is in `fetch_errors` or `normalization_errors`.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub currents: Vec<CurrentRecord>,
    pub forecasts: Vec<ForecastRecord>,
    pub fetch_errors: Vec<FetchError>,
    pub normalization_errors: Vec<NormalizationError>,
    /// Verbatim payloads for the raw zone.
    #[serde(skip)]
    pub raw: Vec<RawWeatherResponse>,
}

impl RunResult {
    pub fn status(&self) -> RunStatus {
        if self.currents.is_empty() && self.forecasts.is_empty() {
            RunStatus::Failed
        } else if self.fetch_errors.is_empty() && self.normalization_errors.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::Degraded
        }
    }

    /// Locations that contributed at least one record, in first-seen order.
    pub fn succeeded_locations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        let all = self
            .currents
            .iter()
            .map(|r| r.location.as_str())
            .chain(self.forecasts.iter().map(|r| r.location.as_str()));
        for name in all {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    pub fn error_count(&self) -> usize {
        self.fetch_errors.len() + self.normalization_errors.len()
    }
}

/// Fetch + normalize over a fixed set of locations.
#[derive(Debug, Clone)]
pub struct Pipeline {
    locations: Vec<Location>,
    fetcher: Fetcher,
    normalizer: Normalizer,
}

impl Pipeline {
    /// Build a pipeline from validated settings around an explicit provider.
    pub fn new(config: &Config, provider: Arc<dyn WeatherProvider>) -> Result<Self, ConfigurationError> {
        config.validate_settings()?;

        let fetch = &config.fetch;
        let fetcher = Fetcher::new(provider)
            .with_retry(fetch.retry_policy())
            .with_forecast_days(fetch.forecast_days)
            .with_max_concurrency(fetch.max_concurrency);
        let normalizer = Normalizer::new(Duration::seconds(config.normalize.clock_skew_secs));

        Ok(Self { locations: config.locations.clone(), fetcher, normalizer })
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub async fn run_extraction(&self) -> RunResult {
        let started_at = Utc::now();
        tracing::info!("starting extraction for {} locations", self.locations.len());

        let outcome = self.fetcher.fetch_all(&self.locations).await;
        let fetch_errors = outcome.errors();
        let raw = outcome.into_responses();

        let batch = self.normalizer.normalize_all(&raw);

        let result = RunResult {
            started_at,
            finished_at: Utc::now(),
            currents: batch.currents,
            forecasts: batch.forecasts,
            fetch_errors,
            normalization_errors: batch.errors,
            raw,
        };

        tracing::info!(
            status = ?result.status(),
            currents = result.currents.len(),
            forecasts = result.forecasts.len(),
            errors = result.error_count(),
            "extraction finished"
        );

        result
    }
}

/// Entry point for one scheduled run. Configuration problems abort before
/// the weather source is contacted; per-location failures are returned
/// inside the [`RunResult`].
pub async fn run_extraction(config: &Config) -> Result<RunResult, ConfigurationError> {
    config.validate()?;
    let provider: Arc<dyn WeatherProvider> = Arc::from(default_provider_from_config(config)?);

    Ok(Pipeline::new(config, provider)?.run_extraction().await)
}
