use std::sync::Arc;

use chrono::Utc;
use futures_util::{StreamExt, stream};

use crate::{
    error::{FetchError, FetchErrorKind},
    model::{Location, RawWeatherResponse, ResponseKind},
    provider::WeatherProvider,
    retry::RetryPolicy,
};

/// Outcome of every call for one location.
#[derive(Debug, Clone)]
pub struct LocationFetch {
    pub location: Location,
    pub current: Result<RawWeatherResponse, FetchError>,
    pub forecast: Result<RawWeatherResponse, FetchError>,
    pub alerts: Result<RawWeatherResponse, FetchError>,
}

impl LocationFetch {
    fn outcomes(&self) -> [&Result<RawWeatherResponse, FetchError>; 3] {
        [&self.current, &self.forecast, &self.alerts]
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes().iter().any(|r| r.is_err())
    }
}

/// Exactly one [`LocationFetch`] per requested location, in request order.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub locations: Vec<LocationFetch>,
}

impl FetchOutcome {
    /// Every successfully fetched payload, in [`ResponseKind::all`] order per location.
    pub fn responses(&self) -> Vec<RawWeatherResponse> {
        self.locations
            .iter()
            .flat_map(LocationFetch::outcomes)
            .filter_map(|r| r.as_ref().ok().cloned())
            .collect()
    }

    pub fn into_responses(self) -> Vec<RawWeatherResponse> {
        self.locations
            .into_iter()
            .flat_map(|l| [l.current, l.forecast, l.alerts])
            .filter_map(Result::ok)
            .collect()
    }

    /// Failures per location. Calls that failed the same way are folded
    /// into one error listing every affected request kind.
    pub fn errors(&self) -> Vec<FetchError> {
        let mut errors = Vec::new();

        for l in &self.locations {
            let mut location_errors: Vec<FetchError> = Vec::new();
            for err in l.outcomes().into_iter().filter_map(|r| r.as_ref().err()) {
                match location_errors.iter_mut().find(|e| e.kind == err.kind) {
                    Some(existing) => existing.requests.extend(err.requests.iter().copied()),
                    None => location_errors.push(err.clone()),
                }
            }
            errors.extend(location_errors);
        }

        errors
    }
}

/// Retrieves raw payloads for configured locations.
#[derive(Debug, Clone)]
pub struct Fetcher {
    provider: Arc<dyn WeatherProvider>,
    retry: RetryPolicy,
    forecast_days: u8,
    max_concurrency: usize,
}

impl Fetcher {
    pub fn new(provider: Arc<dyn WeatherProvider>) -> Self {
        Self { provider, retry: RetryPolicy::default(), forecast_days: 3, max_concurrency: 5 }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_forecast_days(mut self, days: u8) -> Self {
        self.forecast_days = days.max(1);
        self
    }

    /// Upper bound on outbound calls in flight during [`Fetcher::fetch_all`].
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub async fn fetch_current(&self, location: &Location) -> Result<RawWeatherResponse, FetchError> {
        self.fetch(location, ResponseKind::Current).await
    }

    pub async fn fetch_forecast(
        &self,
        location: &Location,
    ) -> Result<RawWeatherResponse, FetchError> {
        self.fetch(location, ResponseKind::Forecast).await
    }

    pub async fn fetch_alerts(&self, location: &Location) -> Result<RawWeatherResponse, FetchError> {
        self.fetch(location, ResponseKind::Alerts).await
    }

    async fn fetch(
        &self,
        location: &Location,
        kind: ResponseKind,
    ) -> Result<RawWeatherResponse, FetchError> {
        let payload = self
            .retry
            .run(move || async move {
                match kind {
                    ResponseKind::Current => self.provider.current(location).await,
                    ResponseKind::Forecast => {
                        self.provider.forecast(location, self.forecast_days).await
                    }
                    ResponseKind::Alerts => self.provider.alerts(location).await,
                }
            })
            .await
            .map_err(|e: FetchErrorKind| {
                tracing::warn!("{kind} fetch for '{}' failed: {e}", location.name);
                FetchError::new(location.name.clone(), kind, e)
            })?;

        Ok(RawWeatherResponse {
            location: location.clone(),
            kind,
            fetched_at: Utc::now(),
            payload,
        })
    }

    /// Fetch current conditions, forecast and alerts for every location. A
    /// failing location never prevents the others from being fetched.
    pub async fn fetch_all(&self, locations: &[Location]) -> FetchOutcome {
        let jobs = locations
            .iter()
            .flat_map(|loc| ResponseKind::all().iter().map(move |kind| (loc, *kind)));

        let mut results = stream::iter(jobs)
            .map(|(loc, kind)| self.fetch(loc, kind))
            .buffered(self.max_concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter();

        let mut outcome = FetchOutcome::default();
        for location in locations {
            // `buffered` preserves job order: current, forecast, alerts per location.
            let (Some(current), Some(forecast), Some(alerts)) =
                (results.next(), results.next(), results.next())
            else {
                break;
            };
            outcome.locations.push(LocationFetch {
                location: location.clone(),
                current,
                forecast,
                alerts,
            });
        }

        let failed = outcome.locations.iter().filter(|l| l.has_failures()).count();
        tracing::info!("fetched {} locations ({failed} with failures)", outcome.locations.len());

        outcome
    }
}
