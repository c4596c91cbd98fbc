//! Turns weatherapi.com payloads into flat `current_weather` and `forecast` rows.
//! Alerts payloads are folded into the `alerts` column of the current row.
//!
//! Normalization is a pure function of the raw response: the only clock it
//! consults is the response's own `fetched_at`, so normalizing the same
//! payload twice yields identical records. Required fields are never
//! defaulted; a missing or mistyped field fails the whole payload.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::{
    error::{NormalizationError, NormalizationErrorKind},
    model::{CurrentRecord, ForecastRecord, NO_ALERTS, RawWeatherResponse, ResponseKind},
};

/// Number of forecast days kept per location (`day_offset` 0..=2).
pub const FORECAST_HORIZON_DAYS: usize = 3;

const KPH_PER_MS: f64 = 3.6;

/// Records and failures from one batch of raw responses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    pub currents: Vec<CurrentRecord>,
    pub forecasts: Vec<ForecastRecord>,
    pub errors: Vec<NormalizationError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalizer {
    clock_skew: Duration,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self { clock_skew: Duration::minutes(10) }
    }
}

impl Normalizer {
    /// `clock_skew` bounds how far an observation may lie past its fetch time.
    pub fn new(clock_skew: Duration) -> Self {
        Self { clock_skew }
    }

    pub fn normalize_current(
        &self,
        raw: &RawWeatherResponse,
    ) -> Result<CurrentRecord, NormalizationError> {
        self.current_record(raw).map_err(|kind| error_for(raw, kind))
    }

    /// One record per calendar day, earliest first, at most
    /// [`FORECAST_HORIZON_DAYS`]. Repeated dates keep their first entry.
    /// Only the first [`FORECAST_HORIZON_DAYS`] source entries must carry a
    /// valid date; later entries with a bad date are skipped.
    pub fn normalize_forecast(
        &self,
        raw: &RawWeatherResponse,
    ) -> Result<Vec<ForecastRecord>, NormalizationError> {
        forecast_records(raw).map_err(|kind| error_for(raw, kind))
    }

    /// Alert descriptions joined with ` | `, or [`NO_ALERTS`] for an empty list.
    pub fn normalize_alerts(&self, raw: &RawWeatherResponse) -> Result<String, NormalizationError> {
        alerts_text(raw).map_err(|kind| error_for(raw, kind))
    }

    /// Current rows pick up the alerts text of their location when an alerts
    /// payload for it normalized cleanly.
    pub fn normalize_all(&self, raws: &[RawWeatherResponse]) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();
        let mut alerts = HashMap::new();

        for raw in raws {
            let result = match raw.kind {
                ResponseKind::Current => {
                    self.normalize_current(raw).map(|record| batch.currents.push(record))
                }
                ResponseKind::Forecast => {
                    self.normalize_forecast(raw).map(|records| batch.forecasts.extend(records))
                }
                ResponseKind::Alerts => self.normalize_alerts(raw).map(|text| {
                    alerts.insert(raw.location.name.as_str(), text);
                }),
            };
            if let Err(err) = result {
                tracing::warn!("{err}");
                batch.errors.push(err);
            }
        }

        for record in &mut batch.currents {
            record.alerts = alerts.get(record.location.as_str()).cloned();
        }

        batch
    }

    fn current_record(
        &self,
        raw: &RawWeatherResponse,
    ) -> Result<CurrentRecord, NormalizationErrorKind> {
        expect_kind(raw, ResponseKind::Current)?;

        let root = Node::root(&raw.payload);
        let place = root.get("location")?;
        let current = root.get("current")?;

        let epoch = current.get("last_updated_epoch")?;
        let observed_at = epoch_to_utc(&epoch)?;
        if observed_at > raw.fetched_at + self.clock_skew {
            return Err(NormalizationErrorKind::OutOfRange {
                field: epoch.path,
                value: format!("{} is after fetch time {}", observed_at, raw.fetched_at),
            });
        }

        let humidity = current.get("humidity")?;
        let humidity_pct = percentage(&humidity)?;

        let wind_speed_ms = non_negative(&current.get("wind_kph")?)? / KPH_PER_MS;

        Ok(CurrentRecord {
            location: raw.location.name.clone(),
            region: place.get("region")?.str()?.to_string(),
            latitude: coordinate(&place.get("lat")?, 90.0)?,
            longitude: coordinate(&place.get("lon")?, 180.0)?,
            observed_at,
            local_time: parse_local_time(&place.get("localtime")?)?,
            temperature_c: current.get("temp_c")?.f64()?,
            feels_like_c: current.get("feelslike_c")?.f64()?,
            humidity_pct,
            condition: current.get("condition")?.get("text")?.str()?.to_string(),
            wind_speed_ms,
            visibility_km: non_negative(&current.get("vis_km")?)?,
            uv_index: current.get("uv")?.f64()?,
            alerts: None,
        })
    }
}

fn forecast_records(raw: &RawWeatherResponse) -> Result<Vec<ForecastRecord>, NormalizationErrorKind> {
    expect_kind(raw, ResponseKind::Forecast)?;

    let days = Node::root(&raw.payload).get("forecast")?.get("forecastday")?;
    let entries = days.array()?;

    let mut seen = HashSet::new();
    let mut dated = Vec::with_capacity(entries.len());
    for i in 0..entries.len() {
        let entry = days.index(i)?;
        let date = match entry.get("date").and_then(|node| parse_date(&node)) {
            Ok(date) => date,
            Err(err) if i < FORECAST_HORIZON_DAYS => return Err(err),
            Err(err) => {
                tracing::debug!("skipping forecast entry for '{}': {err}", raw.location.name);
                continue;
            }
        };
        if seen.insert(date) {
            dated.push((date, entry));
        }
    }

    if dated.is_empty() {
        return Err(NormalizationErrorKind::InsufficientForecastDays);
    }

    dated.sort_by_key(|(date, _)| *date);
    dated.truncate(FORECAST_HORIZON_DAYS);

    dated
        .into_iter()
        .enumerate()
        .map(|(offset, (date, entry))| {
            let day = entry.get("day")?;

            let min = day.get("mintemp_c")?;
            let temperature_min_c = min.f64()?;
            let temperature_max_c = day.get("maxtemp_c")?.f64()?;
            if temperature_min_c > temperature_max_c {
                return Err(NormalizationErrorKind::OutOfRange {
                    field: min.path,
                    value: format!("{temperature_min_c} exceeds maximum {temperature_max_c}"),
                });
            }

            Ok(ForecastRecord {
                location: raw.location.name.clone(),
                forecast_for_date: date,
                day_offset: offset as u8,
                temperature_min_c,
                temperature_max_c,
                temperature_avg_c: day.get("avgtemp_c")?.f64()?,
                condition: day.get("condition")?.get("text")?.str()?.to_string(),
                precipitation_probability_pct: percentage(&day.get("daily_chance_of_rain")?)?,
                total_precip_mm: non_negative(&day.get("totalprecip_mm")?)?,
                max_wind_speed_ms: non_negative(&day.get("maxwind_kph")?)? / KPH_PER_MS,
                avg_humidity_pct: percentage(&day.get("avghumidity")?)?,
                uv_index: day.get("uv")?.f64()?,
            })
        })
        .collect()
}

fn alerts_text(raw: &RawWeatherResponse) -> Result<String, NormalizationErrorKind> {
    expect_kind(raw, ResponseKind::Alerts)?;

    let list = Node::root(&raw.payload).get("alerts")?.get("alert")?;
    let mut descriptions = Vec::new();
    for i in 0..list.array()?.len() {
        descriptions.push(list.index(i)?.get("desc")?.str()?.trim());
    }

    if descriptions.is_empty() {
        Ok(NO_ALERTS.to_string())
    } else {
        Ok(descriptions.join(" | "))
    }
}

fn error_for(raw: &RawWeatherResponse, kind: NormalizationErrorKind) -> NormalizationError {
    NormalizationError { location: raw.location.name.clone(), request: raw.kind, kind }
}

fn expect_kind(raw: &RawWeatherResponse, expected: ResponseKind) -> Result<(), NormalizationErrorKind> {
    if raw.kind == expected {
        Ok(())
    } else {
        Err(NormalizationErrorKind::InvalidShape {
            field: "kind".into(),
            expected: match expected {
                ResponseKind::Current => "a current-conditions payload",
                ResponseKind::Forecast => "a forecast payload",
                ResponseKind::Alerts => "an alerts payload",
            },
        })
    }
}

fn epoch_to_utc(node: &Node<'_>) -> Result<DateTime<Utc>, NormalizationErrorKind> {
    let secs = node.value.as_i64().ok_or_else(|| node.shape("an integer epoch"))?;
    DateTime::from_timestamp(secs, 0).ok_or_else(|| out_of_range(node, secs))
}

fn parse_date(node: &Node<'_>) -> Result<NaiveDate, NormalizationErrorKind> {
    NaiveDate::parse_from_str(node.str()?, "%Y-%m-%d").map_err(|_| node.shape("a YYYY-MM-DD date"))
}

/// weatherapi.com renders local time without zero-padding the hour, e.g. `2025-10-19 6:05`.
fn parse_local_time(node: &Node<'_>) -> Result<NaiveDateTime, NormalizationErrorKind> {
    NaiveDateTime::parse_from_str(node.str()?, "%Y-%m-%d %H:%M")
        .map_err(|_| node.shape("a YYYY-MM-DD HH:MM local time"))
}

fn coordinate(node: &Node<'_>, limit: f64) -> Result<f64, NormalizationErrorKind> {
    let value = node.f64()?;
    if (-limit..=limit).contains(&value) { Ok(value) } else { Err(out_of_range(node, value)) }
}

fn non_negative(node: &Node<'_>) -> Result<f64, NormalizationErrorKind> {
    let value = node.f64()?;
    if value >= 0.0 { Ok(value) } else { Err(out_of_range(node, value)) }
}

fn percentage(node: &Node<'_>) -> Result<f64, NormalizationErrorKind> {
    let value = node.f64()?;
    if (0.0..=100.0).contains(&value) { Ok(value) } else { Err(out_of_range(node, value)) }
}

fn out_of_range(node: &Node<'_>, value: impl ToString) -> NormalizationErrorKind {
    NormalizationErrorKind::OutOfRange { field: node.path.clone(), value: value.to_string() }
}

/// A value inside the payload together with its dotted path, so errors can
/// name the exact field that was missing or mistyped.
#[derive(Debug, Clone)]
struct Node<'a> {
    value: &'a Value,
    path: String,
}

impl<'a> Node<'a> {
    fn root(value: &'a Value) -> Self {
        Self { value, path: String::new() }
    }

    fn child_path(&self, key: &str) -> String {
        if self.path.is_empty() { key.to_string() } else { format!("{}.{key}", self.path) }
    }

    fn shape(&self, expected: &'static str) -> NormalizationErrorKind {
        let field = if self.path.is_empty() { "<payload>".to_string() } else { self.path.clone() };
        NormalizationErrorKind::InvalidShape { field, expected }
    }

    /// Absent keys and explicit nulls both count as missing.
    fn get(&self, key: &str) -> Result<Node<'a>, NormalizationErrorKind> {
        let object = self.value.as_object().ok_or_else(|| self.shape("an object"))?;
        match object.get(key) {
            Some(Value::Null) | None => {
                Err(NormalizationErrorKind::MissingField(self.child_path(key)))
            }
            Some(value) => Ok(Node { value, path: self.child_path(key) }),
        }
    }

    fn array(&self) -> Result<&'a [Value], NormalizationErrorKind> {
        self.value.as_array().map(Vec::as_slice).ok_or_else(|| self.shape("an array"))
    }

    fn index(&self, i: usize) -> Result<Node<'a>, NormalizationErrorKind> {
        let value = self.array()?.get(i).ok_or_else(|| {
            NormalizationErrorKind::MissingField(format!("{}[{i}]", self.path))
        })?;
        Ok(Node { value, path: format!("{}[{i}]", self.path) })
    }

    fn f64(&self) -> Result<f64, NormalizationErrorKind> {
        self.value.as_f64().filter(|v| v.is_finite()).ok_or_else(|| self.shape("a number"))
    }

    fn str(&self) -> Result<&'a str, NormalizationErrorKind> {
        self.value.as_str().ok_or_else(|| self.shape("a string"))
    }
}
