use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named place the job collects weather for. Identity is the name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self { name: name.into(), latitude, longitude }
    }

    /// Coordinate query understood by the weather source, e.g. `-31.9523,115.8613`.
    pub fn query(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Current,
    Forecast,
    Alerts,
}

impl ResponseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseKind::Current => "current",
            ResponseKind::Forecast => "forecast",
            ResponseKind::Alerts => "alerts",
        }
    }

    pub const fn all() -> &'static [ResponseKind] {
        &[ResponseKind::Current, ResponseKind::Forecast, ResponseKind::Alerts]
    }
}

impl std::fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source payload for one location, kept verbatim for the raw zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawWeatherResponse {
    pub location: Location,
    pub kind: ResponseKind,
    pub fetched_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// A processed table: its name in the zones and its column header.
///
/// `COLUMNS` lists the serialized field names in declaration order.
pub trait Table: Serialize {
    const NAME: &'static str;
    const COLUMNS: &'static [&'static str];
}

/// Text stored in `CurrentRecord::alerts` when the source reports none.
pub const NO_ALERTS: &str = "No alerts";

/// One row of the `current_weather` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentRecord {
    pub location: String,
    pub region: String,
    /// Coordinates the source resolved the query to.
    pub latitude: f64,
    pub longitude: f64,
    pub observed_at: DateTime<Utc>,
    /// Wall-clock time at the location when the payload was produced.
    pub local_time: NaiveDateTime,
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub humidity_pct: f64,
    pub condition: String,
    pub wind_speed_ms: f64,
    pub visibility_km: f64,
    pub uv_index: f64,
    /// Alert descriptions joined with ` | `, [`NO_ALERTS`] for an empty
    /// list, `None` when no alerts payload was available for the location.
    pub alerts: Option<String>,
}

impl Table for CurrentRecord {
    const NAME: &'static str = "current_weather";
    const COLUMNS: &'static [&'static str] = &[
        "location",
        "region",
        "latitude",
        "longitude",
        "observed_at",
        "local_time",
        "temperature_c",
        "feels_like_c",
        "humidity_pct",
        "condition",
        "wind_speed_ms",
        "visibility_km",
        "uv_index",
        "alerts",
    ];
}

/// One row of the `forecast` table. `day_offset` is 0 for today, up to 2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub location: String,
    pub forecast_for_date: NaiveDate,
    pub day_offset: u8,
    pub temperature_min_c: f64,
    pub temperature_max_c: f64,
    pub temperature_avg_c: f64,
    pub condition: String,
    pub precipitation_probability_pct: f64,
    pub total_precip_mm: f64,
    pub max_wind_speed_ms: f64,
    pub avg_humidity_pct: f64,
    pub uv_index: f64,
}

impl Table for ForecastRecord {
    const NAME: &'static str = "forecast";
    const COLUMNS: &'static [&'static str] = &[
        "location",
        "forecast_for_date",
        "day_offset",
        "temperature_min_c",
        "temperature_max_c",
        "temperature_avg_c",
        "condition",
        "precipitation_probability_pct",
        "total_precip_mm",
        "max_wind_speed_ms",
        "avg_humidity_pct",
        "uv_index",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_query_is_lat_comma_lon() {
        let perth = Location::new("Perth", -31.9523, 115.8613);
        assert_eq!(perth.query(), "-31.9523,115.8613");
    }

    #[test]
    fn response_kind_serializes_lowercase() {
        let json = serde_json::to_string(&ResponseKind::Forecast).unwrap();
        assert_eq!(json, "\"forecast\"");
    }

    fn header_of<T: Table>(row: &T) -> String {
        let mut writer = csv::Writer::from_writer(vec![]);
        writer.serialize(row).unwrap();
        let bytes = writer.into_inner().unwrap();
        String::from_utf8(bytes).unwrap().lines().next().unwrap().to_string()
    }

    #[test]
    fn table_columns_match_serialized_field_names() {
        let current = CurrentRecord {
            location: "Perth".into(),
            region: "Western Australia".into(),
            latitude: -31.95,
            longitude: 115.86,
            observed_at: DateTime::from_timestamp(1_760_860_800, 0).unwrap(),
            local_time: NaiveDate::from_ymd_opt(2025, 10, 19)
                .unwrap()
                .and_hms_opt(16, 0, 0)
                .unwrap(),
            temperature_c: 21.5,
            feels_like_c: 20.9,
            humidity_pct: 48.0,
            condition: "Sunny".into(),
            wind_speed_ms: 5.0,
            visibility_km: 10.0,
            uv_index: 6.0,
            alerts: Some(NO_ALERTS.into()),
        };
        let forecast = ForecastRecord {
            location: "Perth".into(),
            forecast_for_date: NaiveDate::from_ymd_opt(2025, 10, 19).unwrap(),
            day_offset: 0,
            temperature_min_c: 12.0,
            temperature_max_c: 24.0,
            temperature_avg_c: 18.0,
            condition: "Sunny".into(),
            precipitation_probability_pct: 0.0,
            total_precip_mm: 0.0,
            max_wind_speed_ms: 6.0,
            avg_humidity_pct: 40.0,
            uv_index: 7.0,
        };

        assert_eq!(header_of(&current), CurrentRecord::COLUMNS.join(","));
        assert_eq!(header_of(&forecast), ForecastRecord::COLUMNS.join(","));
    }
}
