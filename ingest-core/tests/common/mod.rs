//! Payload builders and server helpers shared by the integration tests.
#![allow(dead_code)]

use std::time::Duration;

use chrono::{Days, Utc};
use serde_json::{Value, json};
use weather_ingest_core::{Location, RetryPolicy, provider::weatherapi::WeatherApiProvider};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

pub fn locations() -> Vec<Location> {
    vec![
        Location::new("Perth", -31.9523, 115.8613),
        Location::new("Melbourne", -37.8136, 144.9631),
        Location::new("Sydney", -33.8688, 151.2093),
        Location::new("Brisbane", -27.4698, 153.0251),
        Location::new("Adelaide", -34.9285, 138.6007),
    ]
}

/// A `current.json` body observed ten minutes ago.
pub fn current_body(name: &str) -> Value {
    json!({
        "location": {
            "name": name,
            "region": "",
            "country": "Australia",
            "lat": -30.0,
            "lon": 140.0,
            "localtime": "2025-10-19 9:05"
        },
        "current": {
            "last_updated_epoch": Utc::now().timestamp() - 600,
            "temp_c": 22.0,
            "feelslike_c": 21.0,
            "humidity": 55,
            "wind_kph": 14.4,
            "vis_km": 10.0,
            "uv": 5.0,
            "condition": { "text": "Partly cloudy" }
        }
    })
}

/// A `forecast.json` body with `days` consecutive days starting today.
pub fn forecast_body(name: &str, days: u64) -> Value {
    let today = Utc::now().date_naive();
    let forecastday: Vec<Value> = (0..days)
        .map(|i| {
            let date = today.checked_add_days(Days::new(i)).unwrap_or(today);
            json!({
                "date": date.format("%Y-%m-%d").to_string(),
                "day": {
                    "mintemp_c": 12.0 + i as f64,
                    "maxtemp_c": 24.0 + i as f64,
                    "avgtemp_c": 18.0,
                    "totalprecip_mm": 0.4,
                    "daily_chance_of_rain": 20,
                    "maxwind_kph": 25.2,
                    "avghumidity": 60,
                    "uv": 6.0,
                    "condition": { "text": "Sunny" }
                }
            })
        })
        .collect();

    json!({
        "location": current_body(name)["location"].clone(),
        "current": current_body(name)["current"].clone(),
        "forecast": { "forecastday": forecastday }
    })
}

/// An `alerts.json` body carrying one alert per description.
pub fn alerts_body(name: &str, descriptions: &[&str]) -> Value {
    let alert: Vec<Value> = descriptions
        .iter()
        .map(|desc| json!({ "headline": "Bureau of Meteorology", "severity": "Moderate", "desc": desc }))
        .collect();

    json!({
        "location": current_body(name)["location"].clone(),
        "alerts": { "alert": alert }
    })
}

/// Serve healthy current, forecast and alerts responses for `location`.
pub async fn mount_healthy(server: &MockServer, location: &Location) {
    Mock::given(method("GET"))
        .and(path("/current.json"))
        .and(query_param("q", location.query()))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body(&location.name)))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/forecast.json"))
        .and(query_param("q", location.query()))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body(&location.name, 3)))
        .mount(server)
        .await;

    mount_alerts(server, location, &[]).await;
}

pub async fn mount_alerts(server: &MockServer, location: &Location, descriptions: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/alerts.json"))
        .and(query_param("q", location.query()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(alerts_body(&location.name, descriptions)),
        )
        .mount(server)
        .await;
}

pub fn provider(server: &MockServer, timeout: Duration) -> WeatherApiProvider {
    WeatherApiProvider::new("TEST_KEY".into(), timeout)
        .expect("client should build")
        .with_base_url(&server.uri())
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(5), Duration::from_millis(20))
}
