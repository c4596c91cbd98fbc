use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use crate::{
    error::{ConfigurationError, FetchErrorKind},
    model::Location,
};

use super::{ProviderId, WeatherProvider};

pub const WEATHERAPI_BASE_URL: &str = "https://api.weatherapi.com/v1";
pub const RAPIDAPI_HOST: &str = "weatherapi-com.p.rapidapi.com";

#[derive(Debug, Clone)]
enum Auth {
    QueryKey(String),
    RapidApi(String),
}

/// Client for weatherapi.com's `current.json`, `forecast.json` and `alerts.json`.
#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    auth: Auth,
    base_url: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, ConfigurationError> {
        Ok(Self {
            auth: Auth::QueryKey(api_key),
            base_url: WEATHERAPI_BASE_URL.to_string(),
            http: build_client(timeout)?,
        })
    }

    /// Same endpoints, reached through the RapidAPI gateway.
    pub fn rapidapi(api_key: String, timeout: Duration) -> Result<Self, ConfigurationError> {
        Ok(Self {
            auth: Auth::RapidApi(api_key),
            base_url: format!("https://{RAPIDAPI_HOST}"),
            http: build_client(timeout)?,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{name}.json", self.base_url)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::QueryKey(key) => req.query(&[("key", key.as_str())]),
            Auth::RapidApi(key) => req
                .header("x-rapidapi-key", key.as_str())
                .header("x-rapidapi-host", RAPIDAPI_HOST),
        }
    }

    async fn get_json(&self, name: &str, query: &[(&str, String)]) -> Result<Value, FetchErrorKind> {
        let url = self.endpoint(name);
        tracing::debug!("GET {url} {query:?}");

        let res = self
            .authorize(self.http.get(&url))
            .query(query)
            .send()
            .await
            .map_err(classify)?;

        let status = res.status();
        let body = res.text().await.map_err(classify)?;

        if !status.is_success() {
            tracing::warn!(
                "WeatherAPI {name} request failed with status {status}: {}",
                truncate_body(&body)
            );
            return Err(FetchErrorKind::HttpError(status.as_u16()));
        }

        let parsed: Value = serde_json::from_str(&body).map_err(|e| {
            FetchErrorKind::MalformedResponse(format!("{name} body is not JSON: {e}"))
        })?;

        if !parsed.is_object() {
            return Err(FetchErrorKind::MalformedResponse(format!(
                "{name} body is not a JSON object: {}",
                truncate_body(&body)
            )));
        }

        Ok(parsed)
    }
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    fn id(&self) -> ProviderId {
        match self.auth {
            Auth::QueryKey(_) => ProviderId::WeatherApi,
            Auth::RapidApi(_) => ProviderId::RapidApi,
        }
    }

    async fn current(&self, location: &Location) -> Result<Value, FetchErrorKind> {
        self.get_json("current", &[("q", location.query())]).await
    }

    async fn forecast(&self, location: &Location, days: u8) -> Result<Value, FetchErrorKind> {
        self.get_json("forecast", &[("q", location.query()), ("days", days.to_string())])
            .await
    }

    async fn alerts(&self, location: &Location) -> Result<Value, FetchErrorKind> {
        self.get_json("alerts", &[("q", location.query())]).await
    }
}

fn build_client(timeout: Duration) -> Result<Client, ConfigurationError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigurationError::HttpClient(e.to_string()))
}

fn classify(err: reqwest::Error) -> FetchErrorKind {
    if err.is_timeout() {
        FetchErrorKind::Timeout
    } else if let Some(status) = err.status() {
        FetchErrorKind::HttpError(status.as_u16())
    } else if err.is_decode() || err.is_body() {
        FetchErrorKind::MalformedResponse(err.to_string())
    } else {
        FetchErrorKind::Connection(err.to_string())
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let end = (0..=MAX).rev().find(|&i| body.is_char_boundary(i)).unwrap_or(0);
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
