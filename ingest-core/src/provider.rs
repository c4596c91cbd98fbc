use crate::{
    Config,
    error::{ConfigurationError, FetchErrorKind},
    model::Location,
    provider::weatherapi::WeatherApiProvider,
};
use async_trait::async_trait;
use std::{convert::TryFrom, fmt::Debug};

pub mod weatherapi;

/// Ways of reaching the weatherapi.com data set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    /// api.weatherapi.com with a `key` query parameter.
    WeatherApi,
    /// The same API behind the RapidAPI gateway, authenticated by headers.
    RapidApi,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::WeatherApi => "weatherapi",
            ProviderId::RapidApi => "rapidapi",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::WeatherApi, ProviderId::RapidApi]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "weatherapi" => Ok(ProviderId::WeatherApi),
            "rapidapi" => Ok(ProviderId::RapidApi),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: weatherapi, rapidapi."
            )),
        }
    }
}

/// Read-only access to a weather data source. Payloads are returned as the
/// source's own JSON; shaping them into records is the normalizer's job.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    fn id(&self) -> ProviderId;

    async fn current(&self, location: &Location) -> Result<serde_json::Value, FetchErrorKind>;

    async fn forecast(
        &self,
        location: &Location,
        days: u8,
    ) -> Result<serde_json::Value, FetchErrorKind>;

    /// Active weather alerts for the location.
    async fn alerts(&self, location: &Location) -> Result<serde_json::Value, FetchErrorKind>;
}

/// Construct a provider from config and explicit ProviderId.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
) -> Result<Box<dyn WeatherProvider>, ConfigurationError> {
    let provider_cfg = config
        .provider_config(id)
        .filter(|cfg| !cfg.api_key.trim().is_empty())
        .ok_or_else(|| ConfigurationError::MissingCredentials(id.to_string()))?;

    let timeout = config.fetch.request_timeout();
    let mut provider = match id {
        ProviderId::WeatherApi => WeatherApiProvider::new(provider_cfg.api_key.clone(), timeout)?,
        ProviderId::RapidApi => {
            WeatherApiProvider::rapidapi(provider_cfg.api_key.clone(), timeout)?
        }
    };
    if let Some(base_url) = &provider_cfg.base_url {
        provider = provider.with_base_url(base_url);
    }

    Ok(Box::new(provider))
}

/// Construct the default provider from config, using `default_provider` field.
pub fn default_provider_from_config(
    config: &Config,
) -> Result<Box<dyn WeatherProvider>, ConfigurationError> {
    let id = config.default_provider_id().map_err(|e| ConfigurationError::InvalidSetting {
        setting: "default_provider",
        reason: e.to_string(),
    })?;
    provider_from_config(id, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn provider_id_as_str_roundtrip() {
        for id in ProviderId::all() {
            let s = id.as_str();
            let parsed = ProviderId::try_from(s).expect("roundtrip should succeed");
            assert_eq!(*id, parsed);
        }
    }

    #[test]
    fn provider_id_parsing_ignores_case() {
        assert_eq!(ProviderId::try_from("RapidAPI").unwrap(), ProviderId::RapidApi);
    }

    #[test]
    fn unknown_provider_error() {
        let err = ProviderId::try_from("doesnotexist").unwrap_err();
        assert!(err.to_string().contains("Unknown provider"));
    }

    #[test]
    fn provider_from_config_errors_when_missing_api_key() {
        let cfg = Config::default();
        let err = provider_from_config(ProviderId::WeatherApi, &cfg).unwrap_err();
        assert!(err.to_string().contains("No API key configured for provider"));
    }

    #[test]
    fn default_provider_from_config_errors_when_not_set() {
        let cfg = Config::default();
        let err = default_provider_from_config(&cfg).unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("No default provider configured"));
        assert!(msg.contains("Hint: run `weather-ingest configure"));
    }

    #[test]
    fn default_provider_from_config_works_when_set_and_configured() {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::RapidApi, "KEY".to_string());

        let provider = default_provider_from_config(&cfg).expect("provider should build");
        assert_eq!(provider.id(), ProviderId::RapidApi);
    }
}
