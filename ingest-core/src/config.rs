use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{error::ConfigurationError, model::Location, provider::ProviderId, retry::RetryPolicy};

/// Environment variable that overrides the default provider's API key.
pub const API_KEY_ENV: &str = "WEATHER_API_KEY";

/// Configuration for a single provider (e.g., API key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,

    /// Overrides the provider's public endpoint, e.g. for a proxy or a test server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Request, retry and concurrency settings for the fetch stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub forecast_days: u8,
    pub request_timeout_secs: u64,
    pub max_concurrency: usize,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            forecast_days: 3,
            request_timeout_secs: 10,
            max_concurrency: 5,
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
        }
    }
}

impl FetchSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeSettings {
    /// How far past the fetch time an observation timestamp may lie.
    pub clock_skew_secs: i64,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self { clock_skew_secs: 600 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    pub keep_latest_only: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { output_dir: None, keep_latest_only: true }
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Optional default provider id, e.g. "weatherapi" or "rapidapi".
    pub default_provider: Option<String>,

    /// Example TOML:
    /// [providers.weatherapi]
    /// api_key = "..."
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default = "default_locations")]
    pub locations: Vec<Location>,

    #[serde(default)]
    pub fetch: FetchSettings,

    #[serde(default)]
    pub normalize: NormalizeSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_provider: None,
            providers: HashMap::new(),
            locations: default_locations(),
            fetch: FetchSettings::default(),
            normalize: NormalizeSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

/// The five cities the job has always tracked.
pub fn default_locations() -> Vec<Location> {
    vec![
        Location::new("Perth", -31.9523, 115.8613),
        Location::new("Melbourne", -37.8136, 144.9631),
        Location::new("Sydney", -33.8688, 151.2093),
        Location::new("Brisbane", -27.4698, 153.0251),
        Location::new("Adelaide", -34.9285, 138.6007),
    ]
}

impl Config {
    /// Return the default provider as a strongly-typed ProviderId.
    pub fn default_provider_id(&self) -> Result<ProviderId> {
        let s = self.default_provider.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "No default provider configured.\n\
                 Hint: run `weather-ingest configure <provider>` (e.g. `weather-ingest configure weatherapi`) first."
            )
        })?;

        ProviderId::try_from(s.as_str())
    }

    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    /// Store default provider as string.
    pub fn set_default_provider(&mut self, id: ProviderId) {
        self.default_provider = Some(id.as_str().to_string());
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-ingest", "weather-ingest")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Apply `WEATHER_API_KEY` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Injects the API key for the default provider (weatherapi when none is
    /// set) from `lookup`. Empty values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let Some(api_key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) else {
            return;
        };

        let id = self.default_provider_id().unwrap_or(ProviderId::WeatherApi);
        match self.providers.get_mut(id.as_str()) {
            Some(existing) => existing.api_key = api_key,
            None => self.upsert_provider_api_key(id, api_key),
        }
    }

    /// Convenience helper: set/replace a provider API key and optionally set default provider.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        let base_url = self.provider_config(provider_id).and_then(|cfg| cfg.base_url.clone());
        self.providers
            .insert(provider_id.as_str().to_string(), ProviderConfig { api_key, base_url });

        if self.default_provider.is_none() {
            self.default_provider = Some(provider_id.to_string());
        }
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers.get(provider_id.as_str()).map(|cfg| cfg.api_key.as_str())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        self.provider_api_key(provider_id).is_some_and(|key| !key.trim().is_empty())
    }

    /// Check everything a run needs before any request leaves the process.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.validate_settings()?;

        let id = self.default_provider_id().map_err(|e| ConfigurationError::InvalidSetting {
            setting: "default_provider",
            reason: e.to_string(),
        })?;
        if !self.is_provider_configured(id) {
            return Err(ConfigurationError::MissingCredentials(id.to_string()));
        }

        Ok(())
    }

    /// Locations and fetch/normalize settings, without looking at credentials.
    pub fn validate_settings(&self) -> Result<(), ConfigurationError> {
        validate_locations(&self.locations)?;

        let fetch = &self.fetch;
        if fetch.max_attempts == 0 {
            return Err(ConfigurationError::InvalidSetting {
                setting: "fetch.max_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if fetch.max_concurrency == 0 {
            return Err(ConfigurationError::InvalidSetting {
                setting: "fetch.max_concurrency",
                reason: "must be at least 1".into(),
            });
        }
        if fetch.forecast_days == 0 {
            return Err(ConfigurationError::InvalidSetting {
                setting: "fetch.forecast_days",
                reason: "must be at least 1".into(),
            });
        }
        if fetch.request_timeout_secs == 0 {
            return Err(ConfigurationError::InvalidSetting {
                setting: "fetch.request_timeout_secs",
                reason: "must be at least 1".into(),
            });
        }
        if self.normalize.clock_skew_secs < 0 {
            return Err(ConfigurationError::InvalidSetting {
                setting: "normalize.clock_skew_secs",
                reason: "must not be negative".into(),
            });
        }

        Ok(())
    }
}

/// Locations must be non-empty, uniquely named and carry real coordinates.
pub fn validate_locations(locations: &[Location]) -> Result<(), ConfigurationError> {
    if locations.is_empty() {
        return Err(ConfigurationError::NoLocations);
    }

    let mut seen = HashSet::new();
    for loc in locations {
        if loc.name.trim().is_empty() {
            return Err(ConfigurationError::InvalidLocation {
                name: loc.name.clone(),
                reason: "name is empty".into(),
            });
        }
        if !loc.latitude.is_finite() || !(-90.0..=90.0).contains(&loc.latitude) {
            return Err(ConfigurationError::InvalidLocation {
                name: loc.name.clone(),
                reason: format!("latitude {} outside [-90, 90]", loc.latitude),
            });
        }
        if !loc.longitude.is_finite() || !(-180.0..=180.0).contains(&loc.longitude) {
            return Err(ConfigurationError::InvalidLocation {
                name: loc.name.clone(),
                reason: format!("longitude {} outside [-180, 180]", loc.longitude),
            });
        }
        if !seen.insert(loc.name.as_str()) {
            return Err(ConfigurationError::DuplicateLocation(loc.name.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderId;

    fn configured() -> Config {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "KEY".into());
        cfg
    }

    #[test]
    fn default_provider_id_errors_when_not_set() {
        let cfg = Config::default();
        let err = cfg.default_provider_id().unwrap_err();

        assert!(err.to_string().contains("No default provider configured"));
    }

    #[test]
    fn default_config_tracks_five_cities() {
        let cfg = Config::default();
        let names: Vec<_> = cfg.locations.iter().map(|l| l.name.as_str()).collect();

        assert_eq!(names, ["Perth", "Melbourne", "Sydney", "Brisbane", "Adelaide"]);
    }

    #[test]
    fn upsert_does_not_override_existing_default() {
        let mut cfg = Config::default();

        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "DIRECT".into());
        cfg.upsert_provider_api_key(ProviderId::RapidApi, "GATEWAY".into());

        let default = cfg.default_provider_id().expect("default provider must exist");

        assert_eq!(default, ProviderId::WeatherApi);
        assert!(cfg.is_provider_configured(ProviderId::WeatherApi));
        assert!(cfg.is_provider_configured(ProviderId::RapidApi));
    }

    #[test]
    fn set_default_provider_overrides_default() {
        let mut cfg = configured();
        cfg.upsert_provider_api_key(ProviderId::RapidApi, "GATEWAY".into());

        cfg.set_default_provider(ProviderId::RapidApi);

        let default = cfg.default_provider_id().expect("default provider must exist");
        assert_eq!(default, ProviderId::RapidApi);
    }

    #[test]
    fn env_override_replaces_default_provider_key() {
        let mut cfg = configured();

        cfg.apply_overrides_from(|name| (name == API_KEY_ENV).then(|| "FROM_ENV".to_string()));

        assert_eq!(cfg.provider_api_key(ProviderId::WeatherApi), Some("FROM_ENV"));
    }

    #[test]
    fn env_override_configures_weatherapi_on_first_run() {
        let mut cfg = Config::default();

        cfg.apply_overrides_from(|_| Some("FROM_ENV".to_string()));

        assert_eq!(cfg.default_provider_id().unwrap(), ProviderId::WeatherApi);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn blank_env_value_is_ignored() {
        let mut cfg = Config::default();

        cfg.apply_overrides_from(|_| Some("  ".to_string()));

        assert!(cfg.providers.is_empty());
    }

    #[test]
    fn validate_requires_credentials() {
        let mut cfg = configured();
        cfg.providers.clear();

        let err = cfg.validate().unwrap_err();
        assert_eq!(err, ConfigurationError::MissingCredentials("weatherapi".into()));
    }

    #[test]
    fn validate_rejects_empty_location_set() {
        let mut cfg = configured();
        cfg.locations.clear();

        assert_eq!(cfg.validate().unwrap_err(), ConfigurationError::NoLocations);
    }

    #[test]
    fn validate_rejects_out_of_range_coordinates() {
        let mut cfg = configured();
        cfg.locations[2].latitude = 91.0;

        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidLocation { ref name, .. } if name == "Sydney"));

        cfg.locations[2].latitude = -33.8;
        cfg.locations[2].longitude = f64::NAN;
        assert!(matches!(cfg.validate(), Err(ConfigurationError::InvalidLocation { .. })));
    }

    #[test]
    fn validate_rejects_duplicate_names() {
        let mut cfg = configured();
        cfg.locations.push(Location::new("Perth", 0.0, 0.0));

        assert_eq!(
            cfg.validate().unwrap_err(),
            ConfigurationError::DuplicateLocation("Perth".into())
        );
    }

    #[test]
    fn validate_rejects_zero_attempts() {
        let mut cfg = configured();
        cfg.fetch.max_attempts = 0;

        assert!(matches!(
            cfg.validate(),
            Err(ConfigurationError::InvalidSetting { setting: "fetch.max_attempts", .. })
        ));
    }

    #[test]
    fn toml_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = configured();
        cfg.fetch.max_concurrency = 2;
        cfg.locations.truncate(1);
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.provider_api_key(ProviderId::WeatherApi), Some("KEY"));
        assert_eq!(loaded.fetch.max_concurrency, 2);
        assert_eq!(loaded.locations, cfg.locations);
    }

    #[test]
    fn example_config_is_valid() {
        let cfg: Config = toml::from_str(include_str!("../config.example.toml")).unwrap();

        assert_eq!(cfg.locations, default_locations());
        assert_eq!(cfg.fetch, FetchSettings::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            default_provider = "rapidapi"

            [providers.rapidapi]
            api_key = "GATEWAY"

            [fetch]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(cfg.locations.len(), 5);
        assert_eq!(cfg.fetch.max_attempts, 5);
        assert_eq!(cfg.fetch.forecast_days, 3);
        assert!(cfg.storage.keep_latest_only);
        assert!(cfg.validate().is_ok());
    }
}
