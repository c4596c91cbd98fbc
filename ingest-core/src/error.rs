use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::model::ResponseKind;

/// Why a single call to the weather source failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum FetchErrorKind {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("HTTP status {0}")]
    HttpError(u16),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// A location whose data could not be fetched. Calls for one location that
/// failed the same way are reported once, listing every affected request.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("fetching {} for '{location}' failed: {kind}", Requests(.requests))]
pub struct FetchError {
    pub location: String,
    pub requests: Vec<ResponseKind>,
    pub kind: FetchErrorKind,
}

impl FetchError {
    pub fn new(location: impl Into<String>, request: ResponseKind, kind: FetchErrorKind) -> Self {
        Self { location: location.into(), requests: vec![request], kind }
    }
}

struct Requests<'a>(&'a [ResponseKind]);

impl fmt::Display for Requests<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, kind) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{kind}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum NormalizationErrorKind {
    #[error("missing field `{0}`")]
    MissingField(String),

    #[error("field `{field}` is not {expected}")]
    InvalidShape { field: String, expected: &'static str },

    #[error("field `{field}` out of range: {value}")]
    OutOfRange { field: String, value: String },

    #[error("forecast contains no days")]
    InsufficientForecastDays,
}

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("normalizing {request} payload for '{location}' failed: {kind}")]
pub struct NormalizationError {
    pub location: String,
    pub request: ResponseKind,
    pub kind: NormalizationErrorKind,
}

/// Fatal problems detected before any request is made.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("no locations configured")]
    NoLocations,

    #[error("invalid location '{name}': {reason}")]
    InvalidLocation { name: String, reason: String },

    #[error("location '{0}' is configured more than once")]
    DuplicateLocation(String),

    #[error(
        "No API key configured for provider '{0}'.\n\
         Hint: run `weather-ingest configure {0}` or set WEATHER_API_KEY."
    )]
    MissingCredentials(String),

    #[error("invalid setting `{setting}`: {reason}")]
    InvalidSetting { setting: &'static str, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_lists_every_failed_request() {
        let mut err = FetchError::new("Sydney", ResponseKind::Current, FetchErrorKind::Timeout);
        err.requests.push(ResponseKind::Forecast);

        assert_eq!(
            err.to_string(),
            "fetching current+forecast for 'Sydney' failed: request timed out"
        );
    }

    #[test]
    fn normalization_error_names_the_field() {
        let err = NormalizationError {
            location: "Perth".into(),
            request: ResponseKind::Current,
            kind: NormalizationErrorKind::MissingField("current.temp_c".into()),
        };

        assert!(err.to_string().contains("missing field `current.temp_c`"));
    }
}
