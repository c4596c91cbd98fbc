//! Bounded retry with exponential backoff for calls to the weather source.
//!
//! Retried: timeouts, connection failures, 5xx, 408 and 429.
//! Not retried: other 4xx (bad request, auth) and malformed bodies, which
//! point at configuration or contract problems rather than transient ones.

use std::future::Future;
use std::time::Duration;

use crate::error::FetchErrorKind;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_MAX_DELAY_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each retry after that.
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self { max_attempts, base_delay, max_delay }
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped.
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn is_retryable(&self, kind: &FetchErrorKind) -> bool {
        match kind {
            FetchErrorKind::Timeout | FetchErrorKind::Connection(_) => true,
            FetchErrorKind::HttpError(status) => is_retryable_status(*status),
            FetchErrorKind::MalformedResponse(_) => false,
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent. Returns the last error in the latter cases.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, FetchErrorKind>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchErrorKind>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!("request succeeded on attempt {attempt}");
                    }
                    return Ok(value);
                }
                Err(kind) if self.is_retryable(&kind) && attempt < max_attempts => {
                    let delay = self.delay_for_attempt(attempt - 1);
                    tracing::warn!(
                        "attempt {attempt} of {max_attempts} failed ({kind}), retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(kind) => {
                    if self.is_retryable(&kind) {
                        tracing::warn!("giving up after {attempt} attempts: {kind}");
                    } else {
                        tracing::debug!("not retrying: {kind}");
                    }
                    return Err(kind);
                }
            }
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 500..=599 | 408 | 429)
}
