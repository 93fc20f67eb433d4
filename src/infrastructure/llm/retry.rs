use super::errors::LlmApiError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::models::RetryConfig;

/// Retry policy configuration for handling transient errors
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    max_retries: u32,
    /// Initial backoff duration in milliseconds
    initial_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds
    max_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff_ms,
            max_backoff_ms: max_backoff_ms.max(initial_backoff_ms),
        }
    }

    /// Execute an operation with exponential backoff retry logic
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, LlmApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmApiError>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!("Operation succeeded after {} retries", attempt);
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if self.should_retry(&err, attempt) {
                        let backoff = self.calculate_backoff(attempt);
                        warn!(
                            attempt = attempt + 1,
                            backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                            error = %err,
                            "transient provider error, retrying"
                        );

                        sleep(backoff).await;
                        attempt += 1;
                    } else {
                        if attempt >= self.max_retries && err.is_transient() {
                            warn!("Operation failed after {} attempts: {}", attempt + 1, err);
                        } else {
                            debug!("Permanent error, not retrying: {}", err);
                        }
                        return Err(err);
                    }
                }
            }
        }
    }

    /// Calculate exponential backoff duration for a given attempt
    ///
    /// Formula: min(initial_backoff * 2^attempt, max_backoff)
    fn calculate_backoff(&self, attempt: u32) -> Duration {
        let backoff_ms = self
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_backoff_ms);

        Duration::from_millis(backoff_ms)
    }

    fn should_retry(&self, error: &LlmApiError, attempt: u32) -> bool {
        if attempt >= self.max_retries {
            return false;
        }

        error.is_transient()
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}
