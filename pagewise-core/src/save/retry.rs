use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::errors::{ContextError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            exponential_base: 2.0,
        }
    }
}

/// Bounded exponential backoff for retryable [`ContextError`]s
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.config.exponential_base.powi(retry.saturating_sub(1) as i32);
        let delay_ms = (self.config.initial_delay_ms as f64 * factor) as u64;
        Duration::from_millis(delay_ms.min(self.config.max_delay_ms))
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or runs out of retries
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        info!("{} succeeded after {} attempts", operation_name, attempt);
                    }
                    return Ok(result);
                },
                Err(err) if !Self::should_retry(&err) => return Err(err),
                Err(err) => {
                    if attempt > self.config.max_retries {
                        error!(
                            "{} failed after {} attempts: {}",
                            operation_name, attempt, err
                        );
                        return Err(err);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {}ms...",
                        operation_name,
                        attempt,
                        self.config.max_retries + 1,
                        err,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                },
            }
        }
    }

    pub fn should_retry(error: &ContextError) -> bool {
        error.is_retryable()
    }
}
