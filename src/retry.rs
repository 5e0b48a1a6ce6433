use std::fmt::Display;
use std::future::Future;

use tokio::time::Duration;

use crate::config::{env_or, ConfigError};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt, so the operation runs at most
    /// `max_retries + 1` times.
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_retries: env_or("RECORDER_MAX_RETRIES", defaults.max_retries)?,
            delay: Duration::from_millis(env_or(
                "RECORDER_RETRY_DELAY_MS",
                defaults.delay.as_millis() as u64,
            )?),
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

#[derive(Debug, Clone)]
pub struct RetryHandler {
    config: RetryConfig,
}

impl RetryHandler {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `operation` until it succeeds, `should_retry` rejects the error, or
    /// the retry budget is spent. The last error is returned.
    pub async fn retry<F, Fut, T, E, P>(&self, operation: F, should_retry: P) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.config.max_attempts();
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if !should_retry(&error) || attempts >= max_attempts {
                        return Err(error);
                    }

                    log::warn!(
                        "Operation failed (attempt {}/{}): {}. Retrying in {:?}...",
                        attempts,
                        max_attempts,
                        error,
                        self.config.delay
                    );
                    tokio::time::sleep(self.config.delay).await;
                }
            }
        }
    }
}
