use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetryError {
    #[error("Invalid retry configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts per page, including the first one.
    pub max_attempts: u32,
    /// Step of the linear backoff: the n-th failed attempt waits `n * base_delay`.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Result<Self, RetryError> {
        if config.max_attempts == 0 {
            return Err(RetryError::InvalidConfig(
                "max_attempts must be greater than 0".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Whether another attempt follows the failed 1-based `attempt`.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.config.max_attempts
    }

    /// Wait after the failed 1-based `attempt`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        self.config.base_delay.saturating_mul(attempt.max(1))
    }
}
