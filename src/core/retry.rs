//! Bounded retry with exponential backoff
//!
//! Used for source page fetches and sink writes. Only errors classified as
//! transient by [`AnonymizeError::is_transient`] are retried; anything else
//! is returned on the first failure.

use crate::config::RetryConfig;
use crate::domain::{AnonymizeError, Result};
use crate::log_retry_attempt;
use std::future::Future;
use std::time::Duration;

/// Backoff schedule for retried operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: usize,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// Runs `operation`, retrying transient failures with exponential backoff
///
/// # Arguments
///
/// * `policy` - Backoff schedule
/// * `operation_name` - Label used in retry log lines
/// * `operation` - Closure producing a fresh future per attempt
///
/// # Errors
///
/// Returns the last error once retries are exhausted, or the first
/// non-transient error.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                log_retry_attempt!(attempt, policy.max_retries, operation_name, &e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(give_up(e, attempt, operation_name)),
        }
    }
}

fn give_up(error: AnonymizeError, attempts: usize, operation_name: &str) -> AnonymizeError {
    if attempts > 0 {
        tracing::error!(
            operation = operation_name,
            retries = attempts,
            error = %error,
            "Giving up after retries"
        );
    }
    error
}
