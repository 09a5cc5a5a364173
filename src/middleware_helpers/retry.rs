use crate::errors::ServiceError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Factor to multiply delay by after each attempt
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// Policy for stock restorations, which must not be given up on quickly
    pub fn restoration() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
        }
    }
}

/// Retry policy for determining if an error is retryable
pub trait RetryPolicy<E> {
    fn is_retryable(&self, error: &E) -> bool;
}

/// Retries only errors that report themselves as transient
pub struct TransientRetryPolicy;

impl RetryPolicy<ServiceError> for TransientRetryPolicy {
    fn is_retryable(&self, error: &ServiceError) -> bool {
        error.is_retryable()
    }
}

/// Retries every error up to the attempt limit
pub struct AlwaysRetryPolicy;

impl<E> RetryPolicy<E> for AlwaysRetryPolicy {
    fn is_retryable(&self, _error: &E) -> bool {
        true
    }
}

/// Execute an async function with retries
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    policy: impl RetryPolicy<E>,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!("Operation succeeded after {} attempts", attempts);
                }
                return Ok(result);
            }
            Err(error) => {
                if attempts >= config.max_attempts || !policy.is_retryable(&error) {
                    warn!("Operation failed after {} attempts: {}", attempts, error);
                    return Err(error);
                }

                warn!(
                    "Attempt {} failed: {}. Retrying in {:?}...",
                    attempts, error, delay
                );

                sleep(delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_factor)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}
