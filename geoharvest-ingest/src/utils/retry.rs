//! Retry logic for transient collaborator failures
//!
//! Exponential backoff bounded by a maximum elapsed time. Only
//! [`IngestError::Transient`] is retried; everything else is returned on
//! the first attempt.

use crate::error::IngestResult;
use geoharvest_common::config::RetryConfig;
use std::time::{Duration, Instant};

/// Backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            max_elapsed: Duration::from_secs(10),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            max_elapsed: Duration::from_secs(config.max_elapsed_secs),
        }
    }
}

/// Retry an operation while it fails transiently
///
/// **Algorithm:**
/// 1. Attempt operation
/// 2. Success, or any non-transient error: return it
/// 3. Transient error:
///    a. If the next sleep would end past `max_elapsed`: return the error
///    b. Otherwise log WARN, sleep, double the backoff (capped), retry
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g., "flickr.photos.search")
/// * `policy` - Backoff parameters
/// * `operation` - Async closure performing one attempt
pub async fn retry_transient<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> IngestResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = IngestResult<T>>,
{
    let start_time = Instant::now();
    let mut attempt = 0u32;
    let mut backoff = policy.initial_backoff;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) => {
                let elapsed = start_time.elapsed();
                let next_backoff = backoff.min(policy.max_backoff);

                if elapsed + next_backoff > policy.max_elapsed {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        error = %err,
                        "Giving up: max retry time exceeded"
                    );
                    return Err(err);
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = next_backoff.as_millis() as u64,
                    error = %err,
                    "Transient failure, will retry after backoff"
                );

                tokio::time::sleep(next_backoff).await;
                backoff = (backoff * 2).min(policy.max_backoff);
            }
        }
    }
}
