//! Retry policy for calls to external services
//!
//! Transient failures (see [`AppError::is_transient`]) are retried with
//! exponential backoff until the configured budget is spent. Anything else is
//! surfaced immediately.

use crate::errors::{AppError, Result};
use backoff::{future::retry_notify, ExponentialBackoff};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Build the backoff schedule for a retry budget
pub fn backoff_policy(budget: Duration) -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(200),
        max_interval: Duration::from_secs(5),
        max_elapsed_time: Some(budget),
        ..Default::default()
    }
}

/// Run `operation` until it succeeds, fails permanently, or the budget runs out
pub async fn with_retry<T, F, Fut>(operation_name: &str, budget: Duration, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_notify(
        backoff_policy(budget),
        || {
            let attempt = operation();
            async move {
                attempt.await.map_err(|e| {
                    if e.is_transient() {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        },
        |err: AppError, delay: Duration| {
            warn!(
                operation = operation_name,
                error = %err,
                retry_in_ms = delay.as_millis() as u64,
                "External call failed, retrying"
            );
        },
    )
    .await
}
