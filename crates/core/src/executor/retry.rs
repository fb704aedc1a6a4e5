//! Bounded retry with exponential backoff for external calls.

use std::future::Future;

use log::{debug, warn};

use crate::config::RetryPolicy;
use crate::connectors::{ApiError, RetryClass};

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. The last error is returned on exhaustion.
///
/// `op` receives the 1-based attempt number; `on_failure` sees every failed
/// attempt, including the final one.
pub async fn retry_with_backoff<T, Op, Fut, OnFailure>(
    policy: &RetryPolicy,
    mut op: Op,
    mut on_failure: OnFailure,
) -> Result<T, ApiError>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
    OnFailure: FnMut(u32, &ApiError),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        on_failure(attempt, &err);

        if err.retry_class() == RetryClass::Never {
            debug!("Terminal error on attempt {}: {}, not retrying", attempt, err);
            return Err(err);
        }
        if attempt >= max_attempts {
            warn!("Giving up after {} attempts: {}", attempt, err);
            return Err(err);
        }

        let delay = policy.backoff(attempt);
        warn!(
            "Attempt {}/{} failed: {}; retrying in {:?}",
            attempt, max_attempts, err, delay
        );
        tokio::time::sleep(delay).await;
    }
}
