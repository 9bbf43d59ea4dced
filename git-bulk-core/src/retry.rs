//! Bounded exponential backoff around any fallible async operation.
//!
//! The driver knows nothing about the remote service: every error is retried
//! until the attempt budget runs out. Cancellation always wins over the
//! operation's own error.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::RetryError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Attempts allowed beyond the first.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Expected to be `>= 1.0`; smaller values shrink the backoff.
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

fn grow(backoff: Duration, config: &RetryConfig) -> Duration {
    Duration::try_from_secs_f64(backoff.as_secs_f64() * config.backoff_factor)
        .unwrap_or(config.max_backoff)
        .min(config.max_backoff)
}

/// The waits between attempts, in order. Yields exactly `max_retries` items.
pub fn backoff_schedule(config: &RetryConfig) -> impl Iterator<Item = Duration> + '_ {
    std::iter::successors(Some(config.initial_backoff), move |b| Some(grow(*b, config)))
        .take(config.max_retries as usize)
}

/// Runs `operation` up to `max_retries + 1` times, sleeping between failures.
pub async fn retry_with_backoff<T, E, F, Fut>(
    cancel: &CancellationToken,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut waits = backoff_schedule(config);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let Some(wait) = waits.next() else {
            warn!(attempt, error = %err, "Giving up after final attempt");
            return Err(RetryError::Exhausted(err));
        };

        warn!(
            attempt,
            backoff_ms = wait.as_millis() as u64,
            error = %err,
            "Attempt failed, backing off"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
