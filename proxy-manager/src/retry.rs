//! Bounded exponential-backoff retry.
//!
//! Every call that crosses the process boundary (store or daemon) goes through
//! [`retry`]. The harness never inspects the error: deciding whether the final
//! failure is fatal or merely logged is left to the caller.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::providers::TimeProvider;

/// Attempt budget and backoff base for [`retry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,

    /// Delay after the first failure; doubled after each further failure.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget and backoff base.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay slept after the `failure`-th failed attempt (1-indexed).
    pub fn backoff(&self, failure: u32) -> Duration {
        let shift = failure.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << shift)
    }

    /// Sum of all backoff sleeps taken when every attempt fails.
    pub fn worst_case_delay(&self) -> Duration {
        (1..self.max_attempts).map(|k| self.backoff(k)).sum()
    }
}

/// Error returned once the attempt budget is exhausted.
#[derive(Debug, Error)]
#[error("operation failed after {attempts} attempts: {last}")]
pub struct RetryError<E> {
    /// Number of attempts made.
    pub attempts: u32,

    /// Error returned by the final attempt.
    pub last: E,
}

/// Run `operation` until it succeeds or `policy.max_attempts` is reached.
///
/// After the k-th failure (k < max_attempts) sleeps `base_delay * 2^(k-1)`.
/// A policy with `max_attempts == 0` still makes a single attempt.
pub async fn retry<T, E, F, Fut, TP>(
    time: &TP,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    TP: TimeProvider,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => {
                return Err(RetryError {
                    attempts: attempt,
                    last: e,
                });
            }
            Err(e) => {
                let delay = policy.backoff(attempt);
                tracing::debug!(attempt, ?delay, error = %e, "attempt failed, backing off");
                time.sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
