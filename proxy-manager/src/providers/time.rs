//! Time provider abstraction.
//!
//! The reconciler sleeps in two places: the poll interval and retry backoff.
//! Routing both through [`TimeProvider`] lets tests run against tokio's paused
//! clock while production uses real time.

use async_trait::async_trait;
use std::time::Duration;

/// Provider trait for time operations.
#[async_trait(?Send)]
pub trait TimeProvider: Clone {
    /// Sleep for the specified duration.
    async fn sleep(&self, duration: Duration);

    /// Elapsed time since the provider was created.
    fn now(&self) -> Duration;
}

/// Real time provider using Tokio's time facilities.
///
/// Under `#[tokio::test(start_paused = true)]` the same provider follows the
/// paused clock, so backoff and poll delays complete instantly but still
/// advance [`now`](TimeProvider::now) by the exact amount slept.
#[derive(Debug, Clone)]
pub struct TokioTimeProvider {
    start_time: tokio::time::Instant,
}

impl TokioTimeProvider {
    /// Create a new Tokio time provider.
    pub fn new() -> Self {
        Self {
            start_time: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl TimeProvider for TokioTimeProvider {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now(&self) -> Duration {
        self.start_time.elapsed()
    }
}
