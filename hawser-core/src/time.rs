//! Pluggable time behind a provider trait.
//!
//! Retry backoff, connect timeouts and handshake deadlines all go through
//! [`TimeProvider`], never through bare `tokio::time`, so tests can inject
//! a clock of their own.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

/// Error returned by [`TimeProvider::timeout`] when the deadline passes
/// before the wrapped future completes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("deadline of {0:?} elapsed")]
pub struct Elapsed(pub Duration);

/// Source of delays and deadlines.
#[async_trait(?Send)]
pub trait TimeProvider: Clone {
    /// Suspend the calling task for `duration`.
    async fn sleep(&self, duration: Duration);

    /// Run `future` with a deadline; the future is dropped on expiry.
    async fn timeout<F, T>(&self, duration: Duration, future: F) -> Result<T, Elapsed>
    where
        F: Future<Output = T>;
}

/// Real time via tokio's timer wheel.
#[derive(Debug, Clone, Default)]
pub struct TokioClock;

impl TokioClock {
    /// Create a tokio-backed time provider.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl TimeProvider for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn timeout<F, T>(&self, duration: Duration, future: F) -> Result<T, Elapsed>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout(duration, future)
            .await
            .map_err(|_| Elapsed(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_advances() {
        let clock = TokioClock::new();
        let before = tokio::time::Instant::now();
        clock.sleep(Duration::from_secs(5)).await;
        assert!(before.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_expires() {
        let clock = TokioClock::new();
        let result = clock
            .timeout(Duration::from_millis(10), std::future::pending::<()>())
            .await;
        assert_eq!(result, Err(Elapsed(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn test_timeout_passes_value_through() {
        let clock = TokioClock::new();
        let result = clock
            .timeout(Duration::from_secs(1), async { 42 })
            .await;
        assert_eq!(result, Ok(42));
    }
}
