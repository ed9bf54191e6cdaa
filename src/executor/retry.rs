//! Retry configuration and logic.

use crate::core::{StoreError, StoreResult};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Delays before the second, third, ... attempt. The last entry is
    /// reused when there are more attempts than entries.
    pub backoff: Vec<Duration>,

    /// Hard deadline for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(5),
            ],
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Creates a new retry configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Disables retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sets the maximum number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the backoff schedule.
    pub fn with_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.backoff.is_empty() {
            return Duration::ZERO;
        }
        let index = (attempt as usize - 1).min(self.backoff.len() - 1);
        self.backoff[index]
    }

    /// Returns whether another attempt should be made after `attempts` attempts.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Result of a retried operation, with the number of attempts made.
#[derive(Debug)]
pub struct Retried<T> {
    /// Final result.
    pub result: StoreResult<T>,
    /// Attempts made, at least 1.
    pub attempts: u32,
}

/// Runs one attempt under the configured deadline, converting a panic into
/// [`StoreError::Panicked`] and an elapsed deadline into [`StoreError::Timeout`].
pub async fn attempt_once<Fut, T>(backend: &str, timeout: Duration, attempt: Fut) -> StoreResult<T>
where
    Fut: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(timeout, AssertUnwindSafe(attempt).catch_unwind()).await {
        Ok(Ok(result)) => result,
        Ok(Err(panic)) => Err(StoreError::Panicked {
            message: panic_message(panic.as_ref()),
        }),
        Err(_) => Err(StoreError::timeout(backend, timeout)),
    }
}

/// Executes an async operation with retry logic.
///
/// Errors that are not retryable end the loop immediately. The closure
/// receives the 1-based attempt number.
pub async fn retry_async<F, Fut, T>(config: &RetryConfig, backend: &str, mut operation: F) -> Retried<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt = 0;
    loop {
        let delay = config.delay_for_attempt(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = attempt_once(backend, config.attempt_timeout, operation(attempt + 1)).await;
        attempt += 1;

        match result {
            Ok(value) => {
                return Retried {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) if !e.is_retryable() || !config.should_retry(attempt) => {
                return Retried {
                    result: Err(e),
                    attempts: attempt,
                }
            }
            Err(e) => {
                tracing::debug!(
                    backend = backend,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    error = %e,
                    "Retrying operation"
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.attempt_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
        assert!(!config.should_retry(1));
    }

    #[test]
    fn test_delay_schedule() {
        let config = RetryConfig::new().with_max_attempts(5);
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(5));

        let flat = RetryConfig::new().with_backoff(Vec::new());
        assert_eq!(flat.delay_for_attempt(2), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_exhausted() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let start = tokio::time::Instant::now();

        let retried: Retried<()> = retry_async(&RetryConfig::default(), "db", move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::failed("db", "boom"))
        })
        .await;

        assert_eq!(retried.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retried.result.unwrap_err().kind(), ErrorKind::OperationFailed);
        // 1s + 2s between the three attempts.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_is_not_retried() {
        let retried: Retried<()> = retry_async(&RetryConfig::default(), "db", |_| async {
            Err(StoreError::rejected("db", "duplicate key"))
        })
        .await;

        assert_eq!(retried.attempts, 1);
        assert_eq!(retried.result.unwrap_err().kind(), ErrorKind::Rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_later_attempt() {
        let retried = retry_async(&RetryConfig::default(), "db", |attempt| async move {
            if attempt < 2 {
                Err(StoreError::unavailable("db", "connection reset"))
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(retried.attempts, 2);
        assert_eq!(retried.result.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout() {
        let config = RetryConfig::no_retry().with_attempt_timeout(Duration::from_millis(50));
        let retried: Retried<()> = retry_async(&config, "db", |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        assert_eq!(retried.result.unwrap_err().kind(), ErrorKind::OperationTimeout);
    }

    async fn explode() -> StoreResult<()> {
        panic!("driver bug")
    }

    #[tokio::test]
    async fn test_panic_is_converted() {
        let result = attempt_once("db", Duration::from_secs(1), explode()).await;

        match result {
            Err(StoreError::Panicked { message }) => assert_eq!(message, "driver bug"),
            other => panic!("expected panic conversion, got {:?}", other),
        }
    }
}
