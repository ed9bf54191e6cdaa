//! Result structures returned by the resilient executor.
//!
//! Executor calls never fail with `Err`. Every failure mode resolves to one of
//! these structures, carrying the caller-supplied fallback and the error that
//! caused it.

use crate::core::error::{ErrorKind, StoreError};
use std::time::Duration;

/// The outcome of a resilient query.
#[derive(Debug, Clone)]
pub struct QueryOutcome<T> {
    /// The query result, or the caller's fallback value on failure.
    pub data: T,

    /// The last error observed, if the fallback was used.
    pub error: Option<StoreError>,

    /// Whether `data` was served from the hot-path cache.
    pub from_cache: bool,

    /// Number of durable attempts made (zero for cache hits and open circuits).
    pub attempts: u32,

    /// Wall time spent inside the executor.
    pub elapsed: Duration,
}

impl<T> QueryOutcome<T> {
    pub(crate) fn fresh(data: T, attempts: u32, elapsed: Duration) -> Self {
        Self {
            data,
            error: None,
            from_cache: false,
            attempts,
            elapsed,
        }
    }

    pub(crate) fn cached(data: T, elapsed: Duration) -> Self {
        Self {
            data,
            error: None,
            from_cache: true,
            attempts: 0,
            elapsed,
        }
    }

    pub(crate) fn fallback(data: T, error: StoreError, attempts: u32, elapsed: Duration) -> Self {
        Self {
            data,
            error: Some(error),
            from_cache: false,
            attempts,
            elapsed,
        }
    }

    /// Returns `true` if the caller's fallback value was returned.
    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }

    /// Returns the kind of the error, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(StoreError::kind)
    }

    /// Converts into a plain `Result`, dropping the fallback on error.
    pub fn into_result(self) -> Result<T, StoreError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }
}

/// The outcome of a resilient write.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// Whether the write reached the durable store.
    pub applied: bool,

    /// Queue item ID if the write was deferred for later replay.
    pub deferred_id: Option<String>,

    /// The error that prevented the write, if any.
    pub error: Option<StoreError>,

    /// Number of durable attempts made.
    pub attempts: u32,
}

impl WriteOutcome {
    /// Returns `true` if the write was queued instead of applied.
    pub fn is_deferred(&self) -> bool {
        self.deferred_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_outcome() {
        let outcome = QueryOutcome::fallback(
            "X".to_string(),
            StoreError::failed("db", "boom"),
            3,
            Duration::from_secs(8),
        );
        assert!(outcome.is_fallback());
        assert!(!outcome.from_cache);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::OperationFailed));
        assert_eq!(outcome.data, "X");
        assert!(outcome.into_result().is_err());
    }

    #[test]
    fn test_cached_outcome() {
        let outcome = QueryOutcome::cached(7u32, Duration::ZERO);
        assert!(outcome.from_cache);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(outcome.into_result().unwrap(), 7);
    }
}
