//! Error types for the tierguard library.
//!
//! Failures are classified by kind at the backend-client boundary so that
//! retry and circuit-breaker logic can dispatch on the variant alone. Nothing
//! in this crate inspects error message text to make a decision.

use std::time::Duration;
use thiserror::Error;

/// Errors produced on the durable (source-of-truth) path.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backend has no credentials or could not be reached.
    #[error("backend '{backend}' is unavailable: {reason}")]
    BackendUnavailable {
        /// Name of the backend.
        backend: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The circuit breaker rejected the call without touching the backend.
    #[error("circuit breaker open for backend '{backend}'")]
    CircuitOpen {
        /// Name of the backend.
        backend: String,
        /// Time until the breaker will admit a trial call, if known.
        retry_in: Option<Duration>,
    },

    /// A single attempt exceeded its deadline.
    #[error("operation on backend '{backend}' timed out after {elapsed:?}")]
    Timeout {
        /// Name of the backend.
        backend: String,
        /// The per-attempt deadline that elapsed.
        elapsed: Duration,
    },

    /// The backend returned a transient application or transport error.
    #[error("operation on backend '{backend}' failed: {message}")]
    OperationFailed {
        /// Name of the backend.
        backend: String,
        /// Error message from the backend.
        message: String,
    },

    /// The backend answered but refused the request. Retrying cannot help.
    #[error("backend '{backend}' rejected the request: {message}")]
    Rejected {
        /// Name of the backend.
        backend: String,
        /// Error message from the backend.
        message: String,
    },

    /// A value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The operation future panicked; the panic was caught and converted.
    #[error("operation panicked: {message}")]
    Panicked {
        /// Panic payload, when it was a string.
        message: String,
    },

    /// Invalid configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },
}

/// Coarse classification of a [`StoreError`], used in results and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`StoreError::BackendUnavailable`].
    BackendUnavailable,
    /// See [`StoreError::CircuitOpen`].
    CircuitOpen,
    /// See [`StoreError::Timeout`].
    OperationTimeout,
    /// See [`StoreError::OperationFailed`] and [`StoreError::Panicked`].
    OperationFailed,
    /// See [`StoreError::Rejected`].
    Rejected,
    /// See [`StoreError::Serialization`].
    Serialization,
    /// See [`StoreError::Configuration`].
    Configuration,
}

impl StoreError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::Timeout { .. } => ErrorKind::OperationTimeout,
            Self::OperationFailed { .. } | Self::Panicked { .. } => ErrorKind::OperationFailed,
            Self::Rejected { .. } => ErrorKind::Rejected,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    /// Returns `true` if another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable { .. }
                | Self::Timeout { .. }
                | Self::OperationFailed { .. }
                | Self::Panicked { .. }
        )
    }

    /// Returns `true` if this error is evidence that the backend is unhealthy
    /// and should count toward the circuit breaker threshold.
    pub fn counts_as_failure(&self) -> bool {
        self.is_retryable()
    }

    /// Returns the backend name if this error is associated with one.
    pub fn backend(&self) -> Option<&str> {
        match self {
            Self::BackendUnavailable { backend, .. }
            | Self::CircuitOpen { backend, .. }
            | Self::Timeout { backend, .. }
            | Self::OperationFailed { backend, .. }
            | Self::Rejected { backend, .. } => Some(backend),
            _ => None,
        }
    }

    /// Creates a `BackendUnavailable` error.
    pub fn unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Timeout` error.
    pub fn timeout(backend: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            backend: backend.into(),
            elapsed,
        }
    }

    /// Creates an `OperationFailed` error.
    pub fn failed(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OperationFailed {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Creates a `Rejected` error.
    pub fn rejected(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Creates a `Configuration` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors produced by cache backends.
///
/// These never reach callers of [`HotPathCache`](crate::cache::HotPathCache);
/// they only drive its switch into the in-process fallback.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Failed to connect to the cache backend.
    #[error("cache connection error: {0}")]
    Connection(String),

    /// A cache operation timed out.
    #[error("cache operation timed out: {0}")]
    Timeout(String),

    /// Generic backend error.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Error raised while loading configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed.
    #[error("invalid {var}: {reason}")]
    InvalidVar {
        /// Variable name.
        var: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The combination of values is inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A specialized `Result` type for durable store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A specialized `Result` type for cache backend operations.
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(StoreError::timeout("db", Duration::from_secs(5)).is_retryable());
        assert!(StoreError::failed("db", "connection reset").is_retryable());
        assert!(StoreError::unavailable("db", "no credentials").is_retryable());
        assert!(!StoreError::rejected("db", "duplicate key").is_retryable());
        assert!(!StoreError::Serialization("bad json".into()).is_retryable());
    }

    #[test]
    fn test_rejection_does_not_trip_breaker() {
        assert!(!StoreError::rejected("db", "constraint").counts_as_failure());
        assert!(StoreError::timeout("db", Duration::from_secs(1)).counts_as_failure());
    }

    #[test]
    fn test_kind_and_backend() {
        let err = StoreError::CircuitOpen {
            backend: "postgres".into(),
            retry_in: Some(Duration::from_secs(30)),
        };
        assert_eq!(err.kind(), ErrorKind::CircuitOpen);
        assert_eq!(err.backend(), Some("postgres"));

        let err = StoreError::Panicked {
            message: "boom".into(),
        };
        assert_eq!(err.kind(), ErrorKind::OperationFailed);
        assert_eq!(err.backend(), None);
    }

    #[test]
    fn test_display() {
        let err = StoreError::timeout("db", Duration::from_millis(250));
        assert!(err.to_string().contains("250ms"));
        let err = ConfigError::InvalidVar {
            var: "TIERGUARD_MAX_RETRIES".into(),
            reason: "not a number".into(),
        };
        assert!(err.to_string().contains("TIERGUARD_MAX_RETRIES"));
    }
}
