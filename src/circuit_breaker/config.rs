//! Circuit breaker configuration.

use crate::core::StoreError;
use std::time::Duration;

/// Configuration for a circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,

    /// Cooldown applied when the circuit first opens.
    pub base_backoff: Duration,

    /// Upper bound on the cooldown, however many failures accumulate.
    pub max_backoff: Duration,

    /// Which store errors advance the failure count.
    pub failure_policy: FailurePolicy,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            base_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(300),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Threshold 5, 60 second base backoff, five minute cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failure threshold (minimum 1).
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Sets the base backoff.
    pub fn with_base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    /// Sets the maximum backoff.
    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    /// Sets the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Creates a configuration that trips quickly.
    ///
    /// This configuration:
    /// - Uses a lower failure threshold (3)
    /// - Starts with a 30 second cooldown
    pub fn strict() -> Self {
        Self {
            failure_threshold: 3,
            base_backoff: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// Returns the cooldown for a circuit that opened after `failures`
    /// consecutive failures.
    ///
    /// The base backoff applies at the threshold and doubles for every
    /// failure beyond it, capped at `max_backoff`.
    pub fn backoff_for(&self, failures: u32) -> Duration {
        let beyond = failures.saturating_sub(self.failure_threshold).min(16);
        let scaled = self.base_backoff.saturating_mul(1u32 << beyond);
        scaled.min(self.max_backoff)
    }
}

/// Selects which store errors advance the consecutive-failure count.
#[derive(Debug, Clone)]
pub struct FailurePolicy {
    /// Count per-attempt timeouts as failures.
    pub count_timeouts: bool,
    /// Count unreachable backends as failures.
    pub count_unavailable: bool,
    /// Count transient operation errors as failures.
    pub count_operation_failures: bool,
    /// Count rejected requests as failures.
    pub count_rejections: bool,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            count_timeouts: true,
            count_unavailable: true,
            count_operation_failures: true,
            count_rejections: false, // the backend answered
        }
    }
}

impl FailurePolicy {
    /// Counts every connectivity and operation error, not rejections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy that only counts connectivity problems.
    pub fn connection_only() -> Self {
        Self {
            count_timeouts: true,
            count_unavailable: true,
            count_operation_failures: false,
            count_rejections: false,
        }
    }

    /// Returns true when `error` should count against the store.
    pub fn should_count(&self, error: &StoreError) -> bool {
        match error {
            StoreError::Timeout { .. } => self.count_timeouts,
            StoreError::BackendUnavailable { .. } => self.count_unavailable,
            StoreError::OperationFailed { .. } | StoreError::Panicked { .. } => {
                self.count_operation_failures
            }
            StoreError::Rejected { .. } => self.count_rejections,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.base_backoff, Duration::from_secs(60));
        assert_eq!(config.max_backoff, Duration::from_secs(300));
    }

    #[test]
    fn test_backoff_growth() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.backoff_for(5), Duration::from_secs(60));
        assert_eq!(config.backoff_for(6), Duration::from_secs(120));
        assert_eq!(config.backoff_for(7), Duration::from_secs(240));
        assert_eq!(config.backoff_for(8), Duration::from_secs(300));
        assert_eq!(config.backoff_for(500), Duration::from_secs(300));
    }

    #[test]
    fn test_threshold_minimum() {
        let config = CircuitBreakerConfig::new().with_failure_threshold(0);
        assert_eq!(config.failure_threshold, 1);
    }

    #[test]
    fn test_failure_policy() {
        let policy = FailurePolicy::default();
        assert!(policy.should_count(&StoreError::timeout("db", Duration::from_secs(1))));
        assert!(!policy.should_count(&StoreError::rejected("db", "bad filter")));

        let policy = FailurePolicy::connection_only();
        assert!(!policy.should_count(&StoreError::failed("db", "deadlock")));
        assert!(policy.should_count(&StoreError::unavailable("db", "refused")));
    }
}
