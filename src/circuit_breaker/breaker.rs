//! Circuit breaker implementation.

use crate::circuit_breaker::config::CircuitBreakerConfig;
use crate::circuit_breaker::state::{
    BreakerMetrics, BreakerState, CircuitBreakerState, CircuitStatus,
};
use crate::core::StoreError;

use std::fmt;
use std::sync::{RwLock, RwLockWriteGuard};
use tokio::time::Instant;

/// A consecutive-failure circuit breaker guarding one backend.
///
/// The breaker does not wrap the backend itself; callers ask
/// [`is_call_allowed`](Self::is_call_allowed) (or [`check`](Self::check))
/// before an attempt and report the outcome with
/// [`record_success`](Self::record_success) or
/// [`record_failure`](Self::record_failure).
///
/// # States
///
/// - **Closed**: Requests pass through, consecutive failures are counted.
/// - **Open**: Requests are rejected until `next_retry_at`. The cooldown
///   doubles with every failure beyond the threshold, up to a cap.
/// - **Half-Open**: Exactly one trial request is in flight. Other callers
///   are rejected until its outcome is recorded.
///
/// # Example
///
/// ```rust
/// use tierguard::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
///
/// let breaker = CircuitBreaker::new("postgres", CircuitBreakerConfig::default());
/// if breaker.is_call_allowed() {
///     // ... attempt the operation ...
///     breaker.record_success();
/// }
/// ```
pub struct CircuitBreaker {
    /// Name of the guarded backend.
    name: String,
    /// Current state of the circuit.
    state: RwLock<BreakerState>,
    /// Configuration.
    config: CircuitBreakerConfig,
    /// Metrics.
    metrics: RwLock<BreakerMetrics>,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker for the named backend.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(BreakerState::closed()),
            config,
            metrics: RwLock::new(BreakerMetrics::new()),
        }
    }

    /// Creates a new circuit breaker with default configuration.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Returns the name of the guarded backend.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns a snapshot of the current state.
    pub fn current_state(&self) -> CircuitBreakerState {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .snapshot(Instant::now())
    }

    /// Returns the current status.
    pub fn status(&self) -> CircuitStatus {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .status()
    }

    /// Returns a copy of the current metrics.
    pub fn metrics(&self) -> BreakerMetrics {
        self.metrics
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns `true` if a call may be attempted now.
    ///
    /// An Open circuit whose cooldown has elapsed moves to Half-Open and
    /// grants the trial to this caller. The caller must then report the
    /// outcome, or call [`abandon_probe`](Self::abandon_probe) if it ends up
    /// not touching the backend.
    pub fn is_call_allowed(&self) -> bool {
        self.check().is_ok()
    }

    /// Like [`is_call_allowed`](Self::is_call_allowed), returning the
    /// rejection as a `CircuitOpen` error.
    pub fn check(&self) -> Result<(), StoreError> {
        let mut state = self.state_mut();
        let now = Instant::now();

        match &*state {
            BreakerState::Closed { .. } => Ok(()),

            BreakerState::Open {
                consecutive_failures,
                opened_at,
                next_retry_at,
            } => {
                if now >= *next_retry_at {
                    tracing::info!(
                        backend = %self.name,
                        consecutive_failures = *consecutive_failures,
                        "Circuit half-open, admitting trial call"
                    );
                    *state = BreakerState::HalfOpen {
                        consecutive_failures: *consecutive_failures,
                        opened_at: *opened_at,
                        probe_in_flight: true,
                    };
                    Ok(())
                } else {
                    self.reject(Some(*next_retry_at - now))
                }
            }

            BreakerState::HalfOpen {
                consecutive_failures,
                opened_at,
                probe_in_flight,
            } => {
                if *probe_in_flight {
                    self.reject(None)
                } else {
                    *state = BreakerState::HalfOpen {
                        consecutive_failures: *consecutive_failures,
                        opened_at: *opened_at,
                        probe_in_flight: true,
                    };
                    Ok(())
                }
            }
        }
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        let mut state = self.state_mut();
        self.metrics_mut().record_success();

        match &*state {
            BreakerState::Closed {
                consecutive_failures,
            } => {
                if *consecutive_failures > 0 {
                    *state = BreakerState::closed();
                }
            }

            BreakerState::HalfOpen { .. } => {
                *state = BreakerState::closed();
                self.metrics_mut().record_closed();
                tracing::info!(backend = %self.name, "Circuit closed after successful trial");
            }

            BreakerState::Open { .. } => {
                // A call admitted before the circuit opened; the cooldown stands.
                tracing::debug!(backend = %self.name, "Late success while circuit open");
            }
        }
    }

    /// Records a failed call.
    pub fn record_failure(&self) {
        let mut state = self.state_mut();
        self.metrics_mut().record_failure();
        let now = Instant::now();

        match &*state {
            BreakerState::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures + 1;
                if failures >= self.config.failure_threshold {
                    *state = self.opened(failures, now);
                } else {
                    *state = BreakerState::Closed {
                        consecutive_failures: failures,
                    };
                }
            }

            BreakerState::HalfOpen {
                consecutive_failures,
                ..
            } => {
                *state = self.opened(consecutive_failures + 1, now);
            }

            BreakerState::Open { .. } => {
                // Already open, nothing to do
            }
        }
    }

    /// Records the outcome of a failed call, consulting the failure policy.
    ///
    /// Errors the policy does not count (such as rejections) prove the
    /// backend answered, and are recorded as a success.
    pub fn record_error(&self, error: &StoreError) {
        if self.config.failure_policy.should_count(error) {
            self.record_failure();
        } else {
            self.record_success();
        }
    }

    /// Releases a half-open trial without reporting an outcome.
    pub fn abandon_probe(&self) {
        let mut state = self.state_mut();
        if let BreakerState::HalfOpen {
            consecutive_failures,
            opened_at,
            probe_in_flight: true,
        } = &*state
        {
            *state = BreakerState::HalfOpen {
                consecutive_failures: *consecutive_failures,
                opened_at: *opened_at,
                probe_in_flight: false,
            };
        }
    }

    /// Forces the circuit into the open state.
    pub fn force_open(&self) {
        let mut state = self.state_mut();
        let failures = state
            .consecutive_failures()
            .max(self.config.failure_threshold);
        *state = self.opened(failures, Instant::now());
    }

    /// Forces the circuit into the closed state.
    pub fn force_close(&self) {
        *self.state_mut() = BreakerState::closed();
        self.metrics_mut().record_closed();
    }

    /// Resets the circuit breaker state and metrics.
    pub fn reset(&self) {
        *self.state_mut() = BreakerState::closed();
        *self.metrics_mut() = BreakerMetrics::new();
    }

    fn opened(&self, failures: u32, now: Instant) -> BreakerState {
        let backoff = self.config.backoff_for(failures);
        self.metrics_mut().record_opened();
        tracing::warn!(
            backend = %self.name,
            consecutive_failures = failures,
            backoff_secs = backoff.as_secs(),
            "Circuit opened"
        );
        BreakerState::Open {
            consecutive_failures: failures,
            opened_at: now,
            next_retry_at: now + backoff,
        }
    }

    fn reject(&self, retry_in: Option<std::time::Duration>) -> Result<(), StoreError> {
        self.metrics_mut().record_rejected();
        Err(StoreError::CircuitOpen {
            backend: self.name.clone(),
            retry_in,
        })
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, BreakerState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn metrics_mut(&self) -> RwLockWriteGuard<'_, BreakerMetrics> {
        self.metrics
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field(
                "state",
                &*self
                    .state
                    .read()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            )
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::default()
                .with_failure_threshold(threshold)
                .with_base_backoff(Duration::from_secs(60))
                .with_max_backoff(Duration::from_secs(300)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_counts_failures_below_threshold() {
        let breaker = breaker(5);
        for _ in 0..4 {
            breaker.record_failure();
        }
        let state = breaker.current_state();
        assert!(state.is_closed());
        assert_eq!(state.consecutive_failures, 4);
        assert!(breaker.is_call_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failures() {
        let breaker = breaker(5);
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.current_state().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold_and_rejects_until_retry() {
        let breaker = breaker(5);
        for _ in 0..5 {
            breaker.record_failure();
        }

        let state = breaker.current_state();
        assert!(state.is_open());
        assert_eq!(state.retry_in, Some(Duration::from_secs(60)));
        assert!(!breaker.is_call_allowed());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!breaker.is_call_allowed());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(breaker.is_call_allowed());
        assert_eq!(breaker.status(), CircuitStatus::HalfOpen);
        assert_eq!(breaker.metrics().trips, 1);
        assert_eq!(breaker.metrics().fast_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_exactly_one_probe() {
        let breaker = breaker(1);
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(60)).await;

        assert!(breaker.is_call_allowed());
        assert!(!breaker.is_call_allowed());
        assert!(!breaker.is_call_allowed());

        breaker.record_success();
        assert!(breaker.current_state().is_closed());
        assert!(breaker.is_call_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_with_longer_backoff() {
        let breaker = breaker(2);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.current_state().retry_in, Some(Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(breaker.is_call_allowed());
        breaker.record_failure();

        let state = breaker.current_state();
        assert!(state.is_open());
        assert_eq!(state.consecutive_failures, 3);
        assert_eq!(state.retry_in, Some(Duration::from_secs(120)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_probe_is_released() {
        let breaker = breaker(1);
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(60)).await;

        assert!(breaker.is_call_allowed());
        breaker.abandon_probe();
        assert!(breaker.is_call_allowed());
        assert!(!breaker.is_call_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_counts_as_success() {
        let breaker = breaker(2);
        breaker.record_failure();
        breaker.record_error(&StoreError::rejected("test", "bad input"));
        assert_eq!(breaker.current_state().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_see_single_probe() {
        let breaker = Arc::new(breaker(1));
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(60)).await;

        let mut handles = Vec::new();
        for _ in 0..32 {
            let breaker = Arc::clone(&breaker);
            handles.push(tokio::spawn(async move { breaker.is_call_allowed() }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
    }

    #[test]
    fn test_force_open_close() {
        let breaker = CircuitBreaker::with_defaults("test");
        assert!(breaker.current_state().is_closed());

        breaker.force_open();
        assert!(breaker.current_state().is_open());
        assert!(!breaker.is_call_allowed());

        breaker.force_close();
        assert!(breaker.current_state().is_closed());
    }
}
