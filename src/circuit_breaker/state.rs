//! Circuit breaker state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Public status of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
    /// Requests pass through.
    Closed,
    /// Requests are rejected until the cooldown elapses.
    Open,
    /// A single trial request is allowed through.
    HalfOpen,
}

impl fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Internal state of a circuit breaker.
#[derive(Debug, Clone)]
pub(crate) enum BreakerState {
    Closed {
        consecutive_failures: u32,
    },
    Open {
        consecutive_failures: u32,
        opened_at: Instant,
        next_retry_at: Instant,
    },
    HalfOpen {
        consecutive_failures: u32,
        opened_at: Instant,
        probe_in_flight: bool,
    },
}

impl BreakerState {
    pub(crate) fn closed() -> Self {
        Self::Closed {
            consecutive_failures: 0,
        }
    }

    pub(crate) fn status(&self) -> CircuitStatus {
        match self {
            Self::Closed { .. } => CircuitStatus::Closed,
            Self::Open { .. } => CircuitStatus::Open,
            Self::HalfOpen { .. } => CircuitStatus::HalfOpen,
        }
    }

    pub(crate) fn consecutive_failures(&self) -> u32 {
        match self {
            Self::Closed {
                consecutive_failures,
            }
            | Self::Open {
                consecutive_failures,
                ..
            }
            | Self::HalfOpen {
                consecutive_failures,
                ..
            } => *consecutive_failures,
        }
    }

    /// Builds a snapshot, converting monotonic instants to wall-clock times.
    pub(crate) fn snapshot(&self, now: Instant) -> CircuitBreakerState {
        let wall = Utc::now();
        let to_wall = |at: Instant| -> DateTime<Utc> {
            if at >= now {
                wall + chrono::Duration::from_std(at - now).unwrap_or_default()
            } else {
                wall - chrono::Duration::from_std(now - at).unwrap_or_default()
            }
        };

        match self {
            Self::Closed {
                consecutive_failures,
            } => CircuitBreakerState {
                status: CircuitStatus::Closed,
                consecutive_failures: *consecutive_failures,
                opened_at: None,
                next_retry_at: None,
                retry_in: None,
            },
            Self::Open {
                consecutive_failures,
                opened_at,
                next_retry_at,
            } => CircuitBreakerState {
                status: CircuitStatus::Open,
                consecutive_failures: *consecutive_failures,
                opened_at: Some(to_wall(*opened_at)),
                next_retry_at: Some(to_wall(*next_retry_at)),
                retry_in: Some(next_retry_at.saturating_duration_since(now)),
            },
            Self::HalfOpen {
                consecutive_failures,
                opened_at,
                ..
            } => CircuitBreakerState {
                status: CircuitStatus::HalfOpen,
                consecutive_failures: *consecutive_failures,
                opened_at: Some(to_wall(*opened_at)),
                next_retry_at: None,
                retry_in: Some(Duration::ZERO),
            },
        }
    }
}

impl Default for BreakerState {
    fn default() -> Self {
        Self::closed()
    }
}

/// A point-in-time view of a circuit breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    /// Current status.
    pub status: CircuitStatus,
    /// Consecutive failures since the last success.
    pub consecutive_failures: u32,
    /// When the circuit last opened, while Open or HalfOpen.
    pub opened_at: Option<DateTime<Utc>>,
    /// When an Open circuit will admit a trial call.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Time until a trial call is admitted.
    pub retry_in: Option<Duration>,
}

impl CircuitBreakerState {
    /// Returns `true` if the circuit is closed.
    pub fn is_closed(&self) -> bool {
        self.status == CircuitStatus::Closed
    }

    /// Returns `true` if the circuit is open.
    pub fn is_open(&self) -> bool {
        self.status == CircuitStatus::Open
    }

    /// Returns `true` if the circuit is half-open.
    pub fn is_half_open(&self) -> bool {
        self.status == CircuitStatus::HalfOpen
    }
}

/// Running counters for one breaker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BreakerMetrics {
    /// Store outcomes plus fast failures.
    pub calls: u64,
    /// Store calls that succeeded.
    pub store_successes: u64,
    /// Store calls that counted as failures.
    pub store_failures: u64,
    /// Calls refused without touching the store.
    pub fast_failures: u64,
    /// Transitions into Open.
    pub trips: u64,
    /// Transitions from HalfOpen back to Closed.
    pub recoveries: u64,
}

impl BreakerMetrics {
    /// All counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_success(&mut self) {
        self.calls += 1;
        self.store_successes += 1;
    }

    pub(crate) fn record_failure(&mut self) {
        self.calls += 1;
        self.store_failures += 1;
    }

    pub(crate) fn record_rejected(&mut self) {
        self.calls += 1;
        self.fast_failures += 1;
    }

    pub(crate) fn record_opened(&mut self) {
        self.trips += 1;
    }

    pub(crate) fn record_closed(&mut self) {
        self.recoveries += 1;
    }

    /// Share of store calls that failed, 0.0 when none were made.
    pub fn failure_rate(&self) -> f64 {
        let attempted = self.store_successes + self.store_failures;
        if attempted == 0 {
            return 0.0;
        }
        self.store_failures as f64 / attempted as f64
    }
}
