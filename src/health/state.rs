//! Shared backend availability and the health report built from it.

use crate::circuit_breaker::{BreakerMetrics, CircuitBreakerState, CircuitStatus};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Whether a backend is reachable, as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Not observed yet.
    Unknown,
    /// Last observation succeeded.
    Available,
    /// Last observation failed.
    Unavailable,
}

impl Availability {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Available,
            2 => Self::Unavailable,
            _ => Self::Unknown,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Available => 1,
            Self::Unavailable => 2,
        }
    }

    fn from_bool(available: bool) -> Self {
        if available {
            Self::Available
        } else {
            Self::Unavailable
        }
    }
}

/// Backend availability shared between the executor and the health monitor.
///
/// Both backends start as [`Availability::Unknown`]. Writers go through the
/// crate-internal `set_*` methods; everyone else reads snapshots.
#[derive(Debug)]
pub struct ConnectionHealth {
    durable: AtomicU8,
    cache: AtomicU8,
    last_probe_at: RwLock<Option<DateTime<Utc>>>,
}

impl ConnectionHealth {
    /// Creates health state with nothing observed.
    pub fn new() -> Self {
        Self {
            durable: AtomicU8::new(Availability::Unknown.as_u8()),
            cache: AtomicU8::new(Availability::Unknown.as_u8()),
            last_probe_at: RwLock::new(None),
        }
    }

    /// Returns the durable store's availability.
    pub fn durable(&self) -> Availability {
        Availability::from_u8(self.durable.load(Ordering::Acquire))
    }

    /// Returns the cache backend's availability.
    pub fn cache(&self) -> Availability {
        Availability::from_u8(self.cache.load(Ordering::Acquire))
    }

    /// Returns `true` only if the durable store was last seen available.
    pub fn durable_available(&self) -> bool {
        self.durable() == Availability::Available
    }

    /// Returns `true` only if the cache backend was last seen available.
    pub fn cache_available(&self) -> bool {
        self.cache() == Availability::Available
    }

    /// Returns when the health monitor last completed a probe.
    pub fn last_probe_at(&self) -> Option<DateTime<Utc>> {
        *self.last_probe_at.read()
    }

    pub(crate) fn set_durable_available(&self, available: bool) {
        self.durable
            .store(Availability::from_bool(available).as_u8(), Ordering::Release);
    }

    pub(crate) fn set_cache_available(&self, available: bool) {
        self.cache
            .store(Availability::from_bool(available).as_u8(), Ordering::Release);
    }

    pub(crate) fn record_probe(&self, at: DateTime<Utc>) {
        *self.last_probe_at.write() = Some(at);
    }
}

impl Default for ConnectionHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Overall health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Everything is reachable.
    Healthy,
    /// Serving, with reduced guarantees.
    Degraded,
    /// Durable operations are failing or short-circuited.
    Critical,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A point-in-time view of the data-access layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall classification.
    pub status: HealthStatus,
    /// Circuit breaker snapshot.
    pub breaker: CircuitBreakerState,
    /// Circuit breaker counters.
    pub breaker_metrics: BreakerMetrics,
    /// Durable store availability.
    pub durable: Availability,
    /// Cache backend availability. `Unknown` when no backend is configured.
    pub cache: Availability,
    /// When the health monitor last probed.
    pub last_probe_at: Option<DateTime<Utc>>,
    /// Writes waiting for replay.
    pub deferred_writes: usize,
    /// When this report was built.
    pub generated_at: DateTime<Utc>,
}

impl HealthReport {
    /// Classifies the given observations.
    ///
    /// Critical when the breaker is open or the durable store was last seen
    /// down. Degraded when the breaker is half-open, the cache backend was
    /// last seen down, or deferred writes are pending.
    pub fn classify(
        breaker: CircuitStatus,
        durable: Availability,
        cache: Availability,
        deferred_writes: usize,
    ) -> HealthStatus {
        if breaker == CircuitStatus::Open || durable == Availability::Unavailable {
            HealthStatus::Critical
        } else if breaker == CircuitStatus::HalfOpen
            || cache == Availability::Unavailable
            || deferred_writes > 0
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Returns `true` if the status is healthy.
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_health_starts_unknown() {
        let health = ConnectionHealth::new();
        assert_eq!(health.durable(), Availability::Unknown);
        assert!(!health.durable_available());
        assert!(!health.cache_available());
        assert_eq!(health.last_probe_at(), None);

        health.set_durable_available(true);
        health.set_cache_available(false);
        assert!(health.durable_available());
        assert_eq!(health.cache(), Availability::Unavailable);
    }

    #[test]
    fn test_classify() {
        use Availability::*;

        assert_eq!(
            HealthReport::classify(CircuitStatus::Closed, Available, Available, 0),
            HealthStatus::Healthy
        );
        assert_eq!(
            HealthReport::classify(CircuitStatus::Closed, Unknown, Unknown, 0),
            HealthStatus::Healthy
        );
        assert_eq!(
            HealthReport::classify(CircuitStatus::Open, Available, Available, 0),
            HealthStatus::Critical
        );
        assert_eq!(
            HealthReport::classify(CircuitStatus::Closed, Unavailable, Available, 0),
            HealthStatus::Critical
        );
        assert_eq!(
            HealthReport::classify(CircuitStatus::HalfOpen, Available, Available, 0),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthReport::classify(CircuitStatus::Closed, Available, Unavailable, 0),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthReport::classify(CircuitStatus::Closed, Available, Available, 2),
            HealthStatus::Degraded
        );
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Critical).unwrap(),
            "\"critical\""
        );
    }
}
