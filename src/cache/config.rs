//! Cache configuration and per-call cache policies.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Longest lifetime any cache entry is given. Longer TTLs are clamped.
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

/// Returns `now + ttl` with `ttl` clamped to [`MAX_TTL`].
pub fn expiry_after(now: Instant, ttl: Duration) -> Instant {
    let ttl = ttl.min(MAX_TTL);
    now.checked_add(ttl).unwrap_or(now)
}

/// Configuration for the hot-path cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL used when a content class has no explicit entry.
    pub default_ttl: Duration,

    /// TTLs per content class (e.g. `posts`, `analytics`).
    pub class_ttls: HashMap<String, Duration>,

    /// Maximum number of entries held by the in-process fallback.
    pub fallback_capacity: usize,

    /// How long to serve from the fallback before retrying the backend.
    pub reconnect_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let class_ttls = [
            ("analytics", 300),
            ("posts", 60),
            ("learning", 1800),
            ("health", 30),
        ]
        .into_iter()
        .map(|(class, secs)| (class.to_string(), Duration::from_secs(secs)))
        .collect();

        Self {
            default_ttl: Duration::from_secs(300),
            class_ttls,
            fallback_capacity: 1000,
            reconnect_interval: Duration::from_secs(30),
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Sets the TTL for a content class.
    pub fn with_class_ttl(mut self, class: impl Into<String>, ttl: Duration) -> Self {
        self.class_ttls.insert(class.into(), ttl);
        self
    }

    /// Sets the in-process fallback capacity.
    pub fn with_fallback_capacity(mut self, capacity: usize) -> Self {
        self.fallback_capacity = capacity;
        self
    }

    /// Sets the backend reconnect interval.
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Returns the TTL for a content class, or the default TTL.
    pub fn ttl_for(&self, class: &str) -> Duration {
        self.class_ttls
            .get(class)
            .copied()
            .unwrap_or(self.default_ttl)
    }
}

/// Where and for how long an executor result is cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    /// Cache key.
    pub key: String,
    /// Time to live for the written-back value.
    pub ttl: Duration,
}

impl CachePolicy {
    /// Creates a policy with an explicit TTL.
    pub fn new(key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            ttl,
        }
    }

    /// Creates a policy using the TTL configured for a content class.
    pub fn for_class(key: impl Into<String>, class: &str, config: &CacheConfig) -> Self {
        Self::new(key, config.ttl_for(class))
    }
}
