//! The rate limiter.

use crate::cache::HotPathCache;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Configuration for the rate limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Limit used by [`RateLimiter::check`].
    pub default_limit: u64,

    /// Window used by [`RateLimiter::check`].
    pub default_window: Duration,

    /// Prefix applied to every counter key.
    pub key_prefix: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_limit: 60,
            default_window: Duration::from_secs(60),
            key_prefix: "ratelimit:".to_string(),
        }
    }
}

impl RateLimitConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default limit.
    pub fn with_default_limit(mut self, limit: u64) -> Self {
        self.default_limit = limit;
        self
    }

    /// Sets the default window.
    pub fn with_default_window(mut self, window: Duration) -> Self {
        self.default_window = window;
        self
    }

    /// Sets the counter key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

/// Result of [`RateLimiter::check_and_increment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateDecision {
    /// Whether this call is within the limit.
    pub allowed: bool,
    /// Calls counted in the current window, including this one.
    pub count: u64,
    /// Calls left in the current window.
    pub remaining: u64,
    /// Time until the window resets.
    pub reset_in: Duration,
    /// Wall-clock time at which the window resets.
    pub reset_at: DateTime<Utc>,
}

/// Result of [`RateLimiter::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateStatus {
    /// Calls counted in the current window.
    pub count: u64,
    /// Calls left in the current window.
    pub remaining: u64,
    /// Time until the window resets; `None` when no window is open.
    pub reset_in: Option<Duration>,
    /// Wall-clock time at which the window resets.
    pub reset_at: Option<DateTime<Utc>>,
}

/// Fixed-window rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    cache: Arc<HotPathCache>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Creates a rate limiter counting in `cache`.
    pub fn new(cache: Arc<HotPathCache>, config: RateLimitConfig) -> Self {
        Self { cache, config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn counter_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    /// Counts a call against `key` and decides whether it is allowed.
    ///
    /// `allowed` is `count <= limit`; a limit of zero denies everything.
    pub async fn check_and_increment(&self, key: &str, limit: u64, window: Duration) -> RateDecision {
        let snapshot = self.cache.incr(&self.counter_key(key), window).await;
        let allowed = snapshot.count <= limit;

        if !allowed {
            debug!(
                key = key,
                count = snapshot.count,
                limit = limit,
                reset_in_secs = snapshot.expires_in.as_secs(),
                "Rate limit exceeded"
            );
        }

        RateDecision {
            allowed,
            count: snapshot.count,
            remaining: limit.saturating_sub(snapshot.count),
            reset_in: snapshot.expires_in,
            reset_at: wall_clock_after(snapshot.expires_in),
        }
    }

    /// Like [`check_and_increment`](Self::check_and_increment) with the configured defaults.
    pub async fn check(&self, key: &str) -> RateDecision {
        self.check_and_increment(key, self.config.default_limit, self.config.default_window)
            .await
    }

    /// Reports the current window for `key` without counting a call.
    pub async fn status(&self, key: &str, limit: u64) -> RateStatus {
        match self.cache.counter(&self.counter_key(key)).await {
            Some(snapshot) => RateStatus {
                count: snapshot.count,
                remaining: limit.saturating_sub(snapshot.count),
                reset_in: Some(snapshot.expires_in),
                reset_at: Some(wall_clock_after(snapshot.expires_in)),
            },
            None => RateStatus {
                count: 0,
                remaining: limit,
                reset_in: None,
                reset_at: None,
            },
        }
    }

    /// Ends the current window for `key`.
    pub async fn reset(&self, key: &str) {
        self.cache.delete(&self.counter_key(key)).await;
    }
}

fn wall_clock_after(duration: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryCacheBackend;
    use crate::cache::CacheConfig;

    fn limiter() -> RateLimiter {
        let cache = HotPathCache::new(Arc::new(MemoryCacheBackend::new()), CacheConfig::default());
        RateLimiter::new(Arc::new(cache), RateLimitConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_limit_and_reset() {
        let limiter = limiter();
        let window = Duration::from_secs(10);

        for expected in 1..=5 {
            let decision = limiter.check_and_increment("acct", 5, window).await;
            assert!(decision.allowed);
            assert_eq!(decision.count, expected);
            assert_eq!(decision.remaining, 5 - expected);
        }

        let sixth = limiter.check_and_increment("acct", 5, window).await;
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);

        tokio::time::advance(Duration::from_secs(11)).await;
        let fresh = limiter.check_and_increment("acct", 5, window).await;
        assert!(fresh.allowed);
        assert_eq!(fresh.count, 1);
        assert_eq!(fresh.reset_in, window);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_does_not_increment() {
        let limiter = limiter();
        assert_eq!(limiter.status("acct", 3).await.count, 0);

        limiter.check_and_increment("acct", 3, Duration::from_secs(30)).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        let status = limiter.status("acct", 3).await;
        assert_eq!(status.count, 1);
        assert_eq!(status.remaining, 2);
        assert_eq!(status.reset_in, Some(Duration::from_secs(20)));
        assert_eq!(limiter.status("acct", 3).await.count, 1);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = limiter();
        let window = Duration::from_secs(60);
        assert!(limiter.check_and_increment("a", 1, window).await.allowed);
        assert!(!limiter.check_and_increment("a", 1, window).await.allowed);
        assert!(limiter.check_and_increment("b", 1, window).await.allowed);

        limiter.reset("a").await;
        assert!(limiter.check_and_increment("a", 1, window).await.allowed);
    }

    #[tokio::test]
    async fn test_zero_limit_denies() {
        let limiter = limiter();
        let decision = limiter
            .check_and_increment("closed", 0, Duration::from_secs(1))
            .await;
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn test_defaults() {
        let limiter = limiter();
        let decision = limiter.check("acct").await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 59);
    }
}
