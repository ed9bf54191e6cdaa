//! Environment-style configuration for the whole data-access layer.
//!
//! [`Config::default()`] is fully operable. [`Config::from_env()`] starts
//! from the defaults and overrides whatever `TIERGUARD_*` variables are set:
//!
//! | Variable | Default |
//! |---|---|
//! | `TIERGUARD_FAILURE_THRESHOLD` | 5 |
//! | `TIERGUARD_BASE_BACKOFF_SECS` | 60 |
//! | `TIERGUARD_MAX_BACKOFF_SECS` | 300 |
//! | `TIERGUARD_MAX_RETRIES` | 3 |
//! | `TIERGUARD_RETRY_BACKOFF_MS` | `1000,2000,5000` |
//! | `TIERGUARD_ATTEMPT_TIMEOUT_MS` | 10000 |
//! | `TIERGUARD_CACHE_DEFAULT_TTL_SECS` | 300 |
//! | `TIERGUARD_CACHE_TTLS` | `analytics:300,posts:60,learning:1800,health:30` |
//! | `TIERGUARD_CACHE_FALLBACK_CAPACITY` | 1000 |
//! | `TIERGUARD_CACHE_RECONNECT_SECS` | 30 |
//! | `TIERGUARD_RATE_LIMIT` | 60 |
//! | `TIERGUARD_RATE_WINDOW_SECS` | 60 |
//! | `TIERGUARD_DEDUP_LOOKBACK_HOURS` | 24 |
//! | `TIERGUARD_DEDUP_SIMILARITY` | 0.85 |
//! | `TIERGUARD_DEDUP_WINDOW` | 50 |
//! | `TIERGUARD_HEALTH_INTERVAL_SECS` | 60 |
//! | `TIERGUARD_HEALTH_PROBE_TIMEOUT_MS` | 5000 |
//! | `TIERGUARD_DEFERRED_MAX_RETRIES` | 5 |
//! | `TIERGUARD_LOG_LEVEL` | `info` |
//! | `TIERGUARD_LOG_FORMAT` | `pretty` |
//! | `TIERGUARD_REST_URL`, `TIERGUARD_REST_KEY` | unset (feature `rest`) |
//! | `TIERGUARD_REDIS_URL` | unset (feature `redis`) |

use crate::cache::CacheConfig;
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::core::ConfigError;
use crate::dedup::DedupConfig;
use crate::executor::ExecutorConfig;
use crate::health::HealthMonitorConfig;
use crate::limiter::RateLimitConfig;

#[cfg(feature = "rest")]
use crate::backends::RestStoreConfig;

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, multi-line.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("{other} (expected 'json' or 'pretty')")),
        }
    }
}

/// Logging settings consumed by [`init_tracing`](crate::telemetry::init_tracing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `tierguard=debug`.
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Circuit breaker thresholds and backoff.
    pub breaker: CircuitBreakerConfig,
    /// Retries and deferred writes.
    pub executor: ExecutorConfig,
    /// Hot-path cache TTLs and fallback sizing.
    pub cache: CacheConfig,
    /// Rate limiter defaults.
    pub rate_limit: RateLimitConfig,
    /// Deduplicator settings.
    pub dedup: DedupConfig,
    /// Health monitor timing.
    pub health: HealthMonitorConfig,
    /// Logging.
    pub logging: LoggingConfig,
    /// REST durable store credentials, when both URL and key are set.
    #[cfg(feature = "rest")]
    pub rest: Option<RestStoreConfig>,
    /// Redis connection URL.
    #[cfg(feature = "redis")]
    pub redis_url: Option<String>,
}

impl Config {
    /// Loads configuration from `TIERGUARD_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let mut config = Config::default();

        if let Some(n) = vars.parse("TIERGUARD_FAILURE_THRESHOLD")? {
            config.breaker.failure_threshold = n;
        }
        if let Some(secs) = vars.parse("TIERGUARD_BASE_BACKOFF_SECS")? {
            config.breaker.base_backoff = Duration::from_secs(secs);
        }
        if let Some(secs) = vars.parse("TIERGUARD_MAX_BACKOFF_SECS")? {
            config.breaker.max_backoff = Duration::from_secs(secs);
        }

        let retry = &mut config.executor.retry;
        if let Some(n) = vars.parse("TIERGUARD_MAX_RETRIES")? {
            retry.max_attempts = n;
        }
        if let Some(schedule) = vars.get("TIERGUARD_RETRY_BACKOFF_MS") {
            retry.backoff = parse_millis_list("TIERGUARD_RETRY_BACKOFF_MS", &schedule)?;
        }
        if let Some(ms) = vars.parse("TIERGUARD_ATTEMPT_TIMEOUT_MS")? {
            retry.attempt_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = vars.parse("TIERGUARD_DEFERRED_MAX_RETRIES")? {
            config.executor.deferred_max_retries = n;
        }

        if let Some(secs) = vars.parse("TIERGUARD_CACHE_DEFAULT_TTL_SECS")? {
            config.cache.default_ttl = Duration::from_secs(secs);
        }
        if let Some(ttls) = vars.get("TIERGUARD_CACHE_TTLS") {
            for (class, ttl) in parse_class_ttls("TIERGUARD_CACHE_TTLS", &ttls)? {
                config.cache.class_ttls.insert(class, ttl);
            }
        }
        if let Some(n) = vars.parse("TIERGUARD_CACHE_FALLBACK_CAPACITY")? {
            config.cache.fallback_capacity = n;
        }
        if let Some(secs) = vars.parse("TIERGUARD_CACHE_RECONNECT_SECS")? {
            config.cache.reconnect_interval = Duration::from_secs(secs);
        }

        if let Some(n) = vars.parse("TIERGUARD_RATE_LIMIT")? {
            config.rate_limit.default_limit = n;
        }
        if let Some(secs) = vars.parse("TIERGUARD_RATE_WINDOW_SECS")? {
            config.rate_limit.default_window = Duration::from_secs(secs);
        }

        if let Some(hours) = vars.parse::<u64>("TIERGUARD_DEDUP_LOOKBACK_HOURS")? {
            let secs = hours.checked_mul(3600).ok_or_else(|| ConfigError::InvalidVar {
                var: "TIERGUARD_DEDUP_LOOKBACK_HOURS".into(),
                reason: format!("{hours} hours is out of range"),
            })?;
            config.dedup.lookback = Duration::from_secs(secs);
        }
        if let Some(threshold) = vars.parse("TIERGUARD_DEDUP_SIMILARITY")? {
            config.dedup.similarity_threshold = threshold;
        }
        if let Some(n) = vars.parse("TIERGUARD_DEDUP_WINDOW")? {
            config.dedup.recent_window = n;
        }

        if let Some(secs) = vars.parse("TIERGUARD_HEALTH_INTERVAL_SECS")? {
            config.health.interval = Duration::from_secs(secs);
        }
        if let Some(ms) = vars.parse("TIERGUARD_HEALTH_PROBE_TIMEOUT_MS")? {
            config.health.probe_timeout = Duration::from_millis(ms);
        }

        if let Some(level) = vars.get("TIERGUARD_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = vars.parse("TIERGUARD_LOG_FORMAT")? {
            config.logging.format = format;
        }

        #[cfg(feature = "rest")]
        {
            config.rest = match (vars.get("TIERGUARD_REST_URL"), vars.get("TIERGUARD_REST_KEY")) {
                (Some(url), Some(key)) => Some(RestStoreConfig::new(url, key)),
                (Some(_), None) => {
                    tracing::warn!("TIERGUARD_REST_URL is set without TIERGUARD_REST_KEY; REST store disabled");
                    None
                }
                _ => None,
            };
        }

        #[cfg(feature = "redis")]
        {
            config.redis_url = vars.get("TIERGUARD_REDIS_URL");
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejects inconsistent settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid("failure threshold must be at least 1".into()));
        }
        if self.breaker.max_backoff < self.breaker.base_backoff {
            return Err(ConfigError::Invalid(format!(
                "max backoff {:?} is below base backoff {:?}",
                self.breaker.max_backoff, self.breaker.base_backoff
            )));
        }
        if self.executor.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("max retries must be at least 1".into()));
        }
        let threshold = self.dedup.similarity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "similarity threshold {threshold} is outside (0, 1]"
            )));
        }
        if self.cache.fallback_capacity == 0 {
            return Err(ConfigError::Invalid("fallback capacity must be at least 1".into()));
        }
        Ok(())
    }
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T>(&self, name: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(name)
            .map(|value| value.parse::<T>().map_err(|e| invalid(name, e)))
            .transpose()
    }
}

fn invalid(var: &str, reason: impl Display) -> ConfigError {
    ConfigError::InvalidVar {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_millis_list(var: &str, value: &str) -> Result<Vec<Duration>, ConfigError> {
    value
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| invalid(var, format!("{part:?}: {e}")))
        })
        .collect()
}

fn parse_class_ttls(var: &str, value: &str) -> Result<Vec<(String, Duration)>, ConfigError> {
    value
        .split(',')
        .map(|pair| {
            let (class, secs) = pair
                .split_once(':')
                .ok_or_else(|| invalid(var, format!("{pair:?} is not class:seconds")))?;
            let secs = secs
                .trim()
                .parse::<u64>()
                .map_err(|e| invalid(var, format!("{pair:?}: {e}")))?;
            Ok((class.trim().to_string(), Duration::from_secs(secs)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.base_backoff, Duration::from_secs(60));
        assert_eq!(config.executor.retry.max_attempts, 3);
        assert_eq!(config.cache.ttl_for("posts"), Duration::from_secs(60));
        assert_eq!(config.rate_limit.default_limit, 60);
        assert_eq!(config.dedup.lookback, Duration::from_secs(24 * 3600));
        assert_eq!(config.health.interval, Duration::from_secs(60));
        assert_eq!(config.logging, LoggingConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("TIERGUARD_FAILURE_THRESHOLD", "3"),
            ("TIERGUARD_RETRY_BACKOFF_MS", "100, 250"),
            ("TIERGUARD_ATTEMPT_TIMEOUT_MS", "1500"),
            ("TIERGUARD_CACHE_TTLS", "posts:15,reports:600"),
            ("TIERGUARD_DEDUP_LOOKBACK_HOURS", "6"),
            ("TIERGUARD_DEDUP_SIMILARITY", "0.9"),
            ("TIERGUARD_LOG_FORMAT", "JSON"),
            ("TIERGUARD_LOG_LEVEL", "tierguard=debug"),
        ])
        .unwrap();

        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(
            config.executor.retry.backoff,
            vec![Duration::from_millis(100), Duration::from_millis(250)]
        );
        assert_eq!(config.executor.retry.attempt_timeout, Duration::from_millis(1500));
        assert_eq!(config.cache.ttl_for("posts"), Duration::from_secs(15));
        assert_eq!(config.cache.ttl_for("reports"), Duration::from_secs(600));
        assert_eq!(config.cache.ttl_for("learning"), Duration::from_secs(1800));
        assert_eq!(config.dedup.lookback, Duration::from_secs(6 * 3600));
        assert_eq!(config.dedup.similarity_threshold, 0.9);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "tierguard=debug");
    }

    #[test]
    fn test_invalid_value_names_variable() {
        let err = load(&[("TIERGUARD_MAX_RETRIES", "many")]).unwrap_err();
        match err {
            ConfigError::InvalidVar { var, .. } => assert_eq!(var, "TIERGUARD_MAX_RETRIES"),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = load(&[("TIERGUARD_CACHE_TTLS", "posts=60")]).unwrap_err();
        assert!(err.to_string().contains("TIERGUARD_CACHE_TTLS"));

        assert!(load(&[("TIERGUARD_LOG_FORMAT", "xml")]).is_err());
    }

    #[test]
    fn test_lookback_out_of_range() {
        let hours = u64::MAX.to_string();
        let err = load(&[("TIERGUARD_DEDUP_LOOKBACK_HOURS", hours.as_str())]).unwrap_err();
        match err {
            ConfigError::InvalidVar { var, .. } => assert_eq!(var, "TIERGUARD_DEDUP_LOOKBACK_HOURS"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_blank_values_are_ignored() {
        let config = load(&[("TIERGUARD_RATE_LIMIT", "  ")]).unwrap();
        assert_eq!(config.rate_limit.default_limit, 60);
    }

    #[test]
    fn test_validation() {
        assert!(load(&[("TIERGUARD_FAILURE_THRESHOLD", "0")]).is_err());
        assert!(load(&[("TIERGUARD_MAX_RETRIES", "0")]).is_err());
        assert!(load(&[("TIERGUARD_DEDUP_SIMILARITY", "1.5")]).is_err());
        assert!(load(&[("TIERGUARD_DEDUP_SIMILARITY", "0")]).is_err());
        assert!(load(&[("TIERGUARD_CACHE_FALLBACK_CAPACITY", "0")]).is_err());
        assert!(load(&[
            ("TIERGUARD_BASE_BACKOFF_SECS", "120"),
            ("TIERGUARD_MAX_BACKOFF_SECS", "60"),
        ])
        .is_err());
    }

    #[test]
    fn test_from_env_without_overrides() {
        // Only meaningful when no TIERGUARD_* variables are exported.
        if env::vars().any(|(k, _)| k.starts_with("TIERGUARD_")) {
            return;
        }
        assert!(Config::from_env().is_ok());
    }
}
