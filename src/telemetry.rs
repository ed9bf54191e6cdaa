//! Tracing subscriber setup.
//!
//! The library itself only emits `tracing` events. Binaries and tests that
//! want to see them call [`init_tracing`] once at startup.

use crate::config::{LogFormat, LoggingConfig};

use thiserror::Error;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Error raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configured filter directive could not be parsed.
    #[error("invalid log filter '{directive}': {reason}")]
    InvalidFilter {
        /// The rejected directive.
        directive: String,
        /// Parser message.
        reason: String,
    },

    /// A global subscriber is already installed.
    #[error("failed to install tracing subscriber: {0}")]
    AlreadyInitialized(String),
}

/// Installs a global `fmt` subscriber.
///
/// `RUST_LOG` overrides `config.level` when set. Returns an error rather
/// than panicking if a global subscriber already exists.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let filter = build_filter(config)?;

    let fmt_layer = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|err| TelemetryError::AlreadyInitialized(err.to_string()))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|err| TelemetryError::InvalidFilter {
        directive: config.level.clone(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error() {
        let config = LoggingConfig::default();
        // Another test may have installed a subscriber first; either way the
        // second call in this test must fail without panicking.
        let _ = init_tracing(&config);
        assert!(matches!(
            init_tracing(&config),
            Err(TelemetryError::AlreadyInitialized(_)) | Err(TelemetryError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn test_filter_from_level() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: "tierguard=debug,warn".to_string(),
            format: LogFormat::Json,
        };
        assert!(build_filter(&config).is_ok());
    }
}
