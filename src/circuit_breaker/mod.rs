//! Circuit breaker for the durable backend.
//!
//! Consecutive store failures trip the breaker. While it is open, calls
//! fail fast without touching the store; once the backoff elapses a single
//! trial call decides whether it closes again.
//!
//! ## States
//!
//! - **Closed**: Calls reach the store and failures are counted.
//! - **Open**: Calls are refused until the backoff deadline passes.
//! - **Half-Open**: Exactly one trial call holds the probe slot.
//!
//! ## Usage
//!
//! ```rust
//! use tierguard::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::default()
//!     .with_failure_threshold(5)
//!     .with_base_backoff(Duration::from_secs(60));
//!
//! let breaker = CircuitBreaker::new("postgres", config);
//! assert!(breaker.is_call_allowed());
//! ```

mod breaker;
mod config;
mod state;

pub use breaker::CircuitBreaker;
pub use config::{CircuitBreakerConfig, FailurePolicy};
pub use state::{BreakerMetrics, CircuitBreakerState, CircuitStatus};
