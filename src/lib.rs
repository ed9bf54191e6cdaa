//! # Tierguard
//!
//! A resilient dual-tier data-access layer: a fast hot-path cache in front
//! of a durable source-of-truth store, guarded by a circuit breaker, with
//! fixed-window rate limiting and content deduplication on top.
//!
//! ## Overview
//!
//! Tierguard sits between application logic and its backends so that a
//! backend outage degrades the application instead of halting it:
//!
//! - Reads and writes go through a [`ResilientQueryExecutor`] that retries
//!   transient failures, bounds every attempt with a timeout and returns a
//!   caller-supplied fallback instead of an error
//! - A [`CircuitBreaker`] stops calls to a failing store and backs off
//!   exponentially before letting a single trial call through
//! - The [`HotPathCache`] falls back to an in-process store whenever the
//!   cache backend is unreachable, without surfacing an error
//! - A [`RateLimiter`] and a [`ContentDeduplicator`] build on the cache's
//!   atomic primitives
//! - A [`HealthMonitor`] probes both tiers in the background
//!
//! ## Quick Start
//!
//! ```rust
//! use tierguard::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new().with_table("posts", vec![json!({"id": 1, "author": "ada"})]);
//! let cache = Arc::new(HotPathCache::in_process(CacheConfig::default()));
//!
//! let executor = ResilientQueryExecutor::builder()
//!     .with_store(store)
//!     .with_cache(cache.clone())
//!     .build()?;
//!
//! let policy = CachePolicy::for_class("posts:ada", "posts", cache.config());
//! let outcome = executor
//!     .execute_query(&Query::select("posts").eq("author", json!("ada")), Vec::new(), Some(&policy))
//!     .await;
//!
//! assert!(outcome.error.is_none());
//! assert_eq!(outcome.data.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `default` - Includes tokio runtime support
//! - `tokio-runtime` - Async support via tokio
//! - `rest` - PostgREST-style HTTP durable store
//! - `redis` - Redis cache backend
//!
//! ## Architecture
//!
//! - **Core**: Query model, backend traits, errors, content hashing
//! - **Backends**: In-memory, REST and Redis implementations of the traits
//! - **Circuit Breaker**: Fail-fast gate in front of the durable store
//! - **Cache**: Hot-path cache with in-process fallback
//! - **Executor**: Retry, timeout, fallback and deferred writes
//! - **Limiter**: Fixed-window rate limiting
//! - **Dedup**: Exact and near-duplicate content detection
//! - **Health**: Shared availability, health reports, background probing

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod backends;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod core;
pub mod dedup;
pub mod executor;
pub mod health;
pub mod limiter;
pub mod telemetry;

// Re-export commonly used types at the crate root
pub use crate::core::{
    CacheBackend, ContentHash, ContentHasher, DurableStore, ErrorKind, Query, QueryOutcome,
    Rows, StoreError, StoreResult, WriteOutcome,
};

pub use crate::cache::{CacheConfig, CachePolicy, HotPathCache};
pub use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitStatus};
pub use crate::config::Config;
pub use crate::dedup::{ContentDeduplicator, DedupConfig, DuplicateCheck};
pub use crate::executor::{ExecutorConfig, ResilientQueryExecutor, RetryConfig};
pub use crate::health::{HealthMonitor, HealthMonitorConfig, HealthReport, HealthStatus};
pub use crate::limiter::{RateDecision, RateLimitConfig, RateLimiter};

/// Prelude module for convenient imports.
///
/// ```rust
/// use tierguard::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backends::{MemoryCacheBackend, MemoryStore};
    pub use crate::cache::{CacheConfig, CachePolicy, HotPathCache};
    pub use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitStatus};
    pub use crate::config::Config;
    pub use crate::core::{
        CacheBackend, DurableStore, ErrorKind, Query, QueryOutcome, Rows, StoreError, StoreResult,
        WriteOutcome,
    };
    pub use crate::dedup::{ContentDeduplicator, DedupConfig, DuplicateCheck};
    pub use crate::executor::{ExecutorConfig, ResilientQueryExecutor, RetryConfig};
    pub use crate::health::{HealthMonitor, HealthMonitorConfig, HealthReport, HealthStatus};
    pub use crate::limiter::{RateDecision, RateLimitConfig, RateLimiter};
}
