//! Backend implementations.
//!
//! This module contains implementations of the [`DurableStore`] and
//! [`CacheBackend`] traits.
//!
//! ## Available Backends
//!
//! - [`memory`] - In-memory durable store with fault injection
//! - [`memory_cache`] - In-memory cache with TTL and counter semantics
//! - [`rest`] - PostgREST-style HTTP store (requires `rest` feature)
//! - [`redis`](mod@redis) - Redis cache (requires `redis` feature)
//!
//! ## Implementing a Custom Backend
//!
//! ```rust,ignore
//! use tierguard::core::{DurableStore, Query, Rows, StoreError, StoreResult};
//! use async_trait::async_trait;
//!
//! #[derive(Debug)]
//! pub struct SqliteStore {
//!     // connection pool, etc.
//! }
//!
//! #[async_trait]
//! impl DurableStore for SqliteStore {
//!     fn name(&self) -> &str {
//!         "sqlite"
//!     }
//!
//!     async fn execute(&self, query: &Query) -> StoreResult<Rows> {
//!         // Map driver errors onto StoreError kinds here.
//!         todo!()
//!     }
//!
//!     async fn probe(&self) -> StoreResult<()> {
//!         Ok(())
//!     }
//! }
//! ```
//!
//! [`DurableStore`]: crate::core::DurableStore
//! [`CacheBackend`]: crate::core::CacheBackend

pub mod memory;
pub mod memory_cache;

#[cfg(feature = "rest")]
pub mod rest;

#[cfg(feature = "redis")]
pub mod redis;

// Re-exports
pub use memory::MemoryStore;
pub use memory_cache::MemoryCacheBackend;

#[cfg(feature = "rest")]
pub use rest::{RestStore, RestStoreConfig};

#[cfg(feature = "redis")]
pub use self::redis::RedisCacheBackend;
