//! Core traits for the tierguard library.
//!
//! This module defines the two backend seams: [`DurableStore`] for the
//! source of truth, and [`CacheBackend`] for the optional hot-path cache.

use crate::core::error::{CacheResult, StoreResult};
use crate::core::types::{CounterSnapshot, Query, Rows};

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// The durable, source-of-truth backend.
///
/// # Implementation Notes
///
/// - Implementations must be `Send + Sync` for use in async contexts.
/// - Map every transport or backend failure onto a [`StoreError`] kind at
///   this boundary. Transient problems are `OperationFailed`,
///   `BackendUnavailable` or `Timeout`; requests the backend understood and
///   refused are `Rejected`.
/// - `probe` should be the cheapest round trip the backend supports.
///
/// [`StoreError`]: crate::core::StoreError
///
/// # Example Implementation
///
/// ```rust,ignore
/// use tierguard::core::{DurableStore, Query, Rows, StoreResult};
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct MyStore;
///
/// #[async_trait]
/// impl DurableStore for MyStore {
///     fn name(&self) -> &str {
///         "my-store"
///     }
///
///     async fn execute(&self, query: &Query) -> StoreResult<Rows> {
///         todo!()
///     }
///
///     async fn probe(&self) -> StoreResult<()> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait DurableStore: Send + Sync + Debug {
    /// Returns a stable name for this backend, used in errors and logs.
    fn name(&self) -> &str;

    /// Executes a query and returns the affected or selected rows.
    async fn execute(&self, query: &Query) -> StoreResult<Rows>;

    /// Issues a minimal round trip to check reachability.
    async fn probe(&self) -> StoreResult<()>;
}

/// A key/value cache backend with TTLs and atomic counters.
///
/// The shape follows the Redis command set: `GET`, `SET EX`, `SET NX`,
/// `DEL`, `INCR` with an expiry applied on creation, and `PING`.
#[async_trait]
pub trait CacheBackend: Send + Sync + Debug {
    /// Returns a stable name for this backend.
    fn name(&self) -> &str;

    /// Gets a value. Expired entries are a miss.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Sets a value with a TTL, replacing any existing value.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Sets a value only if the key is absent or expired.
    ///
    /// Returns the existing value when the key was already present, in which
    /// case nothing is written. Must be atomic per key.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<Option<String>>;

    /// Deletes a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Atomically increments a counter.
    ///
    /// A missing or expired counter is created with count 1 and an expiry of
    /// `window`; an existing counter keeps its expiry.
    async fn incr_with_expiry(&self, key: &str, window: Duration) -> CacheResult<CounterSnapshot>;

    /// Reads a counter without modifying it.
    async fn counter(&self, key: &str) -> CacheResult<Option<CounterSnapshot>>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> CacheResult<()>;
}

/// An arc-wrapped durable store for shared ownership.
pub type ArcDurableStore = Arc<dyn DurableStore>;

/// An arc-wrapped cache backend for shared ownership.
pub type ArcCacheBackend = Arc<dyn CacheBackend>;
