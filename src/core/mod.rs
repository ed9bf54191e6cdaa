//! Query model, backend seams and shared error types.
//!
//! - [`types`] - The `Query` model and counter snapshots
//! - [`traits`] - The `DurableStore` and `CacheBackend` backend seams
//! - [`error`] - Structured error types
//! - [`hasher`] - Normalized BLAKE3 content hashing
//! - [`result`] - Executor result structures

pub mod error;
pub mod hasher;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{CacheError, CacheResult, ConfigError, ErrorKind, StoreError, StoreResult};
pub use hasher::{ContentHash, ContentHasher};
pub use result::{QueryOutcome, WriteOutcome};
pub use traits::{ArcCacheBackend, ArcDurableStore, CacheBackend, DurableStore};
pub use types::{CounterSnapshot, Filter, FilterOp, Query, QueryAction, Rows};
