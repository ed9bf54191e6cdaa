//! Hot-path cache.
//!
//! [`HotPathCache`] fronts an optional [`CacheBackend`] (Redis in production)
//! and absorbs every backend failure. While the backend is unreachable the
//! cache serves from a bounded in-process [`FallbackStore`] and retries the
//! backend after a reconnect interval.
//!
//! ## Guarantees
//!
//! - No cache method returns an error to its caller
//! - An expired entry is a miss, whichever store holds it
//! - Counter increments are atomic per key in both stores
//!
//! [`CacheBackend`]: crate::core::CacheBackend

mod config;
mod fallback;
mod hot_path;

pub use config::{expiry_after, CacheConfig, CachePolicy, MAX_TTL};
pub use fallback::{CacheEntry, EntryValue, FallbackStore};
pub use hot_path::{CacheMetrics, HotPathCache};
