//! Content deduplication.
//!
//! Two checks run in order:
//!
//! 1. **Exact**: the normalized content is hashed with BLAKE3 and recorded in
//!    the hot-path cache with a TTL. A second check of the same (or a
//!    cosmetically different) text finds the record.
//! 2. **Near**: the normalized token set is compared against a bounded window
//!    of recent content using Jaccard similarity.
//!
//! Both checks fail open. A broken record or an encoding failure reports
//! the content as unique with [`DuplicateReason::CheckFailed`] and logs a
//! warning tagged `reason = "dedup_check_failed"`.
//!
//! ```rust
//! use tierguard::cache::{CacheConfig, HotPathCache};
//! use tierguard::dedup::{ContentDeduplicator, DedupConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let cache = Arc::new(HotPathCache::in_process(CacheConfig::default()));
//! let dedup = ContentDeduplicator::new(cache, DedupConfig::default());
//! let ttl = Duration::from_secs(3600);
//!
//! assert!(!dedup.check_duplicate("Hello, world!", None, ttl).await.is_duplicate);
//! assert!(dedup.check_duplicate("hello world", None, ttl).await.is_duplicate);
//! # }
//! ```

mod deduplicator;

pub use deduplicator::{
    jaccard, ContentDeduplicator, ContentHashRecord, DedupConfig, DuplicateCheck, DuplicateReason,
};
