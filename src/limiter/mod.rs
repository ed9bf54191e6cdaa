//! Fixed-window rate limiting on top of the hot-path cache.
//!
//! Each key owns one counter. The first increment in a window creates the
//! counter with an expiry of one window; later increments keep that expiry.
//! Once the counter expires the next call starts a fresh window.
//!
//! Counting uses the cache's atomic increment, so concurrent callers sharing
//! a key never lose updates and never both slip past the limit.
//!
//! ## Usage
//!
//! ```rust
//! use tierguard::cache::{CacheConfig, HotPathCache};
//! use tierguard::limiter::{RateLimitConfig, RateLimiter};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let cache = Arc::new(HotPathCache::in_process(CacheConfig::default()));
//! let limiter = RateLimiter::new(cache, RateLimitConfig::default());
//!
//! let decision = limiter
//!     .check_and_increment("post:account-42", 5, Duration::from_secs(3600))
//!     .await;
//! assert!(decision.allowed);
//! assert_eq!(decision.remaining, 4);
//! # }
//! ```

mod rate_limiter;

pub use rate_limiter::{RateDecision, RateLimitConfig, RateLimiter, RateStatus};
