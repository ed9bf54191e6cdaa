//! Resilient query execution.
//!
//! The [`ResilientQueryExecutor`] sequences circuit breaker check, cache
//! lookup, durable attempts with retry and timeout, cache write-back, and
//! fallback on total failure. Writes that cannot reach the store are held in
//! a [`DeferredQueue`] and replayed once it recovers.

mod query_executor;
pub mod queue;
pub mod retry;

pub use query_executor::{ExecutorBuilder, ExecutorConfig, ReplaySummary, ResilientQueryExecutor};
pub use queue::{Checkout, DeferredQueue, QueueItem};
pub use retry::{attempt_once, retry_async, Retried, RetryConfig};
