//! The resilient query executor.

use crate::cache::{CachePolicy, HotPathCache};
use crate::circuit_breaker::CircuitBreaker;
use crate::core::{
    ArcDurableStore, DurableStore, ErrorKind, Query, QueryOutcome, Rows, StoreError,
    StoreResult, WriteOutcome,
};
use crate::executor::queue::DeferredQueue;
use crate::executor::retry::{attempt_once, retry_async, RetryConfig};
use crate::health::{ConnectionHealth, HealthReport};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;

/// Configuration for the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Retry policy for durable attempts.
    pub retry: RetryConfig,

    /// Whether failed writes are queued for replay.
    pub defer_failed_writes: bool,

    /// How many times a deferred write may fail replay before it is dropped.
    pub deferred_max_retries: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            defer_failed_writes: true,
            deferred_max_retries: 5,
        }
    }
}

impl ExecutorConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Enables or disables deferral of failed writes.
    pub fn with_deferred_writes(mut self, enabled: bool) -> Self {
        self.defer_failed_writes = enabled;
        self
    }

    /// Sets the replay ceiling for deferred writes.
    pub fn with_deferred_max_retries(mut self, retries: u32) -> Self {
        self.deferred_max_retries = retries.max(1);
        self
    }
}

/// What a call to [`ResilientQueryExecutor::replay_deferred`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySummary {
    /// Writes that reached the durable store.
    pub applied: usize,
    /// Writes returned to the queue after failing again.
    pub requeued: usize,
    /// Writes discarded: rejected by the store or over the retry ceiling.
    pub dropped: usize,
    /// Writes still pending afterwards.
    pub remaining: usize,
}

/// Builder for creating a `ResilientQueryExecutor`.
pub struct ExecutorBuilder {
    store: Option<ArcDurableStore>,
    cache: Option<Arc<HotPathCache>>,
    breaker: Option<Arc<CircuitBreaker>>,
    health: Option<Arc<ConnectionHealth>>,
    config: ExecutorConfig,
}

impl ExecutorBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            store: None,
            cache: None,
            breaker: None,
            health: None,
            config: ExecutorConfig::default(),
        }
    }

    /// Sets the durable store.
    pub fn with_store<S: DurableStore + 'static>(mut self, store: S) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Sets a durable store wrapped in an Arc.
    pub fn with_arc_store(mut self, store: ArcDurableStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the hot-path cache.
    pub fn with_cache(mut self, cache: Arc<HotPathCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the circuit breaker guarding the durable store.
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Sets shared connection health state.
    pub fn with_health(mut self, health: Arc<ConnectionHealth>) -> Self {
        self.health = Some(health);
        self
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the executor.
    pub fn build(self) -> StoreResult<ResilientQueryExecutor> {
        let store = self
            .store
            .ok_or_else(|| StoreError::configuration("A durable store is required"))?;

        let breaker = self
            .breaker
            .unwrap_or_else(|| Arc::new(CircuitBreaker::with_defaults(store.name())));

        Ok(ResilientQueryExecutor {
            store,
            cache: self.cache,
            breaker,
            health: self.health.unwrap_or_default(),
            deferred: DeferredQueue::new(self.config.deferred_max_retries),
            config: self.config,
        })
    }
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Orchestrates the breaker, the cache and the durable store.
///
/// A read goes through, in order:
///
/// 1. the circuit breaker; an open circuit returns the fallback at once
/// 2. the hot-path cache, when the caller supplies a [`CachePolicy`]
/// 3. the durable store, with retries and a per-attempt timeout
/// 4. a best-effort write-back into the cache
///
/// None of the `execute*` methods return `Err` or panic. Failures come back
/// as a [`QueryOutcome`] carrying the caller's fallback and the last error.
pub struct ResilientQueryExecutor {
    store: ArcDurableStore,
    cache: Option<Arc<HotPathCache>>,
    breaker: Arc<CircuitBreaker>,
    health: Arc<ConnectionHealth>,
    deferred: DeferredQueue<Query>,
    config: ExecutorConfig,
}

impl ResilientQueryExecutor {
    /// Creates a new builder.
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::new()
    }

    /// Runs `operation` against the durable store with the full resilience sequence.
    ///
    /// The operation receives the store and is invoked once per attempt.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: F,
        fallback: T,
        cache: Option<&CachePolicy>,
    ) -> QueryOutcome<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(ArcDurableStore) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        self.run(&self.config.retry, operation, fallback, cache).await
    }

    async fn run<T, F, Fut>(
        &self,
        retry: &RetryConfig,
        mut operation: F,
        fallback: T,
        cache: Option<&CachePolicy>,
    ) -> QueryOutcome<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(ArcDurableStore) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let start = Instant::now();

        if let Err(e) = self.breaker.check() {
            tracing::debug!(backend = self.store.name(), error = %e, "Short-circuited by open breaker");
            return QueryOutcome::fallback(fallback, e, 0, start.elapsed());
        }

        let cache = self.cache.as_deref().zip(cache);

        if let Some((hot, policy)) = cache {
            if let Some(hit) = hot.get::<T>(&policy.key).await {
                // The durable store was never touched; release a half-open trial.
                self.breaker.abandon_probe();
                tracing::debug!(key = %policy.key, "Served from cache");
                return QueryOutcome::cached(hit, start.elapsed());
            }
        }

        let retried = retry_async(retry, self.store.name(), |_| {
            operation(Arc::clone(&self.store))
        })
        .await;

        match retried.result {
            Ok(data) => {
                self.on_success();
                if let Some((hot, policy)) = cache {
                    hot.set(&policy.key, &data, policy.ttl).await;
                }
                QueryOutcome::fresh(data, retried.attempts, start.elapsed())
            }
            Err(e) => {
                self.on_failure(&e);
                tracing::warn!(
                    backend = self.store.name(),
                    attempts = retried.attempts,
                    error = %e,
                    "Durable operation failed, returning fallback"
                );
                QueryOutcome::fallback(fallback, e, retried.attempts, start.elapsed())
            }
        }
    }

    /// Executes a [`Query`] with the full resilience sequence.
    ///
    /// For a write, the cache policy's key is invalidated after the write
    /// succeeds instead of being populated. Inserts and updates get a single
    /// attempt.
    pub async fn execute_query(
        &self,
        query: &Query,
        fallback: Rows,
        cache: Option<&CachePolicy>,
    ) -> QueryOutcome<Rows> {
        if !query.is_write() {
            return self
                .execute(|store| async move { store.execute(query).await }, fallback, cache)
                .await;
        }

        let retry = self.retry_for(query);
        let outcome = self
            .run(&retry, |store| async move { store.execute(query).await }, fallback, None)
            .await;

        if outcome.error.is_none() {
            if let Some((hot, policy)) = self.cache.as_deref().zip(cache) {
                hot.delete(&policy.key).await;
            }
        }
        outcome
    }

    /// Executes a write, queueing it for replay if the store cannot take it now.
    ///
    /// Idempotent writes (upserts and deletes) are retried per the retry
    /// policy. Other writes get a single attempt, since a timed-out attempt
    /// may already have been applied. Writes the store rejects are never
    /// queued.
    pub async fn execute_write(&self, query: Query, priority: i32) -> WriteOutcome {
        if !query.is_write() {
            return WriteOutcome {
                applied: false,
                deferred_id: None,
                error: Some(StoreError::rejected(
                    self.store.name(),
                    format!("{} is not a write", query.action),
                )),
                attempts: 0,
            };
        }

        if let Err(e) = self.breaker.check() {
            return self.defer(query, priority, e, 0);
        }

        let retry = self.retry_for(&query);
        let retried = retry_async(&retry, self.store.name(), |_| self.store.execute(&query)).await;

        match retried.result {
            Ok(_) => {
                self.on_success();
                WriteOutcome {
                    applied: true,
                    deferred_id: None,
                    error: None,
                    attempts: retried.attempts,
                }
            }
            Err(e) => {
                self.on_failure(&e);
                if e.is_retryable() {
                    self.defer(query, priority, e, retried.attempts)
                } else {
                    tracing::warn!(
                        backend = self.store.name(),
                        query = %query,
                        error = %e,
                        "Write rejected"
                    );
                    WriteOutcome {
                        applied: false,
                        deferred_id: None,
                        error: Some(e),
                        attempts: retried.attempts,
                    }
                }
            }
        }
    }

    // A timed-out attempt may already have been applied, so only idempotent
    // queries are retried.
    fn retry_for(&self, query: &Query) -> RetryConfig {
        if query.is_idempotent() {
            self.config.retry.clone()
        } else {
            RetryConfig {
                max_attempts: 1,
                ..self.config.retry.clone()
            }
        }
    }

    fn defer(&self, query: Query, priority: i32, error: StoreError, attempts: u32) -> WriteOutcome {
        if !self.config.defer_failed_writes {
            return WriteOutcome {
                applied: false,
                deferred_id: None,
                error: Some(error),
                attempts,
            };
        }

        let description = query.to_string();
        let id = self.deferred.enqueue(query, priority);
        tracing::warn!(
            backend = self.store.name(),
            deferred_id = %id,
            query = %description,
            error = %error,
            "Write deferred for replay"
        );
        WriteOutcome {
            applied: false,
            deferred_id: Some(id),
            error: Some(error),
            attempts,
        }
    }

    /// Replays up to `max` deferred writes, highest priority first.
    ///
    /// Stops at the first write that fails again, or when the breaker
    /// refuses calls. Writes past the retry ceiling are dropped first.
    pub async fn replay_deferred(&self, max: usize) -> ReplaySummary {
        let mut summary = ReplaySummary::default();

        for item in self.deferred.reap() {
            tracing::warn!(
                deferred_id = %item.id,
                query = %item.payload,
                retry_count = item.retry_count,
                "Dropping deferred write after too many failed replays"
            );
            summary.dropped += 1;
        }

        while summary.applied + summary.requeued < max {
            if self.deferred.is_empty() || self.breaker.check().is_err() {
                break;
            }
            // Dropping the checkout mid-attempt puts the write back.
            let Some(checkout) = self.deferred.checkout() else {
                self.breaker.abandon_probe();
                break;
            };
            let id = checkout.item().id.clone();

            let result = attempt_once(
                self.store.name(),
                self.config.retry.attempt_timeout,
                self.store.execute(&checkout.item().payload),
            )
            .await;

            match result {
                Ok(_) => {
                    self.on_success();
                    checkout.ack();
                    summary.applied += 1;
                }
                Err(e) if e.kind() == ErrorKind::Rejected => {
                    self.on_failure(&e);
                    checkout.ack();
                    tracing::warn!(
                        deferred_id = %id,
                        error = %e,
                        "Dropping deferred write rejected by the store"
                    );
                    summary.dropped += 1;
                }
                Err(e) => {
                    self.on_failure(&e);
                    checkout.nack();
                    tracing::debug!(deferred_id = %id, error = %e, "Deferred write failed again");
                    summary.requeued += 1;
                    break;
                }
            }
        }

        summary.remaining = self.deferred.outstanding();
        if summary.applied > 0 || summary.dropped > 0 {
            tracing::info!(
                applied = summary.applied,
                requeued = summary.requeued,
                dropped = summary.dropped,
                remaining = summary.remaining,
                "Replayed deferred writes"
            );
        }
        summary
    }

    fn on_success(&self) {
        self.breaker.record_success();
        self.health.set_durable_available(true);
    }

    fn on_failure(&self, error: &StoreError) {
        self.breaker.record_error(error);
        match error.kind() {
            ErrorKind::BackendUnavailable => self.health.set_durable_available(false),
            // The store answered.
            ErrorKind::Rejected => self.health.set_durable_available(true),
            _ => {}
        }
    }

    /// Builds a health report from the breaker, shared health and queue.
    pub fn health_status(&self) -> HealthReport {
        let breaker = self.breaker.current_state();
        let durable = self.health.durable();
        let cache = self.health.cache();
        let deferred_writes = self.deferred.outstanding();

        HealthReport {
            status: HealthReport::classify(breaker.status, durable, cache, deferred_writes),
            breaker,
            breaker_metrics: self.breaker.metrics(),
            durable,
            cache,
            last_probe_at: self.health.last_probe_at(),
            deferred_writes,
            generated_at: Utc::now(),
        }
    }

    /// Returns the durable store.
    pub fn store(&self) -> &ArcDurableStore {
        &self.store
    }

    /// Returns the hot-path cache, if configured.
    pub fn cache(&self) -> Option<&Arc<HotPathCache>> {
        self.cache.as_ref()
    }

    /// Returns the circuit breaker.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Returns the shared connection health.
    pub fn health(&self) -> &Arc<ConnectionHealth> {
        &self.health
    }

    /// Returns the number of deferred writes waiting for replay.
    pub fn deferred_len(&self) -> usize {
        self.deferred.outstanding()
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }
}

impl std::fmt::Debug for ResilientQueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientQueryExecutor")
            .field("store", &self.store.name())
            .field("cache", &self.cache.as_ref().map(|c| c.backend_name().to_string()))
            .field("breaker", &self.breaker.status())
            .field("deferred", &self.deferred.outstanding())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MemoryCacheBackend, MemoryStore};
    use crate::cache::CacheConfig;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitStatus};
    use crate::health::HealthStatus;
    use serde_json::json;
    use std::time::Duration;

    fn fast_retry() -> RetryConfig {
        RetryConfig::new()
            .with_backoff(vec![Duration::from_millis(10)])
            .with_attempt_timeout(Duration::from_millis(100))
    }

    fn setup(threshold: u32) -> (Arc<MemoryStore>, Arc<HotPathCache>, ResilientQueryExecutor) {
        let store = Arc::new(MemoryStore::new().with_table(
            "posts",
            vec![json!({"id": 1, "author": "ada"}), json!({"id": 2, "author": "bob"})],
        ));
        let cache = Arc::new(HotPathCache::new(
            Arc::new(MemoryCacheBackend::new()),
            CacheConfig::default(),
        ));
        let breaker = Arc::new(CircuitBreaker::new(
            "memory",
            CircuitBreakerConfig::default().with_failure_threshold(threshold),
        ));
        let executor = ResilientQueryExecutor::builder()
            .with_arc_store(store.clone())
            .with_cache(cache.clone())
            .with_breaker(breaker)
            .with_config(ExecutorConfig::new().with_retry(fast_retry()))
            .build()
            .unwrap();
        (store, cache, executor)
    }

    #[test]
    fn test_builder_requires_store() {
        let err = ResilientQueryExecutor::builder().build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_populates_cache() {
        let (store, _, executor) = setup(5);
        let query = Query::select("posts").eq("author", json!("ada"));
        let policy = CachePolicy::new("posts:ada", Duration::from_secs(60));

        let first = executor.execute_query(&query, Vec::new(), Some(&policy)).await;
        assert!(!first.from_cache);
        assert_eq!(first.attempts, 1);
        assert_eq!(first.data.len(), 1);

        let second = executor.execute_query(&query, Vec::new(), Some(&policy)).await;
        assert!(second.from_cache);
        assert_eq!(second.data, first.data);
        assert_eq!(store.execute_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_returns_fallback_after_max_attempts() {
        let (store, _, executor) = setup(5);
        store.set_failing(true);

        let fallback = vec![json!({"id": 0})];
        let outcome = executor
            .execute_query(&Query::select("posts"), fallback.clone(), None)
            .await;

        assert_eq!(outcome.data, fallback);
        assert!(outcome.is_fallback());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(store.execute_count(), 3);
        assert_eq!(executor.breaker().current_state().consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_short_circuits_cache_hit() {
        let (store, cache, executor) = setup(5);
        let policy = CachePolicy::new("posts:all", Duration::from_secs(60));
        cache.set(&policy.key, &vec![json!({"id": 9})], policy.ttl).await;

        executor.breaker().force_open();
        let outcome = executor
            .execute_query(&Query::select("posts"), Vec::new(), Some(&policy))
            .await;

        assert!(outcome.data.is_empty());
        assert!(!outcome.from_cache);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::CircuitOpen));
        assert_eq!(outcome.attempts, 0);
        assert_eq!(store.execute_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opens_after_threshold_failures() {
        let (store, _, executor) = setup(2);
        store.set_failing(true);

        for _ in 0..2 {
            executor.execute_query(&Query::select("posts"), Vec::new(), None).await;
        }
        assert_eq!(executor.breaker().status(), CircuitStatus::Open);
        assert_eq!(executor.health_status().status, HealthStatus::Critical);

        let calls = store.execute_count();
        let outcome = executor.execute_query(&Query::select("posts"), Vec::new(), None).await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::CircuitOpen));
        assert_eq!(store.execute_count(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_releases_half_open_probe() {
        let (store, cache, executor) = setup(1);
        let policy = CachePolicy::new("posts:all", Duration::from_secs(3600));

        store.set_failing(true);
        executor.execute_query(&Query::select("posts"), Vec::new(), None).await;
        assert_eq!(executor.breaker().status(), CircuitStatus::Open);

        cache.set(&policy.key, &vec![json!({"id": 1})], policy.ttl).await;
        tokio::time::advance(executor.breaker().config().base_backoff).await;

        let hit = executor
            .execute_query(&Query::select("posts"), Vec::new(), Some(&policy))
            .await;
        assert!(hit.from_cache);

        // The trial slot is free again for a real durable call.
        store.set_failing(false);
        let fresh = executor.execute_query(&Query::select("posts"), Vec::new(), None).await;
        assert!(!fresh.is_fallback());
        assert_eq!(executor.breaker().status(), CircuitStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_query_is_not_retried() {
        let (store, _, executor) = setup(5);
        let outcome = executor
            .execute_query(&Query::insert("posts", json!("not an object")), Vec::new(), None)
            .await;

        assert_eq!(outcome.error_kind(), Some(ErrorKind::Rejected));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(store.execute_count(), 1);
        assert_eq!(executor.breaker().current_state().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_invalidates_cache_key() {
        let (_, cache, executor) = setup(5);
        let policy = CachePolicy::new("posts:all", Duration::from_secs(60));
        cache.set(&policy.key, &vec![json!({"id": 1})], policy.ttl).await;

        let outcome = executor
            .execute_query(
                &Query::insert("posts", json!({"id": 3, "author": "cy"})),
                Vec::new(),
                Some(&policy),
            )
            .await;
        assert!(!outcome.is_fallback());
        assert_eq!(cache.get::<Rows>(&policy.key).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_during_cache_outage_invalidates_on_recovery() {
        let store = Arc::new(
            MemoryStore::new().with_table("posts", vec![json!({"id": 1, "author": "ada"})]),
        );
        let backend = Arc::new(MemoryCacheBackend::new());
        let cache = Arc::new(HotPathCache::new(
            backend.clone(),
            CacheConfig::default().with_reconnect_interval(Duration::from_secs(30)),
        ));
        let executor = ResilientQueryExecutor::builder()
            .with_arc_store(store.clone())
            .with_cache(cache.clone())
            .with_config(ExecutorConfig::new().with_retry(fast_retry()))
            .build()
            .unwrap();
        let policy = CachePolicy::new("posts:all", Duration::from_secs(300));
        let read = Query::select("posts");

        let warm = executor.execute_query(&read, Vec::new(), Some(&policy)).await;
        assert_eq!(warm.data.len(), 1);

        backend.set_failing(true);
        let write = executor
            .execute_query(&Query::insert("posts", json!({"id": 2})), Vec::new(), Some(&policy))
            .await;
        assert!(!write.is_fallback());

        backend.set_failing(false);
        tokio::time::advance(Duration::from_secs(31)).await;
        let outcome = executor.execute_query(&read, Vec::new(), Some(&policy)).await;
        assert!(!outcome.from_cache);
        assert_eq!(outcome.data.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_query_gets_single_attempt() {
        let (store, _, executor) = setup(5);
        store.fail_next(1);

        let outcome = executor
            .execute_query(&Query::insert("posts", json!({"id": 4})), Vec::new(), None)
            .await;
        assert!(outcome.is_fallback());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(store.rows("posts").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_is_deferred_and_replayed() {
        let (store, _, executor) = setup(5);
        store.set_unavailable(true);

        let outcome = executor
            .execute_write(Query::insert("posts", json!({"id": 3, "author": "cy"})), 1)
            .await;
        assert!(!outcome.applied);
        assert!(outcome.is_deferred());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(executor.deferred_len(), 1);
        assert_eq!(executor.health_status().status, HealthStatus::Critical);

        store.set_unavailable(false);
        let summary = executor.replay_deferred(10).await;
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.remaining, 0);
        assert_eq!(store.rows("posts").len(), 3);
        assert_eq!(executor.health_status().status, HealthStatus::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idempotent_write_is_retried() {
        let (store, _, executor) = setup(5);
        store.fail_next(2);

        let outcome = executor
            .execute_write(Query::upsert("posts", "id", json!({"id": 1, "author": "ada2"})), 0)
            .await;
        assert!(outcome.applied);
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_write_is_not_deferred() {
        let (_, _, executor) = setup(5);
        let outcome = executor
            .execute_write(Query::update("posts", json!(42)).eq("id", json!(1)), 0)
            .await;
        assert!(!outcome.applied);
        assert!(!outcome.is_deferred());
        assert_eq!(outcome.error.map(|e| e.kind()), Some(ErrorKind::Rejected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_stops_on_failure() {
        let (store, _, executor) = setup(5);
        store.set_failing(true);
        for id in 10..13 {
            executor
                .execute_write(Query::insert("posts", json!({ "id": id })), 0)
                .await;
        }
        assert_eq!(executor.deferred_len(), 3);

        let summary = executor.replay_deferred(10).await;
        assert_eq!(summary.requeued, 1);
        assert_eq!(summary.applied, 0);
        assert_eq!(summary.remaining, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_replay_keeps_write() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(500)));
        let executor = ResilientQueryExecutor::builder()
            .with_arc_store(store.clone())
            .with_config(ExecutorConfig::new().with_retry(
                RetryConfig::new()
                    .with_max_attempts(1)
                    .with_attempt_timeout(Duration::from_secs(1)),
            ))
            .build()
            .unwrap();

        store.set_unavailable(true);
        let outcome = executor
            .execute_write(Query::insert("posts", json!({"id": 7})), 0)
            .await;
        assert!(outcome.is_deferred());
        store.set_unavailable(false);

        let cancelled =
            tokio::time::timeout(Duration::from_millis(100), executor.replay_deferred(10)).await;
        assert!(cancelled.is_err());
        assert_eq!(executor.deferred_len(), 1);
        assert_ne!(executor.health_status().status, HealthStatus::Healthy);

        let summary = executor.replay_deferred(10).await;
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.remaining, 0);
        assert_eq!(store.rows("posts").len(), 1);
    }

    #[tokio::test]
    async fn test_operation_panic_becomes_fallback() {
        let (_, _, executor) = setup(5);
        let outcome = executor
            .execute(
                |_store| async move {
                    if true {
                        panic!("bad row");
                    }
                    Ok(1u32)
                },
                0u32,
                None,
            )
            .await;

        assert_eq!(outcome.data, 0);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::OperationFailed));
    }
}
