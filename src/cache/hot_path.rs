//! The hot-path cache: a real backend with an in-process fallback.

use crate::cache::config::{expiry_after, CacheConfig};
use crate::cache::fallback::FallbackStore;
use crate::core::{ArcCacheBackend, CacheBackend, CacheError, CounterSnapshot};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Counters describing cache behaviour since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetrics {
    /// Reads answered by the real backend.
    pub hits: u64,
    /// Reads answered by the in-process fallback.
    pub fallback_hits: u64,
    /// Reads answered by neither.
    pub misses: u64,
    /// Backend commands that failed.
    pub backend_errors: u64,
    /// Stored values that could not be decoded.
    pub decode_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    fallback_hits: AtomicU64,
    misses: AtomicU64,
    backend_errors: AtomicU64,
    decode_errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            fallback_hits: self.fallback_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}

/// Best-effort key/value cache.
///
/// Commands go to the configured backend first. Any backend error switches
/// the cache into degraded mode: for the next `reconnect_interval` every
/// command is served by a bounded in-process [`FallbackStore`], after which
/// the backend is tried again. [`probe`](Self::probe) re-checks the backend
/// immediately and is what the health monitor calls.
///
/// Deletes that cannot reach the backend are remembered, up to
/// `fallback_capacity` keys, and replayed before the backend serves those
/// keys again.
///
/// No method returns an error. A failure anywhere in the cache looks to the
/// caller like a miss.
///
/// # Example
///
/// ```rust
/// use tierguard::backends::MemoryCacheBackend;
/// use tierguard::cache::{CacheConfig, HotPathCache};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn demo() {
/// let cache = HotPathCache::new(Arc::new(MemoryCacheBackend::new()), CacheConfig::default());
/// cache.set("greeting", &"hello", Duration::from_secs(60)).await;
/// let value: Option<String> = cache.get("greeting").await;
/// assert_eq!(value.as_deref(), Some("hello"));
/// # }
/// ```
#[derive(Debug)]
pub struct HotPathCache {
    backend: Option<ArcCacheBackend>,
    fallback: FallbackStore,
    config: CacheConfig,
    /// `Some(retry_at)` while degraded.
    degraded: Mutex<Option<Instant>>,
    /// Keys deleted while the backend was unreachable.
    pending_deletes: Mutex<HashSet<String>>,
    counters: Counters,
}

impl HotPathCache {
    /// Creates a cache in front of `backend`.
    pub fn new(backend: ArcCacheBackend, config: CacheConfig) -> Self {
        Self::build(Some(backend), config)
    }

    /// Creates a cache with no backend; everything is served in-process.
    pub fn in_process(config: CacheConfig) -> Self {
        Self::build(None, config)
    }

    fn build(backend: Option<ArcCacheBackend>, config: CacheConfig) -> Self {
        Self {
            backend,
            fallback: FallbackStore::new(config.fallback_capacity),
            config,
            degraded: Mutex::new(None),
            pending_deletes: Mutex::new(HashSet::new()),
            counters: Counters::default(),
        }
    }

    /// Returns the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the backend name, or `"in-process"` without one.
    pub fn backend_name(&self) -> &str {
        self.backend
            .as_ref()
            .map(|b| b.name())
            .unwrap_or("in-process")
    }

    /// Returns `true` if a backend is configured.
    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Returns `true` if a backend is configured and not degraded.
    pub fn is_backend_available(&self) -> bool {
        self.backend.is_some() && self.degraded.lock().is_none()
    }

    /// Returns a snapshot of the cache counters.
    pub fn metrics(&self) -> CacheMetrics {
        self.counters.snapshot()
    }

    /// Returns the number of deletes waiting to reach the backend.
    pub fn pending_deletes(&self) -> usize {
        self.pending_deletes.lock().len()
    }

    fn remember_delete(&self, key: &str) {
        let mut pending = self.pending_deletes.lock();
        if pending.len() >= self.config.fallback_capacity && !pending.contains(key) {
            warn!(key = key, "Too many pending cache deletes, dropping invalidation");
            return;
        }
        pending.insert(key.to_string());
    }

    // Replays a delete recorded while degraded. `false` means the backend
    // failed and must not be read for this key.
    async fn settle_delete(&self, backend: &ArcCacheBackend, key: &str) -> bool {
        if !self.pending_deletes.lock().contains(key) {
            return true;
        }
        match backend.delete(key).await {
            Ok(()) => {
                self.pending_deletes.lock().remove(key);
                debug!(key = key, "Replayed pending cache delete");
                true
            }
            Err(e) => {
                self.mark_degraded("delete", &e);
                false
            }
        }
    }

    async fn flush_pending_deletes(&self, backend: &ArcCacheBackend) {
        let keys: Vec<String> = self.pending_deletes.lock().iter().cloned().collect();
        for key in keys {
            if !self.settle_delete(backend, &key).await {
                break;
            }
        }
    }

    /// Returns the backend to use for the next command, if any.
    fn active_backend(&self) -> Option<&ArcCacheBackend> {
        let backend = self.backend.as_ref()?;
        match *self.degraded.lock() {
            Some(retry_at) if Instant::now() < retry_at => None,
            _ => Some(backend),
        }
    }

    fn mark_degraded(&self, op: &str, err: &CacheError) {
        Counters::bump(&self.counters.backend_errors);
        let retry_at = expiry_after(Instant::now(), self.config.reconnect_interval);
        let was_degraded = self.degraded.lock().replace(retry_at).is_some();

        if was_degraded {
            debug!(
                backend = self.backend_name(),
                op = op,
                error = %err,
                "Cache backend still unavailable"
            );
        } else {
            warn!(
                backend = self.backend_name(),
                op = op,
                error = %err,
                retry_in_secs = self.config.reconnect_interval.as_secs(),
                "Cache backend unavailable, serving from in-process fallback"
            );
        }
    }

    fn mark_recovered(&self) {
        if self.degraded.lock().take().is_some() {
            info!(backend = self.backend_name(), "Cache backend recovered");
        }
    }

    /// Gets a raw value.
    pub async fn get_raw(&self, key: &str) -> Option<String> {
        if let Some(backend) = self.active_backend() {
            if !self.settle_delete(backend, key).await {
                return self.get_fallback(key);
            }
            match backend.get(key).await {
                Ok(Some(value)) => {
                    self.mark_recovered();
                    Counters::bump(&self.counters.hits);
                    return Some(value);
                }
                Ok(None) => self.mark_recovered(),
                Err(e) => self.mark_degraded("get", &e),
            }
        }
        self.get_fallback(key)
    }

    fn get_fallback(&self, key: &str) -> Option<String> {
        match self.fallback.get(key) {
            Some(value) => {
                Counters::bump(&self.counters.fallback_hits);
                Some(value)
            }
            None => {
                Counters::bump(&self.counters.misses);
                debug!(key = key, "Cache MISS");
                None
            }
        }
    }

    /// Gets and decodes a JSON value. Undecodable values are a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                Counters::bump(&self.counters.decode_errors);
                warn!(key = key, error = %e, "Discarding undecodable cache entry");
                self.delete(key).await;
                None
            }
        }
    }

    /// Sets a raw value with a TTL.
    pub async fn set_raw(&self, key: &str, value: &str, ttl: Duration) {
        if let Some(backend) = self.active_backend() {
            match backend.set(key, value, ttl).await {
                Ok(()) => {
                    self.mark_recovered();
                    // A stale fallback copy would otherwise shadow a later backend miss.
                    self.fallback.delete(key);
                    self.pending_deletes.lock().remove(key);
                    return;
                }
                Err(e) => self.mark_degraded("set", &e),
            }
        }
        self.fallback.set(key, value, ttl);
    }

    /// Encodes a value as JSON and sets it with a TTL.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set_raw(key, &raw, ttl).await,
            Err(e) => warn!(key = key, error = %e, "Skipping cache write for unencodable value"),
        }
    }

    /// Deletes a key from the backend and the fallback.
    ///
    /// While the backend is unreachable the delete is kept and replayed once
    /// it answers again.
    pub async fn delete(&self, key: &str) {
        self.fallback.delete(key);
        if self.backend.is_none() {
            return;
        }
        match self.active_backend() {
            Some(backend) => match backend.delete(key).await {
                Ok(()) => {
                    self.pending_deletes.lock().remove(key);
                    self.mark_recovered();
                }
                Err(e) => {
                    self.mark_degraded("delete", &e);
                    self.remember_delete(key);
                }
            },
            None => self.remember_delete(key),
        }
    }

    /// Sets a value only if the key is absent; returns the existing value otherwise.
    pub async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Option<String> {
        if let Some(backend) = self.active_backend() {
            if self.settle_delete(backend, key).await {
                match backend.set_if_absent(key, value, ttl).await {
                    Ok(existing) => {
                        self.mark_recovered();
                        return existing;
                    }
                    Err(e) => self.mark_degraded("set_if_absent", &e),
                }
            }
        }
        self.fallback.set_if_absent(key, value, ttl)
    }

    /// Atomically increments a windowed counter.
    pub async fn incr(&self, key: &str, window: Duration) -> CounterSnapshot {
        if let Some(backend) = self.active_backend() {
            if self.settle_delete(backend, key).await {
                match backend.incr_with_expiry(key, window).await {
                    Ok(snapshot) => {
                        self.mark_recovered();
                        return snapshot;
                    }
                    Err(e) => self.mark_degraded("incr", &e),
                }
            }
        }
        self.fallback.incr(key, window)
    }

    /// Reads a windowed counter without modifying it.
    pub async fn counter(&self, key: &str) -> Option<CounterSnapshot> {
        if let Some(backend) = self.active_backend() {
            if self.settle_delete(backend, key).await {
                match backend.counter(key).await {
                    Ok(Some(snapshot)) => {
                        self.mark_recovered();
                        return Some(snapshot);
                    }
                    Ok(None) => self.mark_recovered(),
                    Err(e) => self.mark_degraded("counter", &e),
                }
            }
        }
        self.fallback.counter(key)
    }

    /// Pings the backend now, regardless of the reconnect interval.
    ///
    /// A successful ping also replays pending deletes. Returns whether the
    /// backend is available afterwards. Always `false` without a backend.
    pub async fn probe(&self) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };
        match backend.ping().await {
            Ok(()) => {
                self.mark_recovered();
                self.flush_pending_deletes(backend).await;
                self.is_backend_available()
            }
            Err(e) => {
                self.mark_degraded("ping", &e);
                false
            }
        }
    }

    /// Removes expired entries from the in-process fallback.
    pub fn purge_expired(&self) -> usize {
        self.fallback.purge_expired()
    }
}
