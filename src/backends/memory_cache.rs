//! In-memory cache backend.
//!
//! A process-local stand-in for Redis with real TTL and atomic counter
//! semantics. A fault switch makes every command fail, which is how tests
//! drive the hot-path cache into degraded mode.

use crate::cache::FallbackStore;
use crate::core::{CacheBackend, CacheError, CacheResult, CounterSnapshot};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// An in-memory [`CacheBackend`] with fault injection.
#[derive(Debug)]
pub struct MemoryCacheBackend {
    name: String,
    store: FallbackStore,
    failing: AtomicBool,
    command_count: AtomicU64,
}

impl MemoryCacheBackend {
    /// Creates an empty, healthy backend.
    pub fn new() -> Self {
        Self {
            name: "memory-cache".to_string(),
            store: FallbackStore::new(usize::MAX),
            failing: AtomicBool::new(false),
            command_count: AtomicU64::new(0),
        }
    }

    /// Sets the name of this backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Makes every command fail with a connection error while `failing`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns the number of commands received, including failed ones.
    pub fn command_count(&self) -> u64 {
        self.command_count.load(Ordering::Relaxed)
    }

    fn command(&self) -> CacheResult<()> {
        self.command_count.fetch_add(1, Ordering::Relaxed);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Connection(format!(
                "{}: simulated connection refused",
                self.name
            )));
        }
        Ok(())
    }
}

impl Default for MemoryCacheBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.command()?;
        Ok(self.store.get(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.command()?;
        self.store.set(key, value, ttl);
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<Option<String>> {
        self.command()?;
        Ok(self.store.set_if_absent(key, value, ttl))
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.command()?;
        self.store.delete(key);
        Ok(())
    }

    async fn incr_with_expiry(&self, key: &str, window: Duration) -> CacheResult<CounterSnapshot> {
        self.command()?;
        Ok(self.store.incr(key, window))
    }

    async fn counter(&self, key: &str) -> CacheResult<Option<CounterSnapshot>> {
        self.command()?;
        Ok(self.store.counter(key))
    }

    async fn ping(&self) -> CacheResult<()> {
        self.command()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_round_trip_and_expiry() {
        let backend = MemoryCacheBackend::new();
        backend.set("k", "v", Duration::from_secs(2)).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some("v".to_string()));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failing_switch() {
        let backend = MemoryCacheBackend::new();
        backend.set_failing(true);
        assert!(matches!(
            backend.get("k").await,
            Err(CacheError::Connection(_))
        ));
        assert!(backend.ping().await.is_err());

        backend.set_failing(false);
        assert!(backend.ping().await.is_ok());
        assert_eq!(backend.command_count(), 3);
    }
}
