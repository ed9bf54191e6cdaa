//! Bounded in-process key/value store with TTLs.
//!
//! Serves the hot-path cache while its real backend is unreachable. Entries
//! are logically absent once expired, even before they are evicted. When the
//! store is full, expired entries are purged first; if none are expired, the
//! entry closest to expiry is evicted.

use crate::cache::config::{expiry_after, MAX_TTL};
use crate::core::CounterSnapshot;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Value held by a cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryValue {
    /// A serialized value.
    Text(String),
    /// A windowed counter.
    Counter(u64),
}

impl EntryValue {
    fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Counter(count) => count.to_string(),
        }
    }
}

/// A single cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value.
    pub value: EntryValue,
    /// When the entry stops being visible.
    pub expires_at: Instant,
}

impl CacheEntry {
    /// Returns `true` once `now >= expires_at`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Bounded in-process store.
#[derive(Debug)]
pub struct FallbackStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
    capacity: usize,
}

impl FallbackStore {
    /// Creates a store holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Returns the maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Gets a live value.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.render())
    }

    /// Sets a value with a TTL, replacing any existing entry.
    pub fn set(&self, key: &str, value: &str, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        self.insert(
            &mut entries,
            key,
            CacheEntry {
                value: EntryValue::Text(value.to_string()),
                expires_at: expiry_after(now, ttl),
            },
            now,
        );
    }

    /// Sets a value only if no live entry exists; returns the live value otherwise.
    pub fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Option<String> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(key).filter(|entry| !entry.is_expired(now)) {
            return Some(existing.value.render());
        }
        self.insert(
            &mut entries,
            key,
            CacheEntry {
                value: EntryValue::Text(value.to_string()),
                expires_at: expiry_after(now, ttl),
            },
            now,
        );
        None
    }

    /// Removes an entry.
    pub fn delete(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    /// Increments a counter, creating it with an expiry of `window` if absent.
    ///
    /// A live text entry holding an integer is promoted to a counter, the way
    /// Redis `INCR` treats numeric strings. Any other text is replaced.
    pub fn incr(&self, key: &str, window: Duration) -> CounterSnapshot {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get_mut(key).filter(|entry| !entry.is_expired(now)) {
            let current = match &entry.value {
                EntryValue::Counter(count) => Some(*count),
                EntryValue::Text(text) => text.parse::<u64>().ok(),
            };
            if let Some(count) = current {
                let count = count.saturating_add(1);
                entry.value = EntryValue::Counter(count);
                return CounterSnapshot {
                    count,
                    expires_in: entry.expires_at - now,
                };
            }
        }

        self.insert(
            &mut entries,
            key,
            CacheEntry {
                value: EntryValue::Counter(1),
                expires_at: expiry_after(now, window),
            },
            now,
        );
        CounterSnapshot {
            count: 1,
            expires_in: window.min(MAX_TTL),
        }
    }

    /// Reads a live counter without modifying it.
    pub fn counter(&self, key: &str) -> Option<CounterSnapshot> {
        let now = Instant::now();
        let entries = self.entries.lock();
        let entry = entries.get(key).filter(|entry| !entry.is_expired(now))?;
        let count = match &entry.value {
            EntryValue::Counter(count) => *count,
            EntryValue::Text(text) => text.parse().ok()?,
        };
        Some(CounterSnapshot {
            count,
            expires_in: entry.expires_at - now,
        })
    }

    /// Removes every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    fn insert(
        &self,
        entries: &mut HashMap<String, CacheEntry>,
        key: &str,
        entry: CacheEntry,
        now: Instant,
    ) {
        if !entries.contains_key(key) && entries.len() >= self.capacity {
            entries.retain(|_, existing| !existing.is_expired(now));
            if entries.len() >= self.capacity {
                let nearest = entries
                    .iter()
                    .min_by_key(|(_, existing)| existing.expires_at)
                    .map(|(k, _)| k.clone());
                if let Some(victim) = nearest {
                    entries.remove(&victim);
                }
            }
        }
        entries.insert(key.to_string(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires() {
        let store = FallbackStore::new(10);
        store.set("k", "v", Duration::from_secs(5));
        assert_eq!(store.get("k"), Some("v".to_string()));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.get("k"), None);
        assert_eq!(store.len(), 1);
        assert_eq!(store.purge_expired(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicts_nearest_expiry_when_full() {
        let store = FallbackStore::new(3);
        store.set("long", "1", Duration::from_secs(300));
        store.set("short", "2", Duration::from_secs(10));
        store.set("medium", "3", Duration::from_secs(60));

        store.set("new", "4", Duration::from_secs(120));

        assert_eq!(store.len(), 3);
        assert_eq!(store.get("short"), None);
        assert_eq!(store.get("long"), Some("1".to_string()));
        assert_eq!(store.get("new"), Some("4".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_purged_before_eviction() {
        let store = FallbackStore::new(2);
        store.set("stale", "1", Duration::from_secs(1));
        store.set("keep", "2", Duration::from_secs(600));
        tokio::time::advance(Duration::from_secs(2)).await;

        store.set("fresh", "3", Duration::from_secs(30));
        assert_eq!(store.get("keep"), Some("2".to_string()));
        assert_eq!(store.get("fresh"), Some("3".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_does_not_evict() {
        let store = FallbackStore::new(1);
        store.set("k", "1", Duration::from_secs(10));
        store.set("k", "2", Duration::from_secs(10));
        assert_eq!(store.get("k"), Some("2".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_if_absent() {
        let store = FallbackStore::new(10);
        assert_eq!(store.set_if_absent("h", "first", Duration::from_secs(5)), None);
        assert_eq!(
            store.set_if_absent("h", "second", Duration::from_secs(5)),
            Some("first".to_string())
        );

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.set_if_absent("h", "third", Duration::from_secs(5)), None);
        assert_eq!(store.get("h"), Some("third".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_window() {
        let store = FallbackStore::new(10);
        assert_eq!(store.incr("c", Duration::from_secs(10)).count, 1);
        tokio::time::advance(Duration::from_secs(4)).await;

        let snapshot = store.incr("c", Duration::from_secs(10));
        assert_eq!(snapshot.count, 2);
        assert_eq!(snapshot.expires_in, Duration::from_secs(6));
        assert_eq!(store.counter("c").unwrap().count, 2);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.counter("c"), None);
        assert_eq!(store.incr("c", Duration::from_secs(10)).count, 1);
    }
}
