//! The content deduplicator.

use crate::cache::{expiry_after, HotPathCache};
use crate::core::{ContentHash, ContentHasher};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Configuration for the deduplicator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// How long a record blocks identical content, and how far back the
    /// near-duplicate window reaches.
    pub lookback: Duration,

    /// Token-set Jaccard similarity at or above which content is a near duplicate.
    pub similarity_threshold: f64,

    /// Number of recent items kept for near-duplicate comparison.
    pub recent_window: usize,

    /// Whether the near-duplicate check runs at all.
    pub near_duplicates: bool,

    /// Prefix applied to every record key.
    pub key_prefix: String,

    /// Namespace mixed into content digests.
    pub namespace: Option<String>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            lookback: Duration::from_secs(24 * 60 * 60),
            similarity_threshold: 0.85,
            recent_window: 50,
            near_duplicates: true,
            key_prefix: "dedup:".to_string(),
            namespace: None,
        }
    }
}

impl DedupConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the lookback period.
    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback = lookback;
        self
    }

    /// Sets the near-duplicate similarity threshold.
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Sets the size of the near-duplicate window.
    pub fn with_recent_window(mut self, size: usize) -> Self {
        self.recent_window = size;
        self
    }

    /// Enables or disables the near-duplicate check.
    pub fn with_near_duplicates(mut self, enabled: bool) -> Self {
        self.near_duplicates = enabled;
        self
    }

    /// Sets the record key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets the digest namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// The record stored for each piece of content seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHashRecord {
    /// Digest of the normalized content.
    pub hash: ContentHash,
    /// Who produced the content, if known.
    pub owner_id: Option<String>,
    /// When the content was first seen.
    pub created_at: DateTime<Utc>,
    /// How long the record lives.
    pub ttl_secs: u64,
}

/// Why a check came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DuplicateReason {
    /// Nothing similar was seen.
    Unique,
    /// The normalized content was seen before.
    ExactMatch,
    /// Recent content shares most of its tokens.
    NearMatch {
        /// Jaccard similarity with the closest recent item.
        similarity: f64,
    },
    /// The check could not complete; the content is treated as unique.
    CheckFailed,
}

/// Result of [`ContentDeduplicator::check_duplicate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCheck {
    /// Whether the content should be treated as a duplicate.
    pub is_duplicate: bool,
    /// Why.
    pub reason: DuplicateReason,
    /// Digest of the content that matched.
    pub matched_hash: Option<ContentHash>,
    /// When the matched content was first seen.
    pub created_at: Option<DateTime<Utc>>,
    /// Owner of the matched content.
    pub owner_id: Option<String>,
}

impl DuplicateCheck {
    fn unique() -> Self {
        Self {
            is_duplicate: false,
            reason: DuplicateReason::Unique,
            matched_hash: None,
            created_at: None,
            owner_id: None,
        }
    }

    fn check_failed() -> Self {
        Self {
            reason: DuplicateReason::CheckFailed,
            ..Self::unique()
        }
    }

    fn matched(reason: DuplicateReason, record: ContentHashRecord) -> Self {
        Self {
            is_duplicate: true,
            reason,
            matched_hash: Some(record.hash),
            created_at: Some(record.created_at),
            owner_id: record.owner_id,
        }
    }
}

#[derive(Debug)]
struct RecentItem {
    record: ContentHashRecord,
    tokens: HashSet<String>,
    expires_at: Instant,
}

/// Detects repeated content using normalized hashes and token similarity.
///
/// Exact matching goes through the cache's atomic set-if-absent, so two
/// concurrent checks of the same content can never both come back unique.
/// The near-duplicate window is kept in process.
///
/// Every failure path reports the content as unique. Callers are never
/// blocked by a broken dedup check.
#[derive(Debug)]
pub struct ContentDeduplicator {
    cache: Arc<HotPathCache>,
    hasher: ContentHasher,
    config: DedupConfig,
    recent: Mutex<VecDeque<RecentItem>>,
}

impl ContentDeduplicator {
    /// Creates a deduplicator storing records in `cache`.
    pub fn new(cache: Arc<HotPathCache>, config: DedupConfig) -> Self {
        let hasher = match &config.namespace {
            Some(ns) => ContentHasher::new().with_namespace(ns.clone()),
            None => ContentHasher::new(),
        };
        Self {
            cache,
            hasher,
            config,
            recent: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Returns the digest `content` is recorded under.
    pub fn hash(&self, content: &str) -> ContentHash {
        self.hasher.hash(content)
    }

    fn record_key(&self, hash: &ContentHash) -> String {
        format!("{}{}", self.config.key_prefix, hash)
    }

    /// Checks `content` and records it if it is new.
    ///
    /// The record lives for `ttl`. Content that normalizes to nothing is
    /// reported unique and not recorded.
    pub async fn check_duplicate(&self, content: &str, owner_id: Option<&str>, ttl: Duration) -> DuplicateCheck {
        let normalized = self.hasher.normalize(content);
        if normalized.is_empty() {
            debug!("Skipping dedup check for empty content");
            return DuplicateCheck::unique();
        }

        let record = ContentHashRecord {
            hash: self.hasher.hash_normalized(&normalized),
            owner_id: owner_id.map(str::to_string),
            created_at: Utc::now(),
            ttl_secs: ttl.as_secs(),
        };
        let encoded = match serde_json::to_string(&record) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(reason = "dedup_check_failed", error = %e, "Could not encode dedup record");
                return DuplicateCheck::check_failed();
            }
        };

        let key = self.record_key(&record.hash);
        if let Some(existing) = self.cache.set_if_absent(&key, &encoded, ttl).await {
            return match serde_json::from_str::<ContentHashRecord>(&existing) {
                Ok(original) => {
                    debug!(
                        reason = "duplicate",
                        hash = original.hash.short(),
                        "Exact duplicate content"
                    );
                    DuplicateCheck::matched(DuplicateReason::ExactMatch, original)
                }
                Err(e) => {
                    warn!(
                        reason = "dedup_check_failed",
                        key = %key,
                        error = %e,
                        "Unreadable dedup record, treating content as unique"
                    );
                    DuplicateCheck::check_failed()
                }
            };
        }

        let tokens = self.hasher.tokens(&normalized);

        if self.config.near_duplicates {
            if let Some((similarity, original)) = self.closest_recent(&tokens) {
                if similarity >= self.config.similarity_threshold {
                    // Rejected content keeps no record of its own.
                    self.cache.delete(&key).await;
                    debug!(
                        reason = "near_duplicate",
                        hash = original.hash.short(),
                        similarity = similarity,
                        "Near-duplicate content"
                    );
                    return DuplicateCheck::matched(DuplicateReason::NearMatch { similarity }, original);
                }
            }
        }

        self.remember(record, tokens, ttl);
        DuplicateCheck::unique()
    }

    /// Like [`check_duplicate`](Self::check_duplicate) with the lookback as the record lifetime.
    pub async fn check(&self, content: &str, owner_id: Option<&str>) -> DuplicateCheck {
        self.check_duplicate(content, owner_id, self.config.lookback).await
    }

    /// Returns the stored record for `content`, if any, without recording it.
    pub async fn lookup(&self, content: &str) -> Option<ContentHashRecord> {
        let key = self.record_key(&self.hash(content));
        self.cache.get::<ContentHashRecord>(&key).await
    }

    /// Forgets `content`, so the next check reports it unique.
    pub async fn forget(&self, content: &str) {
        let hash = self.hash(content);
        self.cache.delete(&self.record_key(&hash)).await;
        self.recent.lock().retain(|item| item.record.hash != hash);
    }

    /// Returns the number of items in the near-duplicate window.
    pub fn recent_len(&self) -> usize {
        let mut recent = self.recent.lock();
        self.evict_stale(&mut recent);
        recent.len()
    }

    fn closest_recent(&self, tokens: &HashSet<String>) -> Option<(f64, ContentHashRecord)> {
        let mut recent = self.recent.lock();
        self.evict_stale(&mut recent);

        recent
            .iter()
            .map(|item| (jaccard(tokens, &item.tokens), item))
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(similarity, item)| (similarity, item.record.clone()))
    }

    fn remember(&self, record: ContentHashRecord, tokens: HashSet<String>, ttl: Duration) {
        if !self.config.near_duplicates || self.config.recent_window == 0 {
            return;
        }
        let mut recent = self.recent.lock();
        recent.push_back(RecentItem {
            record,
            tokens,
            expires_at: expiry_after(Instant::now(), ttl.min(self.config.lookback)),
        });
        while recent.len() > self.config.recent_window {
            recent.pop_front();
        }
    }

    // Window items never outlive their record.
    fn evict_stale(&self, recent: &mut VecDeque<RecentItem>) {
        let now = Instant::now();
        recent.retain(|item| item.expires_at > now);
    }
}

/// Token-set Jaccard similarity. Two empty sets have similarity zero.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
