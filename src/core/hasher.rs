//! Normalized content hashing with BLAKE3.
//!
//! Content is normalized before hashing so that cosmetic differences (case,
//! punctuation, runs of whitespace) produce the same digest.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A hex-encoded BLAKE3 digest of normalized content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wraps an existing hex digest.
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Returns the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first 12 hex characters, for logs.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalizes and hashes text content.
///
/// # Examples
///
/// ```rust
/// use tierguard::core::ContentHasher;
///
/// let hasher = ContentHasher::new();
/// let a = hasher.hash("Hello,   World!");
/// let b = hasher.hash("hello world");
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ContentHasher {
    /// Optional namespace mixed into the digest, so independent deduplicators
    /// sharing a cache never collide.
    namespace: Option<String>,
}

impl ContentHasher {
    /// Creates a hasher with no namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the namespace mixed into every digest.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Lowercases, strips punctuation and collapses whitespace.
    pub fn normalize(&self, content: &str) -> String {
        let lowered = content.to_lowercase();
        let stripped: String = lowered
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .collect();
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Returns the set of normalized tokens.
    pub fn tokens(&self, content: &str) -> HashSet<String> {
        self.normalize(content)
            .split(' ')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Hashes the normalized form of `content`.
    pub fn hash(&self, content: &str) -> ContentHash {
        self.hash_normalized(&self.normalize(content))
    }

    /// Hashes text that has already been normalized.
    pub fn hash_normalized(&self, normalized: &str) -> ContentHash {
        let mut hasher = blake3::Hasher::new();
        if let Some(ns) = &self.namespace {
            hasher.update(ns.as_bytes());
            hasher.update(&[0]);
        }
        hasher.update(normalized.as_bytes());
        ContentHash(hasher.finalize().to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        let hasher = ContentHasher::new();
        assert_eq!(
            hasher.normalize("  Big NEWS:\tthe   launch is *today*!! "),
            "big news the launch is today"
        );
        assert_eq!(hasher.normalize("!!!"), "");
    }

    #[test]
    fn test_cosmetic_variants_hash_equal() {
        let hasher = ContentHasher::new();
        let base = hasher.hash("Sleep is the best nootropic.");
        assert_eq!(base, hasher.hash("sleep is the BEST nootropic"));
        assert_eq!(base, hasher.hash("Sleep... is the best   nootropic!"));
        assert_ne!(base, hasher.hash("Sleep is the worst nootropic."));
    }

    #[test]
    fn test_hash_deterministic() {
        let hasher = ContentHasher::new();
        assert_eq!(hasher.hash("same text"), hasher.hash("same text"));
        assert_eq!(hasher.hash("same text").as_str().len(), 64);
    }

    #[test]
    fn test_namespace_changes_digest() {
        let plain = ContentHasher::new().hash("hello");
        let spaced = ContentHasher::new().with_namespace("replies").hash("hello");
        assert_ne!(plain, spaced);
    }

    #[test]
    fn test_tokens() {
        let hasher = ContentHasher::new();
        let tokens = hasher.tokens("The cat, the CAT, and the dog.");
        assert_eq!(tokens.len(), 4);
        assert!(tokens.contains("cat"));
        assert!(tokens.contains("and"));
    }
}
