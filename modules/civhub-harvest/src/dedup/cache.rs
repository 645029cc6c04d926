//! Bounded, process-wide embedding cache.
//!
//! Keyed by the hash of normalized text, so spelling-identical inputs share
//! one vector. Least-recently-used eviction keeps the cache at its
//! configured capacity; it is never persisted and rebuilds cold on restart.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use civhub_common::types::content_hash;

pub struct EmbeddingCache {
    inner: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity >= 1");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cache key for a normalized text.
    pub fn key(normalized: &str) -> String {
        content_hash(normalized)
    }

    /// Look up a vector, marking the entry most-recently-used on hit.
    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        self.inner
            .lock()
            .expect("embedding cache lock poisoned")
            .get(key)
            .cloned()
    }

    /// Insert a vector, evicting the least-recently-used entry if full.
    pub fn insert(&self, key: String, vector: Vec<f32>) {
        self.inner
            .lock()
            .expect("embedding cache lock poisoned")
            .put(key, vector);
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("embedding cache lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_returns_stored_vector() {
        let cache = EmbeddingCache::new(4);
        cache.insert("k1".to_string(), vec![1.0, 2.0]);
        assert_eq!(cache.get("k1"), Some(vec![1.0, 2.0]));
        assert_eq!(cache.get("k2"), None);
    }

    #[test]
    fn eviction_drops_least_recently_used() {
        let cache = EmbeddingCache::new(2);
        cache.insert("a".to_string(), vec![1.0]);
        cache.insert("b".to_string(), vec![2.0]);

        // Touch "a" so "b" is the LRU entry.
        assert!(cache.get("a").is_some());
        cache.insert("c".to_string(), vec![3.0]);

        assert!(cache.get("a").is_some(), "MRU entry must survive eviction");
        assert!(cache.get("b").is_none(), "LRU entry must be evicted");
        assert!(cache.get("c").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn key_is_stable_per_normalized_text() {
        assert_eq!(
            EmbeddingCache::key("gemeinde musterstadt"),
            EmbeddingCache::key("gemeinde musterstadt")
        );
        assert_ne!(
            EmbeddingCache::key("gemeinde musterstadt"),
            EmbeddingCache::key("musterstadt")
        );
    }
}
