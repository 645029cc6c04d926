//! Cross-lingual concept equivalence.
//!
//! "Rathaus" and "town hall" will never score high on name similarity, but
//! they name the same concept. A [`ConceptLinker`] asserts such equivalences
//! through an expensive semantic call; results are cached under the sorted
//! pair of normalized concepts so lookup order cannot split the cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ConceptLinker: Send + Sync {
    /// Are the two normalized terms synonyms/translations of one concept?
    async fn equivalent(&self, a: &str, b: &str) -> Result<bool>;
}

/// Caching wrapper around a [`ConceptLinker`].
pub struct EquivalenceChecker {
    linker: Arc<dyn ConceptLinker>,
    cache: Mutex<HashMap<(String, String), bool>>,
}

impl EquivalenceChecker {
    pub fn new(linker: Arc<dyn ConceptLinker>) -> Self {
        Self {
            linker,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Composite cache key: the pair is unordered, so sort before hashing.
    fn key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    pub async fn check(&self, a: &str, b: &str) -> Result<bool> {
        let key = Self::key(a, b);

        if let Some(&cached) = self
            .cache
            .lock()
            .expect("equivalence cache lock poisoned")
            .get(&key)
        {
            return Ok(cached);
        }

        let result = self.linker.equivalent(a, b).await?;
        self.cache
            .lock()
            .expect("equivalence cache lock poisoned")
            .insert(key, result);
        Ok(result)
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn cached_pairs(&self) -> usize {
        self.cache
            .lock()
            .expect("equivalence cache lock poisoned")
            .len()
    }
}
