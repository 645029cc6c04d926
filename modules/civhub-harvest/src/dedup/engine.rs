//! The similarity decision engine.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use civhub_common::types::Entity;
use civhub_common::{Config, HarvestError};
use embed_client::EmbeddingProvider;

use super::cache::EmbeddingCache;
use super::equivalence::{ConceptLinker, EquivalenceChecker};
use super::normalize::normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    /// Above the merge threshold: the same real-world thing, auto-merge.
    Same,
    /// Between the thresholds: surfaced to a human queue, never auto-merged.
    Review,
    Distinct,
}

/// One scored comparison against an existing entity. Transient — consumed
/// immediately by the caller to decide merge vs. create vs. review.
#[derive(Debug, Clone)]
pub struct SimilarityCandidate {
    pub candidate_id: Uuid,
    pub score: f64,
    pub decision: MatchDecision,
}

/// Two-threshold policy, total over the whole cosine range [-1, 1].
pub fn decide(score: f64, merge_threshold: f64, review_threshold: f64) -> MatchDecision {
    if score >= merge_threshold {
        MatchDecision::Same
    } else if score >= review_threshold {
        MatchDecision::Review
    } else {
        MatchDecision::Distinct
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f64
}

pub struct DedupEngine {
    provider: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
    equivalence: Option<EquivalenceChecker>,
    merge_threshold: f64,
    review_threshold: f64,
}

impl DedupEngine {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &Config) -> Self {
        Self {
            provider,
            cache: EmbeddingCache::new(config.embed_cache_capacity),
            equivalence: None,
            merge_threshold: config.merge_threshold,
            review_threshold: config.review_threshold,
        }
    }

    /// Enable the cross-lingual concept-equivalence upgrade path.
    pub fn with_linker(mut self, linker: Arc<dyn ConceptLinker>) -> Self {
        self.equivalence = Some(EquivalenceChecker::new(linker));
        self
    }

    /// Embed a text through the bounded cache. A hit returns the stored
    /// vector without a provider call; provider failure surfaces as
    /// [`HarvestError::EmbeddingUnavailable`] — never a guessed decision.
    pub async fn embed_cached(&self, text: &str) -> Result<Vec<f32>, HarvestError> {
        let normalized = normalize(text);
        let key = EmbeddingCache::key(&normalized);

        if let Some(vector) = self.cache.get(&key) {
            return Ok(vector);
        }

        let vector = self
            .provider
            .embed(&normalized)
            .await
            .map_err(|e| HarvestError::EmbeddingUnavailable(e.to_string()))?;
        self.cache.insert(key, vector.clone());
        Ok(vector)
    }

    /// Score a candidate text against existing entities, best match first.
    /// Never mutates the entities — the caller owns merge/create.
    pub async fn matches(
        &self,
        candidate_text: &str,
        existing: &[Entity],
    ) -> Result<Vec<SimilarityCandidate>, HarvestError> {
        let normalized = normalize(candidate_text);
        let query = self.embed_cached(candidate_text).await?;

        let mut scored = Vec::with_capacity(existing.len());
        for entity in existing {
            let vector = match &entity.embedding {
                Some(v) => v.clone(),
                None => self.embed_cached(&entity.normalized_name).await?,
            };
            let score = cosine_similarity(&query, &vector);
            let mut decision = decide(score, self.merge_threshold, self.review_threshold);

            // Cross-lingual upgrade: an asserted synonym/translation pair is
            // the same concept regardless of its cosine score.
            if decision != MatchDecision::Same {
                if let Some(checker) = &self.equivalence {
                    match checker.check(&normalized, &entity.normalized_name).await {
                        Ok(true) => {
                            debug!(
                                candidate = normalized.as_str(),
                                existing = entity.normalized_name.as_str(),
                                "concept equivalence upgrade"
                            );
                            decision = MatchDecision::Same;
                        }
                        Ok(false) => {}
                        Err(e) => {
                            return Err(HarvestError::EmbeddingUnavailable(format!(
                                "concept equivalence check failed: {e}"
                            )))
                        }
                    }
                }
            }

            scored.push(SimilarityCandidate {
                candidate_id: entity.id,
                score,
                decision,
            });
        }

        // An asserted-equivalent candidate must outrank a higher-scoring
        // Review candidate, so Same sorts before anything else.
        scored.sort_by(|a, b| {
            let same_a = a.decision == MatchDecision::Same;
            let same_b = b.decision == MatchDecision::Same;
            same_b.cmp(&same_a).then_with(|| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });
        Ok(scored)
    }

    /// Convenience: the single most similar candidate, if any.
    pub async fn best_match(
        &self,
        candidate_text: &str,
        existing: &[Entity],
    ) -> Result<Option<SimilarityCandidate>, HarvestError> {
        Ok(self.matches(candidate_text, existing).await?.into_iter().next())
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixedEmbedder;
    use civhub_common::types::EntityType;

    fn entity_with_embedding(name: &str, embedding: Vec<f32>) -> Entity {
        let mut entity = Entity::new(EntityType::Municipality, name, &normalize(name));
        entity.embedding = Some(embedding);
        entity
    }

    #[test]
    fn threshold_policy_is_total_over_cosine_range() {
        let merge = 0.90;
        let review = 0.75;
        let mut s = -1.0_f64;
        while s <= 1.0 {
            let decision = decide(s, merge, review);
            if s >= merge {
                assert_eq!(decision, MatchDecision::Same, "s={s}");
            } else if s >= review {
                assert_eq!(decision, MatchDecision::Review, "s={s}");
            } else {
                assert_eq!(decision, MatchDecision::Distinct, "s={s}");
            }
            s += 0.01;
        }
    }

    #[test]
    fn threshold_boundaries_are_inclusive() {
        assert_eq!(decide(0.90, 0.90, 0.75), MatchDecision::Same);
        assert_eq!(decide(0.75, 0.90, 0.75), MatchDecision::Review);
        assert_eq!(decide(0.7499, 0.90, 0.75), MatchDecision::Distinct);
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn zero_vector_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn second_embed_is_a_cache_hit() {
        let embedder = Arc::new(FixedEmbedder::new(8));
        let engine = DedupEngine::new(embedder.clone(), &Config::default());

        let first = engine.embed_cached("Gemeinde Musterstadt").await.unwrap();
        let second = engine.embed_cached("Gemeinde Musterstadt").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(embedder.calls(), 1, "cache hit must not call the provider");
    }

    #[tokio::test]
    async fn spelling_variants_share_a_cache_entry() {
        let embedder = Arc::new(FixedEmbedder::new(8));
        let engine = DedupEngine::new(embedder.clone(), &Config::default());

        engine.embed_cached("Gemeinde Lörrach").await.unwrap();
        engine.embed_cached("gemeinde loerrach!").await.unwrap();

        assert_eq!(embedder.calls(), 1);
        assert_eq!(engine.cache_len(), 1);
    }

    #[tokio::test]
    async fn close_names_decide_same() {
        let embedder = Arc::new(FixedEmbedder::new(4));
        // Cosine of these two is ~0.93, against merge_threshold 0.90.
        embedder.register("gemeinde musterstadt", vec![0.9, 0.3, 0.3, 0.0]);
        embedder.register("musterstadt", vec![1.0, 0.1, 0.2, 0.0]);

        let engine = DedupEngine::new(embedder, &Config::default());
        let existing = vec![entity_with_embedding("Musterstadt", vec![1.0, 0.1, 0.2, 0.0])];

        let best = engine
            .best_match("Gemeinde Musterstadt", &existing)
            .await
            .unwrap()
            .expect("one candidate");

        assert!(best.score >= 0.90, "score was {}", best.score);
        assert_eq!(best.decision, MatchDecision::Same);
    }

    #[tokio::test]
    async fn unrelated_names_decide_distinct() {
        let embedder = Arc::new(FixedEmbedder::new(4));
        embedder.register("musterstadt", vec![1.0, 0.0, 0.0, 0.0]);
        embedder.register("beispieldorf", vec![0.0, 1.0, 0.0, 0.0]);

        let engine = DedupEngine::new(embedder, &Config::default());
        let existing = vec![entity_with_embedding("Beispieldorf", vec![0.0, 1.0, 0.0, 0.0])];

        let best = engine
            .best_match("Musterstadt", &existing)
            .await
            .unwrap()
            .expect("one candidate");
        assert_eq!(best.decision, MatchDecision::Distinct);
    }

    #[tokio::test]
    async fn provider_failure_is_embedding_unavailable() {
        let embedder = Arc::new(FixedEmbedder::new(4).failing());
        let engine = DedupEngine::new(embedder, &Config::default());

        let err = engine.embed_cached("anything").await.unwrap_err();
        assert!(matches!(err, HarvestError::EmbeddingUnavailable(_)));
    }

    #[tokio::test]
    async fn linker_upgrades_cross_lingual_match() {
        use crate::dedup::equivalence::ConceptLinker;
        use async_trait::async_trait;

        struct StaticLinker;
        #[async_trait]
        impl ConceptLinker for StaticLinker {
            async fn equivalent(&self, a: &str, b: &str) -> anyhow::Result<bool> {
                Ok(matches!((a, b), ("rathaus", "town hall") | ("town hall", "rathaus")))
            }
        }

        let embedder = Arc::new(FixedEmbedder::new(4));
        embedder.register("rathaus", vec![1.0, 0.0, 0.0, 0.0]);
        embedder.register("town hall", vec![0.0, 1.0, 0.0, 0.0]);

        let engine =
            DedupEngine::new(embedder, &Config::default()).with_linker(Arc::new(StaticLinker));
        let existing = vec![entity_with_embedding("town hall", vec![0.0, 1.0, 0.0, 0.0])];

        let best = engine
            .best_match("Rathaus", &existing)
            .await
            .unwrap()
            .expect("one candidate");
        assert_eq!(best.decision, MatchDecision::Same);
        assert!(best.score < 0.75, "upgrade must come from the linker, not the score");
    }

    #[tokio::test]
    async fn linker_upgraded_match_outranks_higher_scoring_review() {
        use crate::dedup::equivalence::ConceptLinker;
        use async_trait::async_trait;

        struct StaticLinker;
        #[async_trait]
        impl ConceptLinker for StaticLinker {
            async fn equivalent(&self, a: &str, b: &str) -> anyhow::Result<bool> {
                Ok(matches!((a, b), ("rathaus", "town hall") | ("town hall", "rathaus")))
            }
        }

        let embedder = Arc::new(FixedEmbedder::new(4));
        embedder.register("rathaus", vec![1.0, 0.0, 0.0, 0.0]);

        let engine =
            DedupEngine::new(embedder, &Config::default()).with_linker(Arc::new(StaticLinker));
        // "Stadthaus" scores 0.8 (Review band); "town hall" scores 0.0 but
        // the linker asserts equivalence.
        let review_like = entity_with_embedding("Stadthaus", vec![0.8, 0.6, 0.0, 0.0]);
        let equivalent = entity_with_embedding("town hall", vec![0.0, 1.0, 0.0, 0.0]);
        let existing = vec![review_like, equivalent.clone()];

        let best = engine
            .best_match("Rathaus", &existing)
            .await
            .unwrap()
            .expect("candidates exist");
        assert_eq!(best.candidate_id, equivalent.id);
        assert_eq!(best.decision, MatchDecision::Same);
        assert!(best.score < 0.75);
    }

    #[tokio::test]
    async fn candidates_are_sorted_best_first() {
        let embedder = Arc::new(FixedEmbedder::new(4));
        embedder.register("musterstadt", vec![1.0, 0.0, 0.0, 0.0]);

        let engine = DedupEngine::new(embedder, &Config::default());
        let existing = vec![
            entity_with_embedding("weit weg", vec![0.0, 1.0, 0.0, 0.0]),
            entity_with_embedding("musterstadt alt", vec![0.95, 0.05, 0.0, 0.0]),
        ];

        let candidates = engine.matches("Musterstadt", &existing).await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].score >= candidates[1].score);
    }
}
