//! Embedding-based similarity and deduplication.
//!
//! The engine only decides — `Same`, `Review`, or `Distinct` — and never
//! mutates entities. Merge and create stay with the caller.

pub mod cache;
pub mod engine;
pub mod equivalence;
pub mod normalize;

pub use cache::EmbeddingCache;
pub use engine::{cosine_similarity, decide, DedupEngine, MatchDecision, SimilarityCandidate};
pub use equivalence::{ConceptLinker, EquivalenceChecker};
pub use normalize::normalize;
