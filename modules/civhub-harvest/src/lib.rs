//! civhub-harvest — the ingestion and deduplication engine.
//!
//! A scheduler invokes [`runner::HarvestRunner::run`] per data source. The
//! runner dispatches to a crawler (websites, feeds, council APIs) or to the
//! sync engine (structured external APIs), gates crawls through the
//! conditional-fetch layer, and routes candidate entities through the
//! embedding-based dedup engine before anything touches the store.

pub mod crawler;
pub mod dedup;
pub mod fetch;
pub mod runner;
pub mod store;
pub mod sync;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use crawler::{crawler_for, Crawler, CrawlerRegistry};
pub use dedup::{DedupEngine, MatchDecision, SimilarityCandidate};
pub use fetch::{ConditionalClient, FetchOutcome};
pub use runner::HarvestRunner;
pub use store::{DocumentIndex, EntityStore, MemoryStore, SourceStore, SyncLedger};
pub use sync::{ApiClient, ApiPage, SyncConfig, SyncEngine};
