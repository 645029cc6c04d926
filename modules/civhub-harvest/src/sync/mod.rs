//! External API synchronization: paginated record pull, field mapping,
//! dedup-aware entity reconciliation, and the per-record outcome ledger.

pub mod client;
pub mod engine;
pub mod mapping;
pub mod retry;

pub use client::{ApiClient, ApiPage, HttpApiClient, Pagination};
pub use engine::{SyncConfig, SyncEngine};
pub use mapping::{lookup_path, MappedEntity};
pub use retry::{PageFetch, RetryPolicy};
