//! Trait boundaries over the transactional storage layer.
//!
//! The engine never talks to a concrete database — the web application owns
//! the schema. These traits are the full contract the engine needs, and
//! [`MemoryStore`] implements all of them for tests and dry runs.

mod memory;

pub use memory::MemoryStore;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use civhub_common::types::{DataSource, Entity, EntityType, SyncRecord};

#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn get_source(&self, id: Uuid) -> Result<Option<DataSource>>;

    /// Persist validator fields, last-crawl timestamp, and resume cursor.
    async fn update_source(&self, source: &DataSource) -> Result<()>;
}

/// Content-hash memory across crawls: a document whose hash was seen before
/// is fetched but excluded from downstream analysis.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    async fn known_hashes(&self, source_id: Uuid) -> Result<HashSet<String>>;

    async fn remember_hashes(&self, source_id: Uuid, hashes: &[String]) -> Result<()>;
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Dedup candidate set for one entity type.
    async fn entities_of_type(&self, entity_type: EntityType) -> Result<Vec<Entity>>;

    async fn insert_entity(&self, entity: &Entity) -> Result<()>;

    async fn update_entity(&self, entity: &Entity) -> Result<()>;
}

#[async_trait]
pub trait SyncLedger: Send + Sync {
    /// The idempotence guard: an external id with a terminal
    /// (`Created`/`Updated`) row is not reprocessed unless forced.
    async fn terminal_record(
        &self,
        source_id: Uuid,
        external_id: &str,
    ) -> Result<Option<SyncRecord>>;

    /// Commit one page's ledger rows together with the post-page cursor.
    /// Atomic: a restart resumes from the last committed page, never from
    /// half of one.
    async fn commit_page(
        &self,
        source_id: Uuid,
        records: Vec<SyncRecord>,
        cursor: Option<&str>,
    ) -> Result<()>;

    async fn records_for_source(&self, source_id: Uuid) -> Result<Vec<SyncRecord>>;
}
