//! In-memory store: the whole storage contract behind one mutex.
//!
//! Backs the dry-run binary and the engine tests. Page commits are atomic by
//! construction — every write happens under the single lock.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use civhub_common::types::{DataSource, Entity, EntityType, SyncRecord};

use super::{DocumentIndex, EntityStore, SourceStore, SyncLedger};

#[derive(Default)]
struct Inner {
    sources: HashMap<Uuid, DataSource>,
    entities: HashMap<Uuid, Entity>,
    ledger: Vec<SyncRecord>,
    hashes: HashMap<Uuid, HashSet<String>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&self, source: DataSource) {
        self.inner
            .lock()
            .expect("memory store lock poisoned")
            .sources
            .insert(source.id, source);
    }

    pub fn add_entity(&self, entity: Entity) {
        self.inner
            .lock()
            .expect("memory store lock poisoned")
            .entities
            .insert(entity.id, entity);
    }

    pub fn entity(&self, id: Uuid) -> Option<Entity> {
        self.inner
            .lock()
            .expect("memory store lock poisoned")
            .entities
            .get(&id)
            .cloned()
    }

    pub fn entity_count(&self) -> usize {
        self.inner
            .lock()
            .expect("memory store lock poisoned")
            .entities
            .len()
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn get_source(&self, id: Uuid) -> Result<Option<DataSource>> {
        Ok(self
            .inner
            .lock()
            .expect("memory store lock poisoned")
            .sources
            .get(&id)
            .cloned())
    }

    async fn update_source(&self, source: &DataSource) -> Result<()> {
        self.inner
            .lock()
            .expect("memory store lock poisoned")
            .sources
            .insert(source.id, source.clone());
        Ok(())
    }
}

#[async_trait]
impl DocumentIndex for MemoryStore {
    async fn known_hashes(&self, source_id: Uuid) -> Result<HashSet<String>> {
        Ok(self
            .inner
            .lock()
            .expect("memory store lock poisoned")
            .hashes
            .get(&source_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn remember_hashes(&self, source_id: Uuid, hashes: &[String]) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let set = inner.hashes.entry(source_id).or_default();
        for hash in hashes {
            set.insert(hash.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn entities_of_type(&self, entity_type: EntityType) -> Result<Vec<Entity>> {
        Ok(self
            .inner
            .lock()
            .expect("memory store lock poisoned")
            .entities
            .values()
            .filter(|e| e.entity_type == entity_type)
            .cloned()
            .collect())
    }

    async fn insert_entity(&self, entity: &Entity) -> Result<()> {
        self.inner
            .lock()
            .expect("memory store lock poisoned")
            .entities
            .insert(entity.id, entity.clone());
        Ok(())
    }

    async fn update_entity(&self, entity: &Entity) -> Result<()> {
        self.inner
            .lock()
            .expect("memory store lock poisoned")
            .entities
            .insert(entity.id, entity.clone());
        Ok(())
    }
}

#[async_trait]
impl SyncLedger for MemoryStore {
    async fn terminal_record(
        &self,
        source_id: Uuid,
        external_id: &str,
    ) -> Result<Option<SyncRecord>> {
        Ok(self
            .inner
            .lock()
            .expect("memory store lock poisoned")
            .ledger
            .iter()
            .filter(|r| r.source_id == source_id && r.external_id == external_id)
            .find(|r| r.status.is_terminal())
            .cloned())
    }

    async fn commit_page(
        &self,
        source_id: Uuid,
        records: Vec<SyncRecord>,
        cursor: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner.ledger.extend(records);
        if let Some(source) = inner.sources.get_mut(&source_id) {
            source.last_cursor = cursor.map(|c| c.to_string());
        }
        Ok(())
    }

    async fn records_for_source(&self, source_id: Uuid) -> Result<Vec<SyncRecord>> {
        Ok(self
            .inner
            .lock()
            .expect("memory store lock poisoned")
            .ledger
            .iter()
            .filter(|r| r.source_id == source_id)
            .cloned()
            .collect())
    }
}
