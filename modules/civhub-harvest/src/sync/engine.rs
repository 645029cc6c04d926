//! The external-API sync engine.
//!
//! One run walks an endpoint page by page from the stored resume cursor,
//! maps each raw record onto entity fields, routes it through the dedup
//! engine, and commits the page's ledger rows together with the next cursor.
//! A bad record fails alone; a dead page exhausts its retries alone; only
//! cancellation, an unskippable page, or too many dead pages in a row stops
//! the run early.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use civhub_common::events::{AuditEvent, AuditSink};
use civhub_common::types::{Entity, FieldMapping, RecordStatus, SyncRecord, SyncResult};
use civhub_common::HarvestError;

use super::client::ApiClient;
use super::mapping::{self, MappedEntity};
use super::retry::{PageFetch, RetryPolicy};
use crate::dedup::{normalize, DedupEngine, MatchDecision};
use crate::store::{EntityStore, SyncLedger};

/// Hard stop after this many dead pages in a row. An endpoint failing every
/// page is down, not patchy, and skipping must not outlive the run.
const MAX_CONSECUTIVE_DEAD_PAGES: u32 = 5;

/// Per-run settings, taken from the source's configuration by the runner.
#[derive(Debug, Clone, TypedBuilder)]
pub struct SyncConfig {
    pub mapping: FieldMapping,
    pub page_limit: u32,
    /// Reprocess records that already have a terminal ledger row.
    #[builder(default)]
    pub force: bool,
    /// Cursor of the last committed page from a previous run.
    #[builder(default)]
    pub resume_cursor: Option<String>,
}

pub struct SyncEngine {
    client: Arc<dyn ApiClient>,
    entities: Arc<dyn EntityStore>,
    ledger: Arc<dyn SyncLedger>,
    dedup: Arc<DedupEngine>,
    sink: Arc<dyn AuditSink>,
    policy: RetryPolicy,
}

impl SyncEngine {
    pub fn new(
        client: Arc<dyn ApiClient>,
        entities: Arc<dyn EntityStore>,
        ledger: Arc<dyn SyncLedger>,
        dedup: Arc<DedupEngine>,
        sink: Arc<dyn AuditSink>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            entities,
            ledger,
            dedup,
            sink,
            policy,
        }
    }

    pub async fn sync(
        &self,
        source_id: Uuid,
        config: &SyncConfig,
        cancel: &CancellationToken,
    ) -> Result<SyncResult, HarvestError> {
        let started = Instant::now();
        let mut result = SyncResult::default();
        let mut cursor = config.resume_cursor.clone();
        let mut consecutive_dead: u32 = 0;

        if cursor.is_some() {
            info!(%source_id, cursor = ?cursor, "resuming sync from stored cursor");
        }

        loop {
            // Cancellation is honored at page boundaries only, so every
            // committed page is complete.
            if cancel.is_cancelled() {
                result.cancelled = true;
                result.cursor = cursor;
                break;
            }

            let page = match self.fetch_with_retry(source_id, cursor.as_deref(), config).await {
                Some(page) => page,
                None => {
                    result.pages_failed += 1;
                    consecutive_dead += 1;
                    if consecutive_dead >= MAX_CONSECUTIVE_DEAD_PAGES {
                        warn!(%source_id, cursor = ?cursor, dead_pages = consecutive_dead,
                            "too many dead pages in a row, stopping run");
                        result.cursor = cursor;
                        break;
                    }
                    match self.client.skip_page(cursor.as_deref(), config.page_limit) {
                        Some(next) => {
                            warn!(%source_id, cursor = ?cursor, next = next.as_str(),
                                "skipping dead page");
                            // The skip itself is committed so a restart does
                            // not walk into the same dead page again.
                            self.ledger
                                .commit_page(source_id, Vec::new(), Some(&next))
                                .await?;
                            cursor = Some(next);
                            continue;
                        }
                        None => {
                            warn!(%source_id, cursor = ?cursor,
                                "page unskippable, stopping run");
                            result.cursor = cursor;
                            break;
                        }
                    }
                }
            };

            consecutive_dead = 0;

            let mut rows = Vec::with_capacity(page.records.len());
            for raw in &page.records {
                let (row, status) = self.process_record(source_id, raw, config).await?;
                result.record(status);
                if let Some(row) = row {
                    rows.push(row);
                }
            }

            self.ledger
                .commit_page(source_id, rows, page.next_cursor.as_deref())
                .await?;

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => {
                    result.cursor = None;
                    break;
                }
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        self.sink.emit(AuditEvent::SyncCompleted {
            source_id,
            result: result.clone(),
        });
        Ok(result)
    }

    /// Drive the page-fetch state machine until a page arrives or the retry
    /// budget is spent. `None` means the page is permanently dead.
    async fn fetch_with_retry(
        &self,
        source_id: Uuid,
        cursor: Option<&str>,
        config: &SyncConfig,
    ) -> Option<super::client::ApiPage> {
        let mut state = PageFetch::start();
        loop {
            match self.client.fetch_page(cursor, config.page_limit).await {
                Ok(page) => return Some(page),
                Err(e) => {
                    let transient = e.is_transient();
                    state = state.after_failure(&self.policy, transient);
                    match &state {
                        PageFetch::Retrying { attempt, delay } => {
                            warn!(%source_id, cursor = ?cursor, attempt, error = %e,
                                "page fetch failed, retrying");
                            tokio::time::sleep(*delay).await;
                        }
                        PageFetch::Failed { attempts } => {
                            warn!(%source_id, cursor = ?cursor, attempts, error = %e,
                                "page fetch exhausted retries");
                            self.sink.emit(AuditEvent::PageRetryExhausted {
                                source_id,
                                cursor: cursor.map(str::to_string),
                                attempts: *attempts,
                            });
                            return None;
                        }
                        PageFetch::Fetching { .. } => unreachable!("after_failure never yields Fetching"),
                    }
                }
            }
        }
    }

    /// Map, guard, dedup, and persist one raw record. Returns the ledger row
    /// (none for a silently skipped already-terminal record) and the status
    /// to count.
    async fn process_record(
        &self,
        source_id: Uuid,
        raw: &serde_json::Value,
        config: &SyncConfig,
    ) -> Result<(Option<SyncRecord>, RecordStatus), HarvestError> {
        let mapped = match mapping::apply(&config.mapping, raw) {
            Ok(mapped) => mapped,
            Err(e) => {
                warn!(%source_id, error = %e, "record failed field mapping");
                // No external id could be read, so the row keys on a
                // placeholder; the error text carries the detail.
                let external_id = mapping::lookup_path(raw, &config.mapping.id_path)
                    .and_then(|v| v.as_str())
                    .unwrap_or("<unmapped>");
                let row = SyncRecord::new(source_id, external_id).failed(e.to_string());
                return Ok((Some(row), RecordStatus::Failed));
            }
        };

        if !config.force {
            if let Some(existing) = self
                .ledger
                .terminal_record(source_id, &mapped.external_id)
                .await?
            {
                debug!(%source_id, external_id = mapped.external_id.as_str(),
                    status = ?existing.status, "record already synced, skipping");
                return Ok((None, RecordStatus::Pending));
            }
        }

        let (row, status) = self.resolve_entity(source_id, &mapped, config).await?;
        Ok((Some(row), status))
    }

    /// Route a mapped record through dedup: merge into the best match,
    /// queue for review, or create a new entity.
    async fn resolve_entity(
        &self,
        source_id: Uuid,
        mapped: &MappedEntity,
        config: &SyncConfig,
    ) -> Result<(SyncRecord, RecordStatus), HarvestError> {
        let row = SyncRecord::new(source_id, &mapped.external_id);

        // Refetched per record: an entity created earlier in this page must
        // be a candidate for the records after it.
        let existing = self
            .entities
            .entities_of_type(config.mapping.entity_type)
            .await?;

        let best = match self.dedup.best_match(&mapped.name, &existing).await {
            Ok(best) => best,
            Err(HarvestError::EmbeddingUnavailable(detail)) => {
                // Indeterminate comparison: never guess a merge.
                warn!(%source_id, external_id = mapped.external_id.as_str(),
                    error = detail.as_str(), "embedding unavailable, holding record");
                self.sink.emit(AuditEvent::ReviewQueued {
                    external_id: mapped.external_id.clone(),
                    best_match: None,
                    similarity: None,
                });
                return Ok((
                    row.resolved(RecordStatus::Skipped, None),
                    RecordStatus::Skipped,
                ));
            }
            Err(e) => return Err(e),
        };

        match best {
            Some(candidate) if candidate.decision == MatchDecision::Same => {
                let mut entity = existing
                    .into_iter()
                    .find(|e| e.id == candidate.candidate_id)
                    .ok_or_else(|| {
                        HarvestError::Storage(format!(
                            "matched entity {} disappeared",
                            candidate.candidate_id
                        ))
                    })?;
                for (key, value) in &mapped.attributes {
                    entity.attributes.insert(key.clone(), value.clone());
                }
                entity.updated_at = chrono::Utc::now();
                self.entities.update_entity(&entity).await?;

                self.sink.emit(AuditEvent::EntityMerged {
                    entity_id: entity.id,
                    external_id: mapped.external_id.clone(),
                    similarity: candidate.score,
                });
                Ok((
                    row.resolved(RecordStatus::Updated, Some(entity.id)),
                    RecordStatus::Updated,
                ))
            }
            Some(candidate) if candidate.decision == MatchDecision::Review => {
                self.sink.emit(AuditEvent::ReviewQueued {
                    external_id: mapped.external_id.clone(),
                    best_match: Some(candidate.candidate_id),
                    similarity: Some(candidate.score),
                });
                Ok((
                    row.resolved(RecordStatus::Skipped, None),
                    RecordStatus::Skipped,
                ))
            }
            _ => {
                let mut entity = Entity::new(
                    config.mapping.entity_type,
                    &mapped.name,
                    &normalize(&mapped.name),
                );
                entity.attributes = mapped.attributes.clone();
                entity.embedding = Some(self.dedup.embed_cached(&mapped.name).await?);
                self.entities.insert_entity(&entity).await?;

                self.sink.emit(AuditEvent::EntityCreated {
                    entity_id: entity.id,
                    name: entity.name.clone(),
                });
                Ok((
                    row.resolved(RecordStatus::Created, Some(entity.id)),
                    RecordStatus::Created,
                ))
            }
        }
    }
}
