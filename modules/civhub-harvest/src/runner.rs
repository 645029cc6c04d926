//! Per-source run orchestration.
//!
//! The scheduler calls [`HarvestRunner::run`] with a data source id. The
//! runner takes the per-source run lock, dispatches to the matching crawler
//! or to the sync engine, applies the content-hash downgrade for refetched
//! documents, persists validators and cursor, and always hands back a
//! [`RunSummary`] when the run itself survives.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use civhub_common::events::{AuditEvent, AuditSink};
use civhub_common::types::{DataSource, ProcessingStatus, RunKind, RunSummary};
use civhub_common::{Config, HarvestError};

use crate::crawler::CrawlerRegistry;
use crate::dedup::DedupEngine;
use crate::fetch::ConditionalClient;
use crate::store::{DocumentIndex, EntityStore, SourceStore, SyncLedger};
use crate::sync::{HttpApiClient, RetryPolicy, SyncConfig, SyncEngine};

pub struct HarvestRunner {
    sources: Arc<dyn SourceStore>,
    documents: Arc<dyn DocumentIndex>,
    entities: Arc<dyn EntityStore>,
    ledger: Arc<dyn SyncLedger>,
    dedup: Arc<DedupEngine>,
    sink: Arc<dyn AuditSink>,
    registry: CrawlerRegistry,
    client: Arc<ConditionalClient>,
    policy: RetryPolicy,
    in_flight: Mutex<HashSet<Uuid>>,
}

impl HarvestRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sources: Arc<dyn SourceStore>,
        documents: Arc<dyn DocumentIndex>,
        entities: Arc<dyn EntityStore>,
        ledger: Arc<dyn SyncLedger>,
        dedup: Arc<DedupEngine>,
        sink: Arc<dyn AuditSink>,
        config: &Config,
    ) -> Result<Self, HarvestError> {
        Ok(Self {
            sources,
            documents,
            entities,
            ledger,
            dedup,
            sink,
            registry: CrawlerRegistry::standard(),
            client: Arc::new(ConditionalClient::new(config)?),
            policy: RetryPolicy::from_config(config),
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    /// Swap in a custom (possibly partial) crawler registry.
    pub fn with_registry(mut self, registry: CrawlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub async fn run(&self, source_id: Uuid) -> Result<RunSummary, HarvestError> {
        self.run_with_cancel(source_id, CancellationToken::new(), false)
            .await
    }

    /// Run one source. `force` reprocesses sync records that already have a
    /// terminal ledger row. Concurrent runs of the same source are rejected
    /// with [`HarvestError::RunInProgress`]; different sources run freely in
    /// parallel.
    pub async fn run_with_cancel(
        &self,
        source_id: Uuid,
        cancel: CancellationToken,
        force: bool,
    ) -> Result<RunSummary, HarvestError> {
        let _guard = self.acquire(source_id)?;
        let started = Instant::now();

        let source = self
            .sources
            .get_source(source_id)
            .await?
            .ok_or_else(|| HarvestError::Storage(format!("unknown data source {source_id}")))?;

        let kind = if source.source_type.is_api_backed() {
            RunKind::Sync
        } else {
            RunKind::Crawl
        };

        info!(%source_id, name = source.name.as_str(), ?kind, "run started");
        self.sink.emit(AuditEvent::RunStarted { source_id, kind });

        let outcome = match kind {
            RunKind::Crawl => self.run_crawl(source, &cancel, started).await,
            RunKind::Sync => self.run_sync(source, &cancel, force, started).await,
        };

        match &outcome {
            Ok(summary) => {
                self.sink.emit(AuditEvent::RunCompleted {
                    source_id,
                    kind,
                    processed: summary.processed,
                    failed: summary.failed,
                });
            }
            Err(e) => {
                warn!(%source_id, error = %e, "run failed");
                self.sink.emit(AuditEvent::RunFailed {
                    source_id,
                    kind,
                    error: e.to_string(),
                });
            }
        }

        outcome
    }

    async fn run_crawl(
        &self,
        mut source: DataSource,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<RunSummary, HarvestError> {
        let crawler = self.registry.get(source.source_type)?;
        let output = crawler
            .fetch(&source, self.client.clone(), cancel)
            .await?;

        let unchanged = output
            .result
            .documents
            .iter()
            .all(|d| d.status == ProcessingStatus::Unchanged)
            && !output.result.documents.is_empty();

        if unchanged {
            // Stored validators stay; only the attempt timestamp moves.
            self.sink.emit(AuditEvent::SourceUnchanged {
                source_id: source.id,
                url: source.url.clone(),
            });
            source.last_crawl = Some(chrono::Utc::now());
            self.sources.update_source(&source).await?;

            return Ok(RunSummary {
                source_id: source.id,
                kind: RunKind::Crawl,
                processed: 0,
                filtered: 0,
                failed: 0,
                unchanged: true,
                sync: None,
                duration: started.elapsed(),
            });
        }

        let mut result = output.result;

        // Refetched-but-identical documents are excluded from downstream
        // analysis without losing the fetch record.
        let known = self.documents.known_hashes(source.id).await?;
        let mut fresh_hashes = Vec::new();
        for document in &mut result.documents {
            if document.status != ProcessingStatus::Pending {
                continue;
            }
            if known.contains(&document.content_hash) {
                document.status = ProcessingStatus::Filtered;
            } else {
                fresh_hashes.push(document.content_hash.clone());
            }
        }
        self.documents.remember_hashes(source.id, &fresh_hashes).await?;

        source.etag = output.etag;
        source.last_modified = output.last_modified;
        source.last_crawl = Some(chrono::Utc::now());
        self.sources.update_source(&source).await?;

        Ok(RunSummary {
            source_id: source.id,
            kind: RunKind::Crawl,
            processed: result.count(ProcessingStatus::Pending) as u32,
            filtered: result.count(ProcessingStatus::Filtered) as u32,
            failed: result.count(ProcessingStatus::Failed) as u32,
            unchanged: false,
            sync: None,
            duration: started.elapsed(),
        })
    }

    async fn run_sync(
        &self,
        mut source: DataSource,
        cancel: &CancellationToken,
        force: bool,
        started: Instant,
    ) -> Result<RunSummary, HarvestError> {
        let mapping = source.field_mapping.clone().ok_or_else(|| {
            HarvestError::Config(format!(
                "api-backed source '{}' has no field mapping",
                source.name
            ))
        })?;

        let api = HttpApiClient::for_source(&source, self.client.clone())?;
        let engine = SyncEngine::new(
            Arc::new(api),
            self.entities.clone(),
            self.ledger.clone(),
            self.dedup.clone(),
            self.sink.clone(),
            self.policy.clone(),
        );

        let sync_config = SyncConfig::builder()
            .mapping(mapping)
            .page_limit(source.page_limit)
            .force(force)
            .resume_cursor(source.last_cursor.clone())
            .build();

        let result = engine.sync(source.id, &sync_config, cancel).await?;

        source.last_cursor = result.cursor.clone();
        source.last_crawl = Some(chrono::Utc::now());
        self.sources.update_source(&source).await?;

        Ok(RunSummary {
            source_id: source.id,
            kind: RunKind::Sync,
            processed: result.created + result.updated,
            filtered: result.skipped,
            failed: result.failed,
            unchanged: false,
            sync: Some(result),
            duration: started.elapsed(),
        })
    }

    fn acquire(&self, source_id: Uuid) -> Result<RunGuard<'_>, HarvestError> {
        let mut in_flight = self.in_flight.lock().expect("run lock poisoned");
        if !in_flight.insert(source_id) {
            return Err(HarvestError::RunInProgress(source_id));
        }
        Ok(RunGuard {
            in_flight: &self.in_flight,
            source_id,
        })
    }
}

/// Releases the per-source run slot on every exit path.
struct RunGuard<'a> {
    in_flight: &'a Mutex<HashSet<Uuid>>,
    source_id: Uuid,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .expect("run lock poisoned")
            .remove(&self.source_id);
    }
}
