//! Shared domain types for the civhub ingestion engine.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Source types
// ---------------------------------------------------------------------------

/// Declared type of a configured data source. Closed set — dispatch matches
/// exhaustively, so adding a variant is a compile-time event, not a runtime
/// surprise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Website,
    Rss,
    Oparl,
    Govdata,
    DipBundestag,
    FragDenStaat,
    RestApi,
    SparqlApi,
}

impl SourceType {
    /// True for sources synchronized record-by-record through the sync
    /// engine rather than crawled page-by-page.
    pub fn is_api_backed(&self) -> bool {
        matches!(
            self,
            SourceType::Govdata
                | SourceType::DipBundestag
                | SourceType::FragDenStaat
                | SourceType::RestApi
        )
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceType::Website => "website",
            SourceType::Rss => "rss",
            SourceType::Oparl => "oparl",
            SourceType::Govdata => "govdata",
            SourceType::DipBundestag => "dip_bundestag",
            SourceType::FragDenStaat => "frag_den_staat",
            SourceType::RestApi => "rest_api",
            SourceType::SparqlApi => "sparql_api",
        };
        f.write_str(s)
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "website" => Ok(SourceType::Website),
            "rss" => Ok(SourceType::Rss),
            "oparl" => Ok(SourceType::Oparl),
            "govdata" => Ok(SourceType::Govdata),
            "dip_bundestag" => Ok(SourceType::DipBundestag),
            "frag_den_staat" => Ok(SourceType::FragDenStaat),
            "rest_api" => Ok(SourceType::RestApi),
            "sparql_api" => Ok(SourceType::SparqlApi),
            other => Err(format!("unknown source type: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Field mapping
// ---------------------------------------------------------------------------

/// One attribute of the target entity, filled from a dotted JSON path into
/// the raw external record (e.g. `"result.title"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldAssignment {
    pub attribute: String,
    pub path: String,
    #[serde(default)]
    pub required: bool,
}

/// Declarative mapping from external-API records to entity fields. Pure
/// configuration — the application logic lives in the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Path to the record's stable external id.
    pub id_path: String,
    pub entity_type: EntityType,
    pub assignments: Vec<FieldAssignment>,
}

impl FieldMapping {
    /// Minimal mapping: external id plus a required name attribute.
    pub fn minimal(entity_type: EntityType, id_path: &str, name_path: &str) -> Self {
        Self {
            id_path: id_path.to_string(),
            entity_type,
            assignments: vec![FieldAssignment {
                attribute: "name".to_string(),
                path: name_path.to_string(),
                required: true,
            }],
        }
    }
}

// ---------------------------------------------------------------------------
// DataSource
// ---------------------------------------------------------------------------

/// A configured origin to crawl or sync. Mutated after every run attempt
/// (validators, last-crawl timestamp, resume cursor); never deleted while
/// referenced by history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub source_type: SourceType,
    /// Link-following depth for website crawls (0 = only the start page).
    pub crawl_depth: u32,
    /// Hard cap on pages fetched in one crawl.
    pub max_pages: u32,
    /// Substring patterns a followed URL must match (empty = allow all).
    pub include_patterns: Vec<String>,
    /// Substring patterns that exclude a followed URL.
    pub exclude_patterns: Vec<String>,
    /// HTTP validators from the previous crawl.
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_crawl: Option<DateTime<Utc>>,
    /// Resume cursor for API-backed sources.
    pub last_cursor: Option<String>,
    /// Record-to-entity mapping for API-backed sources.
    pub field_mapping: Option<FieldMapping>,
    /// Records per page requested from API-backed sources.
    pub page_limit: u32,
    pub tags: Vec<String>,
}

impl DataSource {
    pub fn new(name: &str, url: &str, source_type: SourceType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            url: url.to_string(),
            source_type,
            crawl_depth: 1,
            max_pages: 50,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            etag: None,
            last_modified: None,
            last_crawl: None,
            last_cursor: None,
            field_mapping: None,
            page_limit: 100,
            tags: Vec::new(),
        }
    }

    /// Apply include/exclude patterns to a candidate URL.
    pub fn allows_url(&self, url: &str) -> bool {
        if self.exclude_patterns.iter().any(|p| url.contains(p.as_str())) {
            return false;
        }
        self.include_patterns.is_empty()
            || self.include_patterns.iter().any(|p| url.contains(p.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Crawl output
// ---------------------------------------------------------------------------

/// Outcome of processing one fetched document within a crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processed,
    Failed,
    /// Fetched, but excluded from downstream analysis (content hash seen before).
    Filtered,
    /// Conditional fetch short-circuit: the source reported no change.
    Unchanged,
}

/// One fetched page/record inside a [`CrawlResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlDocument {
    pub url: String,
    pub title: Option<String>,
    pub content: String,
    pub content_hash: String,
    pub status: ProcessingStatus,
    pub error: Option<String>,
}

impl CrawlDocument {
    pub fn new(url: &str, title: Option<String>, content: String) -> Self {
        let content_hash = content_hash(&content);
        Self {
            url: url.to_string(),
            title,
            content,
            content_hash,
            status: ProcessingStatus::Pending,
            error: None,
        }
    }

    /// Synthetic entry for a not-modified source: no content was transferred.
    pub fn unchanged(url: &str) -> Self {
        Self {
            url: url.to_string(),
            title: None,
            content: String::new(),
            content_hash: String::new(),
            status: ProcessingStatus::Unchanged,
            error: None,
        }
    }
}

/// In-memory output of one crawl invocation. Owned by that invocation,
/// consumed once downstream, never persisted as-is.
#[derive(Debug, Clone)]
pub struct CrawlResult {
    pub source_id: Uuid,
    pub documents: Vec<CrawlDocument>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CrawlResult {
    pub fn count(&self, status: ProcessingStatus) -> usize {
        self.documents.iter().filter(|d| d.status == status).count()
    }
}

// ---------------------------------------------------------------------------
// Sync ledger
// ---------------------------------------------------------------------------

/// Terminal (or pending) outcome of one external record in one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Created,
    Updated,
    /// Ambiguous match or indeterminate comparison — held for manual review.
    Skipped,
    Failed,
}

impl RecordStatus {
    /// A terminal record is not reprocessed on resume unless explicitly forced.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordStatus::Created | RecordStatus::Updated)
    }
}

/// Append-only ledger row: one external-API record's processing outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRecord {
    pub id: Uuid,
    pub source_id: Uuid,
    pub external_id: String,
    pub entity_id: Option<Uuid>,
    pub status: RecordStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncRecord {
    pub fn new(source_id: Uuid, external_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            source_id,
            external_id: external_id.to_string(),
            entity_id: None,
            status: RecordStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn resolved(mut self, status: RecordStatus, entity_id: Option<Uuid>) -> Self {
        self.status = status;
        self.entity_id = entity_id;
        self.updated_at = Utc::now();
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.status = RecordStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
        self
    }
}

/// Aggregate summary of one sync run, derived from its ledger rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResult {
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
    pub failed: u32,
    /// Pages whose fetch exhausted the retry ceiling.
    pub pages_failed: u32,
    pub duration_ms: u64,
    /// Cursor to resume from on the next run.
    pub cursor: Option<String>,
    pub cancelled: bool,
}

impl SyncResult {
    pub fn record(&mut self, status: RecordStatus) {
        match status {
            RecordStatus::Created => self.created += 1,
            RecordStatus::Updated => self.updated += 1,
            RecordStatus::Skipped => self.skipped += 1,
            RecordStatus::Failed => self.failed += 1,
            RecordStatus::Pending => {}
        }
    }

    pub fn total(&self) -> u32 {
        self.created + self.updated + self.skipped + self.failed
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Kind of real-world thing an entity row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Municipality,
    Organization,
    Person,
    Document,
    Topic,
}

/// A deduplicated entity in the unified store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub name: String,
    /// Normalized form of `name`, the dedup comparison key.
    pub normalized_name: String,
    pub attributes: HashMap<String, serde_json::Value>,
    /// Cached name embedding, populated lazily by the dedup engine's caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(entity_type: EntityType, name: &str, normalized_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            entity_type,
            name: name.to_string(),
            normalized_name: normalized_name.to_string(),
            attributes: HashMap::new(),
            embedding: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Crawl,
    Sync,
}

/// What the scheduler gets back from `run(data_source_id)`: a run always
/// completes with a summary, even under partial failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub source_id: Uuid,
    pub kind: RunKind,
    pub processed: u32,
    pub filtered: u32,
    pub failed: u32,
    pub unchanged: bool,
    pub sync: Option<SyncResult>,
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// Content hashing
// ---------------------------------------------------------------------------

/// sha256 hex digest of a document body. Stable across runs, used for the
/// fetched-but-unchanged `Filtered` downgrade.
pub fn content_hash(content: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_type_round_trips_through_str() {
        for ty in [
            SourceType::Website,
            SourceType::Rss,
            SourceType::Oparl,
            SourceType::Govdata,
            SourceType::DipBundestag,
            SourceType::FragDenStaat,
            SourceType::RestApi,
            SourceType::SparqlApi,
        ] {
            assert_eq!(ty.to_string().parse::<SourceType>(), Ok(ty));
        }
    }

    #[test]
    fn api_backed_partition() {
        assert!(SourceType::RestApi.is_api_backed());
        assert!(SourceType::Govdata.is_api_backed());
        assert!(!SourceType::Website.is_api_backed());
        assert!(!SourceType::Rss.is_api_backed());
        assert!(!SourceType::SparqlApi.is_api_backed());
    }

    #[test]
    fn url_patterns_filter_candidates() {
        let mut source = DataSource::new("rat", "https://stadt.example.de", SourceType::Website);
        source.include_patterns = vec!["/rat/".to_string()];
        source.exclude_patterns = vec!["/archiv/".to_string()];

        assert!(source.allows_url("https://stadt.example.de/rat/sitzung-2026"));
        assert!(!source.allows_url("https://stadt.example.de/rat/archiv/2019"));
        assert!(!source.allows_url("https://stadt.example.de/impressum"));
    }

    #[test]
    fn terminal_statuses_guard_reprocessing() {
        assert!(RecordStatus::Created.is_terminal());
        assert!(RecordStatus::Updated.is_terminal());
        assert!(!RecordStatus::Failed.is_terminal());
        assert!(!RecordStatus::Skipped.is_terminal());
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
    }
}
