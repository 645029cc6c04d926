//! Paginated API clients for the structured civic portals.
//!
//! One generic HTTP client covers GovData (CKAN), DIP Bundestag,
//! FragDenStaat, and plain REST endpoints — their differences are a records
//! path and a pagination preset, not bespoke fetch logic.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use civhub_common::types::{DataSource, SourceType};
use civhub_common::HarvestError;

use super::mapping::lookup_path;
use crate::fetch::ConditionalClient;

/// One page of raw records from an external API.
#[derive(Debug, Clone, Default)]
pub struct ApiPage {
    pub records: Vec<serde_json::Value>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Fetch the page at `cursor` (`None` = first page).
    async fn fetch_page(&self, cursor: Option<&str>, limit: u32) -> Result<ApiPage, HarvestError>;

    /// Best-effort cursor advance past a page whose fetch permanently
    /// failed. `None` means the pagination scheme cannot skip, and the run
    /// must stop at this page.
    fn skip_page(&self, cursor: Option<&str>, limit: u32) -> Option<String> {
        let _ = (cursor, limit);
        None
    }
}

/// How an endpoint pages its results.
#[derive(Debug, Clone)]
pub enum Pagination {
    /// Numeric offset in a query parameter; the cursor is the offset.
    Offset {
        offset_param: &'static str,
        limit_param: &'static str,
    },
    /// Opaque continuation token echoed back by the response.
    Cursor {
        cursor_param: &'static str,
        limit_param: &'static str,
        next_path: &'static str,
    },
}

pub struct HttpApiClient {
    client: Arc<ConditionalClient>,
    base_url: String,
    records_path: String,
    pagination: Pagination,
}

impl HttpApiClient {
    pub fn new(
        client: Arc<ConditionalClient>,
        base_url: &str,
        records_path: &str,
        pagination: Pagination,
    ) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            records_path: records_path.to_string(),
            pagination,
        }
    }

    /// Portal presets. The schemas differ per portal, but only in where the
    /// records live and how the next page is addressed.
    pub fn for_source(
        source: &DataSource,
        client: Arc<ConditionalClient>,
    ) -> Result<Self, HarvestError> {
        let (records_path, pagination) = match source.source_type {
            SourceType::Govdata => (
                "result.results",
                Pagination::Offset {
                    offset_param: "start",
                    limit_param: "rows",
                },
            ),
            SourceType::DipBundestag => (
                "documents",
                Pagination::Cursor {
                    cursor_param: "cursor",
                    limit_param: "rows",
                    next_path: "cursor",
                },
            ),
            SourceType::FragDenStaat => (
                "objects",
                Pagination::Offset {
                    offset_param: "offset",
                    limit_param: "limit",
                },
            ),
            SourceType::RestApi => (
                "data",
                Pagination::Offset {
                    offset_param: "offset",
                    limit_param: "limit",
                },
            ),
            other => return Err(HarvestError::UnsupportedSourceType(other)),
        };

        Ok(Self::new(client, &source.url, records_path, pagination))
    }

    fn page_url(&self, cursor: Option<&str>, limit: u32) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        match &self.pagination {
            Pagination::Offset {
                offset_param,
                limit_param,
            } => {
                let offset = cursor.and_then(|c| c.parse::<u64>().ok()).unwrap_or(0);
                format!(
                    "{}{separator}{offset_param}={offset}&{limit_param}={limit}",
                    self.base_url
                )
            }
            Pagination::Cursor {
                cursor_param,
                limit_param,
                ..
            } => match cursor {
                Some(token) => format!(
                    "{}{separator}{cursor_param}={token}&{limit_param}={limit}",
                    self.base_url
                ),
                None => format!("{}{separator}{limit_param}={limit}", self.base_url),
            },
        }
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn fetch_page(&self, cursor: Option<&str>, limit: u32) -> Result<ApiPage, HarvestError> {
        let url = self.page_url(cursor, limit);
        debug!(url = url.as_str(), "fetching API page");

        let body = self.client.get_text(&url).await?;
        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| HarvestError::Anyhow(anyhow::anyhow!("API response is not JSON: {e}")))?;

        let records: Vec<serde_json::Value> = match lookup_path(&parsed, &self.records_path) {
            Some(serde_json::Value::Array(items)) => items.clone(),
            Some(_) | None => Vec::new(),
        };

        let next_cursor = match &self.pagination {
            Pagination::Offset { .. } => {
                if records.is_empty() || (records.len() as u32) < limit {
                    None
                } else {
                    let offset = cursor.and_then(|c| c.parse::<u64>().ok()).unwrap_or(0);
                    Some((offset + limit as u64).to_string())
                }
            }
            Pagination::Cursor { next_path, .. } => {
                let next = lookup_path(&parsed, next_path)
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                // Some cursor APIs (DIP) signal the last page by echoing the
                // same cursor back.
                match (next, cursor) {
                    (Some(n), Some(c)) if n == c => None,
                    (next, _) => next.filter(|_| !records.is_empty()),
                }
            }
        };

        Ok(ApiPage {
            records,
            next_cursor,
        })
    }

    fn skip_page(&self, cursor: Option<&str>, limit: u32) -> Option<String> {
        match &self.pagination {
            Pagination::Offset { .. } => {
                let offset = cursor.and_then(|c| c.parse::<u64>().ok()).unwrap_or(0);
                Some((offset + limit as u64).to_string())
            }
            // An opaque token from a dead page cannot be advanced.
            Pagination::Cursor { .. } => None,
        }
    }
}
