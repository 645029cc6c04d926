//! Generic crawler over the paginated REST portals.
//!
//! Used when a structured API source is crawled for raw documents instead of
//! synced into entities — each record lands as one JSON document. API pages
//! are not served with usable validators, so the output never carries any.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use civhub_common::types::{CrawlDocument, CrawlResult, DataSource};
use civhub_common::HarvestError;

use super::{CrawlOutput, Crawler};
use crate::fetch::ConditionalClient;
use crate::sync::{ApiClient, HttpApiClient};

pub struct ApiCrawler;

#[async_trait]
impl Crawler for ApiCrawler {
    async fn fetch(
        &self,
        source: &DataSource,
        client: Arc<ConditionalClient>,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutput, HarvestError> {
        let started_at = Utc::now();
        let api = HttpApiClient::for_source(source, client)?;

        let mut documents = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..source.max_pages {
            if cancel.is_cancelled() {
                debug!(url = source.url.as_str(), "crawl cancelled at page boundary");
                break;
            }

            let page = api.fetch_page(cursor.as_deref(), source.page_limit).await?;
            let base = documents.len();
            for (index, record) in page.records.iter().enumerate() {
                documents.push(record_to_document(source, base + index, record));
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!(
            url = source.url.as_str(),
            records = documents.len(),
            "api source crawled"
        );

        Ok(CrawlOutput::without_validators(CrawlResult {
            source_id: source.id,
            documents,
            started_at,
            finished_at: Utc::now(),
        }))
    }
}

fn record_to_document(
    source: &DataSource,
    index: usize,
    record: &serde_json::Value,
) -> CrawlDocument {
    let url = record
        .get("id")
        .and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .map(|id| format!("{}#{id}", source.url))
        .unwrap_or_else(|| format!("{}#record-{index}", source.url));

    let title = record
        .get("title")
        .or_else(|| record.get("name"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    CrawlDocument::new(&url, title, record.to_string())
}
