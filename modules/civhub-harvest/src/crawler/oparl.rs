//! OParl council information system crawler.
//!
//! OParl list endpoints return `{ "data": [...], "links": { "next": url } }`
//! pages of typed municipal objects (papers, meetings, organizations). Only
//! the first page is fetched conditionally — `next` links are unique URLs
//! with no stored validators.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use civhub_common::types::{CrawlDocument, CrawlResult, DataSource, ProcessingStatus};
use civhub_common::HarvestError;

use super::{CrawlOutput, Crawler};
use crate::fetch::{ConditionalClient, FetchOutcome, Validators};

pub struct OparlCrawler;

#[async_trait]
impl Crawler for OparlCrawler {
    async fn fetch(
        &self,
        source: &DataSource,
        client: Arc<ConditionalClient>,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutput, HarvestError> {
        let started_at = Utc::now();

        let outcome = client
            .get(&source.url, &Validators::from_source(source))
            .await?;

        let (first_body, etag, last_modified) = match outcome {
            FetchOutcome::NotModified => {
                info!(url = source.url.as_str(), "oparl list unchanged");
                let result = CrawlResult {
                    source_id: source.id,
                    documents: vec![CrawlDocument::unchanged(&source.url)],
                    started_at,
                    finished_at: Utc::now(),
                };
                return Ok(CrawlOutput::without_validators(result));
            }
            FetchOutcome::Fresh {
                body,
                etag,
                last_modified,
            } => (body, etag, last_modified),
        };

        let mut documents = Vec::new();
        let mut body = first_body;
        let mut pages = 0u32;

        loop {
            if cancel.is_cancelled() {
                debug!(url = source.url.as_str(), "crawl cancelled at page boundary");
                break;
            }

            let page: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
                HarvestError::Anyhow(anyhow::anyhow!("oparl page is not JSON: {e}"))
            })?;

            for object in page
                .get("data")
                .and_then(|d| d.as_array())
                .into_iter()
                .flatten()
            {
                documents.push(object_to_document(object));
            }

            pages += 1;
            if pages >= source.max_pages {
                break;
            }

            let next = page
                .get("links")
                .and_then(|l| l.get("next"))
                .and_then(|n| n.as_str())
                .map(str::to_string);
            match next {
                Some(url) => match client.get_text(&url).await {
                    Ok(next_body) => body = next_body,
                    Err(e) => {
                        // A dead continuation page loses its tail, not the
                        // objects already collected.
                        warn!(url = url.as_str(), error = %e, "oparl next page failed");
                        break;
                    }
                },
                None => break,
            }
        }

        info!(
            url = source.url.as_str(),
            objects = documents.len(),
            pages,
            "oparl list crawled"
        );

        Ok(CrawlOutput {
            result: CrawlResult {
                source_id: source.id,
                documents,
                started_at,
                finished_at: Utc::now(),
            },
            etag,
            last_modified,
        })
    }
}

/// One OParl object becomes one document; its `id` is its canonical URL.
fn object_to_document(object: &serde_json::Value) -> CrawlDocument {
    let url = object.get("id").and_then(|v| v.as_str()).unwrap_or_default();
    let title = object
        .get("name")
        .or_else(|| object.get("shortName"))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let content = object.to_string();

    if url.is_empty() {
        let mut document = CrawlDocument::new("", title, content);
        document.status = ProcessingStatus::Failed;
        document.error = Some("oparl object has no id".to_string());
        document
    } else {
        CrawlDocument::new(url, title, content)
    }
}
