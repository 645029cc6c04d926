//! RSS/Atom feed crawler.
//!
//! Feeds are the one crawl target where conditional requests pay off almost
//! every run — most feed servers send ETags and most polls find nothing new.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use civhub_common::types::{CrawlDocument, CrawlResult, DataSource};
use civhub_common::HarvestError;

use super::{CrawlOutput, Crawler};
use crate::fetch::{ConditionalClient, FetchOutcome, Validators};

/// Entries older than this are stale civic news, not worth re-analyzing.
const FEED_MAX_AGE_DAYS: i64 = 30;

pub struct FeedCrawler;

#[async_trait]
impl Crawler for FeedCrawler {
    async fn fetch(
        &self,
        source: &DataSource,
        client: Arc<ConditionalClient>,
        _cancel: &CancellationToken,
    ) -> Result<CrawlOutput, HarvestError> {
        let started_at = Utc::now();

        let outcome = client
            .get(&source.url, &Validators::from_source(source))
            .await?;

        let (body, etag, last_modified) = match outcome {
            FetchOutcome::NotModified => {
                info!(url = source.url.as_str(), "feed unchanged");
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

        let feed = feed_rs::parser::parse(body.as_bytes())
            .map_err(|e| HarvestError::Anyhow(anyhow::anyhow!("feed parse failed: {e}")))?;

        let cutoff = Utc::now() - chrono::Duration::days(FEED_MAX_AGE_DAYS);

        let documents: Vec<CrawlDocument> = feed
            .entries
            .into_iter()
            .filter_map(|entry| {
                let url = entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))?;

                let published = entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.with_timezone(&Utc));
                if let Some(date) = published {
                    if date < cutoff {
                        return None;
                    }
                }

                let title = entry.title.map(|t| t.content);
                let content = entry
                    .content
                    .and_then(|c| c.body)
                    .or_else(|| entry.summary.map(|s| s.content))
                    .unwrap_or_default();

                Some(CrawlDocument::new(&url, title, content))
            })
            .take(source.max_pages as usize)
            .collect();

        info!(
            url = source.url.as_str(),
            items = documents.len(),
            "feed parsed"
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
