//! Website crawler: breadth-first page walk bounded by depth and page count.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use civhub_common::types::{CrawlDocument, CrawlResult, DataSource, ProcessingStatus};
use civhub_common::HarvestError;

use super::links::{extract_links, page_title};
use super::{CrawlOutput, Crawler};
use crate::fetch::{ConditionalClient, FetchOutcome, Validators};

pub struct WebsiteCrawler;

#[async_trait]
impl Crawler for WebsiteCrawler {
    async fn fetch(
        &self,
        source: &DataSource,
        client: Arc<ConditionalClient>,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutput, HarvestError> {
        let started_at = Utc::now();

        // Conditional fetch gates the whole crawl on the start page.
        let root = client
            .get(&source.url, &Validators::from_source(source))
            .await?;

        let (body, etag, last_modified) = match root {
            FetchOutcome::NotModified => {
                info!(url = source.url.as_str(), "website unchanged, skipping crawl");
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
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(source.url.clone());

        let mut frontier: Vec<String> = extract_links(&body, &source.url)
            .into_iter()
            .filter(|u| source.allows_url(u))
            .collect();
        documents.push(CrawlDocument::new(&source.url, page_title(&body), body));

        // Breadth-first walk, one level per iteration.
        for depth in 1..=source.crawl_depth {
            if frontier.is_empty() || documents.len() as u32 >= source.max_pages {
                break;
            }
            let mut next_frontier = Vec::new();

            for url in frontier.drain(..) {
                if documents.len() as u32 >= source.max_pages {
                    break;
                }
                if cancel.is_cancelled() {
                    debug!(url = source.url.as_str(), "crawl cancelled at page boundary");
                    break;
                }
                if !visited.insert(url.clone()) {
                    continue;
                }

                match client.get_text(&url).await {
                    Ok(page) => {
                        if depth < source.crawl_depth {
                            next_frontier.extend(
                                extract_links(&page, &url)
                                    .into_iter()
                                    .filter(|u| source.allows_url(u) && !visited.contains(u)),
                            );
                        }
                        documents.push(CrawlDocument::new(&url, page_title(&page), page));
                    }
                    Err(e) => {
                        warn!(url = url.as_str(), error = %e, "page fetch failed");
                        let mut doc = CrawlDocument::new(&url, None, String::new());
                        doc.status = ProcessingStatus::Failed;
                        doc.error = Some(e.to_string());
                        documents.push(doc);
                    }
                }
            }

            frontier = next_frontier;
        }

        info!(
            url = source.url.as_str(),
            pages = documents.len(),
            "website crawl finished"
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
