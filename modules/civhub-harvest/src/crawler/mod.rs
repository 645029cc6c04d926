//! Crawler registry and dispatch.
//!
//! Each declared [`SourceType`] maps to exactly one [`Crawler`]
//! implementation. [`crawler_for`] is a total match over the closed enum, so
//! the compiler enforces that a new source type cannot ship without a
//! handler; [`CrawlerRegistry`] keeps the lookup explicit for callers that
//! assemble their own (possibly partial) registries from configuration.

mod api;
mod feed;
mod links;
mod oparl;
mod sparql;
mod website;

pub use api::ApiCrawler;
pub use feed::FeedCrawler;
pub use links::{extract_links, page_title};
pub use oparl::OparlCrawler;
pub use sparql::SparqlCrawler;
pub use website::WebsiteCrawler;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use civhub_common::types::{CrawlResult, DataSource, SourceType};
use civhub_common::HarvestError;

use crate::fetch::ConditionalClient;

/// What a crawl invocation hands back: the result plus the response
/// validators of the source's root URL (for the conditional-fetch cache).
#[derive(Debug)]
pub struct CrawlOutput {
    pub result: CrawlResult,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CrawlOutput {
    pub fn without_validators(result: CrawlResult) -> Self {
        Self {
            result,
            etag: None,
            last_modified: None,
        }
    }
}

/// One source-type-specific fetcher. Implementations perform network I/O;
/// selection never does.
#[async_trait]
pub trait Crawler: Send + Sync {
    async fn fetch(
        &self,
        source: &DataSource,
        client: Arc<ConditionalClient>,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutput, HarvestError>;
}

/// Total dispatch: every declared source type has a crawler. The REST-backed
/// civic portals share the generic API crawler — their differences live in
/// pagination presets and field mappings, not in fetch logic.
pub fn crawler_for(source_type: SourceType) -> Arc<dyn Crawler> {
    match source_type {
        SourceType::Website => Arc::new(WebsiteCrawler),
        SourceType::Rss => Arc::new(FeedCrawler),
        SourceType::Oparl => Arc::new(OparlCrawler),
        SourceType::Govdata
        | SourceType::DipBundestag
        | SourceType::FragDenStaat
        | SourceType::RestApi => Arc::new(ApiCrawler),
        SourceType::SparqlApi => Arc::new(SparqlCrawler),
    }
}

/// Explicit source-type → crawler lookup table.
pub struct CrawlerRegistry {
    crawlers: HashMap<SourceType, Arc<dyn Crawler>>,
}

impl CrawlerRegistry {
    const ALL_TYPES: [SourceType; 8] = [
        SourceType::Website,
        SourceType::Rss,
        SourceType::Oparl,
        SourceType::Govdata,
        SourceType::DipBundestag,
        SourceType::FragDenStaat,
        SourceType::RestApi,
        SourceType::SparqlApi,
    ];

    /// Registry with every declared type registered.
    pub fn standard() -> Self {
        let crawlers = Self::ALL_TYPES
            .into_iter()
            .map(|ty| (ty, crawler_for(ty)))
            .collect();
        Self { crawlers }
    }

    pub fn empty() -> Self {
        Self {
            crawlers: HashMap::new(),
        }
    }

    /// Adding a source type is a registration, not a rewrite of callers.
    pub fn register(&mut self, source_type: SourceType, crawler: Arc<dyn Crawler>) {
        self.crawlers.insert(source_type, crawler);
    }

    /// Pure selection — no network I/O.
    pub fn get(&self, source_type: SourceType) -> Result<Arc<dyn Crawler>, HarvestError> {
        self.crawlers
            .get(&source_type)
            .cloned()
            .ok_or(HarvestError::UnsupportedSourceType(source_type))
    }

    /// Startup check: every declared enum value has a handler.
    pub fn verify_complete(&self) -> Result<(), HarvestError> {
        for ty in Self::ALL_TYPES {
            if !self.crawlers.contains_key(&ty) {
                return Err(HarvestError::UnsupportedSourceType(ty));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_is_complete() {
        assert!(CrawlerRegistry::standard().verify_complete().is_ok());
    }

    #[test]
    fn missing_registration_is_unsupported() {
        let registry = CrawlerRegistry::empty();
        let err = registry.get(SourceType::Oparl).err().unwrap();
        assert!(matches!(
            err,
            HarvestError::UnsupportedSourceType(SourceType::Oparl)
        ));
        assert!(registry.verify_complete().is_err());
    }

    #[test]
    fn partial_registry_serves_what_it_has() {
        let mut registry = CrawlerRegistry::empty();
        registry.register(SourceType::Rss, crawler_for(SourceType::Rss));
        assert!(registry.get(SourceType::Rss).is_ok());
        assert!(registry.get(SourceType::Website).is_err());
    }
}
