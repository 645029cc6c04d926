//! SPARQL endpoint crawler.
//!
//! The source URL is a complete SELECT query URL (endpoint plus encoded
//! `query=` parameter). Responses follow the SPARQL 1.1 JSON results format:
//! `{ "head": { "vars": [...] }, "results": { "bindings": [...] } }`. Each
//! binding row becomes one document.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use civhub_common::types::{CrawlDocument, CrawlResult, DataSource};
use civhub_common::HarvestError;

use super::{CrawlOutput, Crawler};
use crate::fetch::{ConditionalClient, FetchOutcome, Validators};

pub struct SparqlCrawler;

#[async_trait]
impl Crawler for SparqlCrawler {
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
                info!(url = source.url.as_str(), "sparql result unchanged");
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

        let parsed: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            HarvestError::Anyhow(anyhow::anyhow!("sparql response is not JSON: {e}"))
        })?;

        let bindings = parsed
            .get("results")
            .and_then(|r| r.get("bindings"))
            .and_then(|b| b.as_array())
            .ok_or_else(|| {
                HarvestError::Anyhow(anyhow::anyhow!(
                    "sparql response has no results.bindings for {}",
                    source.url
                ))
            })?;

        let documents: Vec<CrawlDocument> = bindings
            .iter()
            .enumerate()
            .take(source.max_pages as usize)
            .map(|(row, binding)| binding_to_document(source, row, binding))
            .collect();

        info!(
            url = source.url.as_str(),
            rows = documents.len(),
            "sparql result parsed"
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

/// A binding row's URL is its first URI-typed value; rows without one key on
/// the query URL and row index.
fn binding_to_document(
    source: &DataSource,
    row: usize,
    binding: &serde_json::Value,
) -> CrawlDocument {
    let values = binding.as_object();

    let url = values
        .and_then(|map| {
            map.values().find_map(|v| {
                (v.get("type").and_then(|t| t.as_str()) == Some("uri"))
                    .then(|| v.get("value").and_then(|s| s.as_str()))
                    .flatten()
            })
        })
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}#row-{row}", source.url));

    let title = values
        .and_then(|map| map.get("label").or_else(|| map.get("name")))
        .and_then(|v| v.get("value"))
        .and_then(|s| s.as_str())
        .map(str::to_string);

    CrawlDocument::new(&url, title, binding.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use civhub_common::types::{ProcessingStatus, SourceType};
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn results_body() -> serde_json::Value {
        json!({
            "head": { "vars": ["item", "label"] },
            "results": { "bindings": [
                {
                    "item": { "type": "uri", "value": "http://data.example.de/gemeinde/1" },
                    "label": { "type": "literal", "value": "Gemeinde Musterstadt" }
                },
                {
                    "label": { "type": "literal", "value": "Ohne URI" }
                }
            ]}
        })
    }

    #[tokio::test]
    async fn bindings_become_documents() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(results_body()))
            .mount(&server)
            .await;

        let source = DataSource::new("lod", &server.uri(), SourceType::SparqlApi);
        let output = SparqlCrawler
            .fetch(&source, Arc::new(ConditionalClient::for_tests()), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.result.documents.len(), 2);
        assert_eq!(
            output.result.documents[0].url,
            "http://data.example.de/gemeinde/1"
        );
        assert_eq!(
            output.result.documents[0].title.as_deref(),
            Some("Gemeinde Musterstadt")
        );
        // Rows without a URI still get a stable synthetic URL.
        assert!(output.result.documents[1].url.contains("#row-1"));
    }

    #[tokio::test]
    async fn malformed_response_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "head": {} })))
            .mount(&server)
            .await;

        let source = DataSource::new("lod", &server.uri(), SourceType::SparqlApi);
        let err = SparqlCrawler
            .fetch(&source, Arc::new(ConditionalClient::for_tests()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bindings"));
    }

    #[tokio::test]
    async fn unchanged_result_short_circuits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let mut source = DataSource::new("lod", &server.uri(), SourceType::SparqlApi);
        source.etag = Some("\"q1\"".to_string());

        let output = SparqlCrawler
            .fetch(&source, Arc::new(ConditionalClient::for_tests()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output.result.documents[0].status, ProcessingStatus::Unchanged);
    }
}
