//! Conditional HTTP fetching with ETag / Last-Modified validators.
//!
//! Before a crawl downloads anything, the source's stored validators ride
//! along as `If-None-Match` / `If-Modified-Since`. A 304 short-circuits the
//! whole crawl to a single `Unchanged` result. Targets that never send
//! validators simply miss the optimization — that is never an error.

use reqwest::header::{self, HeaderValue};
use reqwest::StatusCode;
use tracing::debug;

use civhub_common::{Config, HarvestError};

/// Validators carried from the previous crawl of a source.
#[derive(Debug, Clone, Default)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validators {
    pub fn from_source(source: &civhub_common::DataSource) -> Self {
        Self {
            etag: source.etag.clone(),
            last_modified: source.last_modified.clone(),
        }
    }

    /// No stored validators — every fetch is unconditional.
    pub fn none() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
pub enum FetchOutcome {
    /// The target confirmed our cached view is current (HTTP 304).
    NotModified,
    Fresh {
        body: String,
        /// Validators from the response; `None` when the target sends none.
        etag: Option<String>,
        last_modified: Option<String>,
    },
}

/// HTTP client that attaches conditional headers and classifies failures
/// into transient (retryable) and terminal.
pub struct ConditionalClient {
    http: reqwest::Client,
}

impl ConditionalClient {
    pub fn new(config: &Config) -> Result<Self, HarvestError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| HarvestError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn for_tests() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(5))
                .build()
                .expect("reqwest client"),
        }
    }

    /// Conditional GET. Transient failures (timeout, connect, 429, 5xx) come
    /// back as [`HarvestError::TransientFetch`] so the caller's retry policy
    /// can take over.
    pub async fn get(&self, url: &str, validators: &Validators) -> Result<FetchOutcome, HarvestError> {
        let mut request = self.http.get(url);
        if let Some(etag) = &validators.etag {
            request = request.header(header::IF_NONE_MATCH, etag.as_str());
        }
        if let Some(last_modified) = &validators.last_modified {
            request = request.header(header::IF_MODIFIED_SINCE, last_modified.as_str());
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            debug!(url, "not modified");
            return Ok(FetchOutcome::NotModified);
        }

        if !status.is_success() {
            let msg = format!("HTTP {status} for {url}");
            return if is_transient_status(status) {
                Err(HarvestError::TransientFetch(msg))
            } else {
                Err(HarvestError::Anyhow(anyhow::anyhow!(msg)))
            };
        }

        let etag = header_string(&response, header::ETAG);
        let last_modified = header_string(&response, header::LAST_MODIFIED);
        let body = response
            .text()
            .await
            .map_err(|e| HarvestError::TransientFetch(format!("body read failed for {url}: {e}")))?;

        Ok(FetchOutcome::Fresh {
            body,
            etag,
            last_modified,
        })
    }

    /// Unconditional GET returning the body. Used for subpages and API pages
    /// where per-URL validators are not tracked.
    pub async fn get_text(&self, url: &str) -> Result<String, HarvestError> {
        match self.get(url, &Validators::none()).await? {
            FetchOutcome::Fresh { body, .. } => Ok(body),
            // Unreachable without conditional headers, but keep it total.
            FetchOutcome::NotModified => Ok(String::new()),
        }
    }
}

fn header_string(response: &reqwest::Response, name: header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v: &HeaderValue| v.to_str().ok())
        .map(|s| s.to_string())
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn classify_transport(e: reqwest::Error) -> HarvestError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        HarvestError::TransientFetch(e.to_string())
    } else {
        HarvestError::Anyhow(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn not_modified_short_circuits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header("If-None-Match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let client = ConditionalClient::for_tests();
        let validators = Validators {
            etag: Some("\"v1\"".to_string()),
            last_modified: None,
        };
        let outcome = client.get(&server.uri(), &validators).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::NotModified));
    }

    #[tokio::test]
    async fn fresh_response_carries_new_validators() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"v2\"")
                    .insert_header("Last-Modified", "Tue, 03 Mar 2026 10:00:00 GMT")
                    .set_body_string("<html>aktuell</html>"),
            )
            .mount(&server)
            .await;

        let client = ConditionalClient::for_tests();
        let outcome = client.get(&server.uri(), &Validators::none()).await.unwrap();
        match outcome {
            FetchOutcome::Fresh {
                body,
                etag,
                last_modified,
            } => {
                assert_eq!(body, "<html>aktuell</html>");
                assert_eq!(etag.as_deref(), Some("\"v2\""));
                assert!(last_modified.is_some());
            }
            other => panic!("expected Fresh, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_validators_are_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("no caching here"))
            .mount(&server)
            .await;

        let client = ConditionalClient::for_tests();
        let outcome = client.get(&server.uri(), &Validators::none()).await.unwrap();
        match outcome {
            FetchOutcome::Fresh { etag, last_modified, .. } => {
                assert!(etag.is_none());
                assert!(last_modified.is_none());
            }
            other => panic!("expected Fresh, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = ConditionalClient::for_tests();
        let err = client.get(&server.uri(), &Validators::none()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn client_errors_are_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = ConditionalClient::for_tests();
        let err = client.get(&server.uri(), &Validators::none()).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
