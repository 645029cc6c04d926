use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::debug;

use crate::error::{EmbedError, Result};
use crate::schema::{EmbeddingRequest, EmbeddingResponse};
use crate::EmbeddingProvider;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Embedding client for any OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbedder {
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| EmbedError::BadResponse(format!("invalid api key header: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn request(&self, input: serde_json::Value) -> Result<EmbeddingResponse> {
        let url = format!("{}/embeddings", self.base_url);

        debug!(model = %self.model, "embedding request");

        let request = EmbeddingRequest {
            model: self.model.clone(),
            input,
        };

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status, detail));
        }

        Ok(response.json().await?)
    }
}

/// Every non-success status means the provider cannot be relied on right
/// now — quota (429), auth (401/403), and server errors alike.
fn classify_status(status: StatusCode, detail: String) -> EmbedError {
    EmbedError::unavailable(status.as_str(), detail)
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .request(serde_json::Value::String(text.to_string()))
            .await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbedError::BadResponse("no embedding in response".to_string()))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let expected = texts.len();
        let response = self.request(serde_json::json!(texts)).await?;

        let mut data = response.data;
        if data.len() != expected {
            return Err(EmbedError::BadResponse(format!(
                "expected {expected} embeddings, got {}",
                data.len()
            )));
        }
        // Providers are not required to return entries in request order.
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}
