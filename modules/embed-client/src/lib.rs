//! Provider-agnostic text embedding client.
//!
//! One trait boundary ([`EmbeddingProvider`]) and one concrete backend:
//! any OpenAI-compatible `/embeddings` endpoint (OpenAI, Voyage, local
//! inference servers). Quota, auth, and transport failures all surface as
//! [`EmbedError::Unavailable`] so callers can treat the comparison as
//! indeterminate instead of guessing.

mod client;
mod error;
mod schema;

pub use client::HttpEmbedder;
pub use error::EmbedError;

use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text into a fixed-dimension vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Embed multiple texts in one provider call.
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbedError>;
}
