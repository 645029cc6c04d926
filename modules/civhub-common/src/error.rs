use thiserror::Error;
use uuid::Uuid;

use crate::types::SourceType;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("No crawler registered for source type: {0}")]
    UnsupportedSourceType(SourceType),

    #[error("Transient fetch failure: {0}")]
    TransientFetch(String),

    #[error("Field mapping error: {0}")]
    Mapping(String),

    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Run already in progress for source {0}")]
    RunInProgress(Uuid),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl HarvestError {
    /// Transient failures are retried with backoff; everything else either
    /// isolates to the record or is fatal for the run.
    pub fn is_transient(&self) -> bool {
        matches!(self, HarvestError::TransientFetch(_))
    }
}
