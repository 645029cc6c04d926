/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The provider cannot serve the request right now: quota, auth,
    /// rate-limit, server error, or a transport failure.
    #[error("Embedding provider unavailable ({status}): {detail}")]
    Unavailable { status: String, detail: String },

    /// The provider answered, but not with a usable vector.
    #[error("Malformed embedding response: {0}")]
    BadResponse(String),
}

impl EmbedError {
    pub fn unavailable(status: impl Into<String>, detail: impl Into<String>) -> Self {
        EmbedError::Unavailable {
            status: status.into(),
            detail: detail.into(),
        }
    }
}

impl From<reqwest::Error> for EmbedError {
    fn from(e: reqwest::Error) -> Self {
        EmbedError::Unavailable {
            status: "transport".to_string(),
            detail: e.to_string(),
        }
    }
}
