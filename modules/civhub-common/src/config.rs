use std::env;
use std::time::Duration;

/// Engine configuration loaded from environment variables.
///
/// Similarity thresholds and cache capacity are deployment knobs, not
/// call-site constants — per-entity-type overrides can be layered on top by
/// the caller.
#[derive(Debug, Clone)]
pub struct Config {
    // Embedding provider
    pub embed_base_url: String,
    pub embed_api_key: String,
    pub embed_model: String,

    // Dedup thresholds
    pub merge_threshold: f64,
    pub review_threshold: f64,
    pub embed_cache_capacity: usize,

    // Retry policy
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,

    // HTTP
    pub http_timeout: Duration,
    pub user_agent: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            embed_base_url: env::var("CIVHUB_EMBED_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            embed_api_key: required_env("CIVHUB_EMBED_API_KEY"),
            embed_model: env::var("CIVHUB_EMBED_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            merge_threshold: parsed_env("CIVHUB_MERGE_THRESHOLD", 0.90),
            review_threshold: parsed_env("CIVHUB_REVIEW_THRESHOLD", 0.75),
            embed_cache_capacity: parsed_env("CIVHUB_EMBED_CACHE_CAPACITY", 2048),
            max_retries: parsed_env("CIVHUB_MAX_RETRIES", 3),
            initial_backoff: Duration::from_secs(parsed_env("CIVHUB_INITIAL_BACKOFF_SECS", 1)),
            max_backoff: Duration::from_secs(parsed_env("CIVHUB_MAX_BACKOFF_SECS", 60)),
            http_timeout: Duration::from_secs(parsed_env("CIVHUB_HTTP_TIMEOUT_SECS", 30)),
            user_agent: env::var("CIVHUB_USER_AGENT")
                .unwrap_or_else(|_| "civhub-harvest/0.1".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embed_base_url: "https://api.openai.com/v1".to_string(),
            embed_api_key: String::new(),
            embed_model: "text-embedding-3-small".to_string(),
            merge_threshold: 0.90,
            review_threshold: 0.75,
            embed_cache_capacity: 2048,
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            http_timeout: Duration::from_secs(30),
            user_agent: "civhub-harvest/0.1".to_string(),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid number, got {raw:?}")),
        Err(_) => default,
    }
}
