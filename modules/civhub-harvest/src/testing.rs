//! Deterministic in-tree doubles for engine and integration tests.
//!
//! Compiled into unit tests directly and exported to integration tests
//! through the `test-support` feature.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use civhub_common::events::{AuditEvent, AuditSink};
use civhub_common::HarvestError;
use embed_client::{EmbedError, EmbeddingProvider};

use crate::sync::{ApiClient, ApiPage};

/// Embedding provider with no network: registered texts get their exact
/// vector, every other distinct text gets its own unit basis vector, so
/// unregistered texts are mutually orthogonal. The call counter makes cache
/// behavior observable.
pub struct FixedEmbedder {
    dimension: usize,
    vectors: Mutex<HashMap<String, Vec<f32>>>,
    next_axis: AtomicUsize,
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl FixedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Mutex::new(HashMap::new()),
            // Fallback axes start past the declared dimension, orthogonal
            // to any registered vector as well.
            next_axis: AtomicUsize::new(dimension),
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    /// Simulate a provider outage: every call fails until [`recover`].
    ///
    /// [`recover`]: FixedEmbedder::recover
    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    pub fn recover(&self) {
        self.fail.store(false, Ordering::SeqCst);
    }

    /// Pin the vector returned for a normalized text.
    pub fn register(&self, normalized_text: &str, vector: Vec<f32>) {
        self.vectors
            .lock()
            .expect("embedder lock poisoned")
            .insert(normalized_text.to_string(), vector);
    }

    /// Number of provider calls made (cache hits do not count).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vectors = self.vectors.lock().expect("embedder lock poisoned");
        if let Some(v) = vectors.get(text) {
            return v.clone();
        }
        // Each new text gets its own axis, so unregistered texts never
        // accidentally cross a similarity threshold.
        let axis = self.next_axis.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0; self.dimension.max(axis + 1)];
        vector[axis] = 1.0;
        vectors.insert(text.to_string(), vector.clone());
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbedError::unavailable("scripted", "provider down"));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbedError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbedError::unavailable("scripted", "provider down"));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

/// API client that replays a script of page results. Fetch attempts consume
/// the script front to back, so transient errors followed by a good page
/// exercise the retry path exactly.
pub struct ScriptedApiClient {
    script: Mutex<VecDeque<Result<ApiPage, HarvestError>>>,
    offset_skip: bool,
}

impl ScriptedApiClient {
    pub fn new(script: Vec<Result<ApiPage, HarvestError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            offset_skip: false,
        }
    }

    /// Behave like an offset-paginated endpoint: dead pages can be skipped.
    pub fn with_offset_skip(mut self) -> Self {
        self.offset_skip = true;
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().expect("script lock poisoned").len()
    }
}

#[async_trait]
impl ApiClient for ScriptedApiClient {
    async fn fetch_page(
        &self,
        _cursor: Option<&str>,
        _limit: u32,
    ) -> Result<ApiPage, HarvestError> {
        self.script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(ApiPage::default()))
    }

    fn skip_page(&self, cursor: Option<&str>, limit: u32) -> Option<String> {
        if !self.offset_skip {
            return None;
        }
        let offset = cursor.and_then(|c| c.parse::<u64>().ok()).unwrap_or(0);
        Some((offset + limit as u64).to_string())
    }
}

/// Audit sink that captures events for assertions.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("sink lock poisoned").clone()
    }
}

impl AuditSink for MemorySink {
    fn emit(&self, event: AuditEvent) {
        self.events.lock().expect("sink lock poisoned").push(event);
    }
}
