//! Provider capability traits and the embedding gateway.
//!
//! The engine consumes two opaque external capabilities:
//!
//! - [`EmbeddingProvider`]: batch and single-query text embedding.
//! - [`CompletionProvider`]: streaming chat completion.
//!
//! Provider failures surface unchanged as [`EngineError::Provider`]; retries
//! are a caller concern, never performed here. Vectors are returned raw —
//! L2 normalization happens in the similarity index, because normalization
//! is a property of the metric (cosine via inner product), not of embedding
//! generation.
//!
//! [`MockEmbeddingProvider`] and deterministic streaming helpers live here
//! rather than behind `cfg(test)` so downstream crates can drive the engine
//! in their own tests.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use crate::message::Message;
use crate::types::EngineError;

/// A stream of incremental completion text deltas.
///
/// Each item is either a non-empty (or empty, later coalesced) text fragment
/// or a provider error raised mid-stream.
pub type DeltaStream = BoxStream<'static, Result<String, EngineError>>;

/// External embedding capability.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a batch of texts, one vector per input, all of the same
    /// dimension.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError>;

    /// Embeds a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EngineError>;
}

/// External streaming chat-completion capability.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Submits `messages` and returns a stream of incremental text deltas.
    ///
    /// The stream may yield an error at any point; the engine surfaces it
    /// without retrying.
    async fn stream_chat(
        &self,
        messages: &[Message],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<DeltaStream, EngineError>;
}

/// Drains a delta stream into the full response text.
///
/// Used by extraction, which needs the complete output rather than
/// incremental relay.
pub async fn collect_stream(mut stream: DeltaStream) -> Result<String, EngineError> {
    let mut full = String::new();
    while let Some(delta) = stream.next().await {
        full.push_str(&delta?);
    }
    Ok(full)
}

/// Deterministic embedding provider for tests and offline runs.
///
/// Produces fixed-dimension vectors from a hashed bag of whitespace tokens,
/// so identical texts embed identically and similar texts land near each
/// other under inner-product search. No network access.
#[derive(Clone, Debug)]
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    /// Creates a provider emitting vectors of the given dimension.
    ///
    /// # Panics
    ///
    /// Panics if `dimension` is zero; a zero-dimension embedding space has no
    /// slots to hash tokens into.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "embedding dimension must be nonzero");
        Self { dimension }
    }

    /// The fixed dimension of all emitted vectors.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let hash = hasher.finish();
            let slot = (hash % self.dimension as u64) as usize;
            // Sign bit from a higher hash bit keeps vectors spread out.
            let sign = if hash & (1 << 17) == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }
        vector
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        Ok(self.embed_text(text))
    }
}

/// Embedding provider that always fails, for exercising degradation paths.
#[derive(Clone, Debug, Default)]
pub struct FailingEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for FailingEmbeddingProvider {
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        Err(EngineError::Provider("embedding backend unavailable".into()))
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, EngineError> {
        Err(EngineError::Provider("embedding backend unavailable".into()))
    }
}
