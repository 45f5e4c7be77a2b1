//! The retrieval facade: document upload, removal, and similarity search.
//!
//! Ties the pipeline together: chunker → embedding provider → per-document
//! index → registry, with the combined index rebuilt after every mutation and
//! lazily on the first query after startup.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::chunking::TokenChunker;
use crate::index::{
    CombinedIndex, DocumentIndex, IndexRegistry, RegistryEntry, SearchHit, document_path,
};
use crate::providers::EmbeddingProvider;
use crate::types::EngineError;

/// Default number of chunks returned for RAG context.
pub const DEFAULT_MAX_CHUNKS: usize = 3;

/// Outcome of a successful document ingest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestReceipt {
    /// Identifier assigned to (or supplied for) the document.
    pub document_id: String,
    /// Number of chunks indexed.
    pub chunk_count: usize,
}

struct EngineState {
    registry: IndexRegistry,
    combined: CombinedIndex,
}

/// Document retrieval engine: owns the storage directory, registry, and
/// combined index, and drives chunking and embedding on ingest.
///
/// Registry and combined-index mutations are serialized behind one `RwLock`;
/// reads (searches) run concurrently.
pub struct RetrievalEngine {
    dir: PathBuf,
    chunker: TokenChunker,
    embeddings: Arc<dyn EmbeddingProvider>,
    state: RwLock<EngineState>,
}

impl RetrievalEngine {
    /// Opens an engine rooted at `dir` with default chunking parameters.
    pub async fn open(
        dir: impl Into<PathBuf>,
        embeddings: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, EngineError> {
        Self::with_chunker(dir, embeddings, TokenChunker::with_defaults()?).await
    }

    /// Opens an engine with a caller-configured chunker.
    pub async fn with_chunker(
        dir: impl Into<PathBuf>,
        embeddings: Arc<dyn EmbeddingProvider>,
        chunker: TokenChunker,
    ) -> Result<Self, EngineError> {
        let dir = dir.into();
        let registry = IndexRegistry::open(&dir).await?;
        Ok(Self {
            dir,
            chunker,
            embeddings,
            state: RwLock::new(EngineState {
                registry,
                combined: CombinedIndex::new(),
            }),
        })
    }

    /// Ingests a document: chunk, embed, build the per-document unit,
    /// register it, and rebuild the combined index.
    ///
    /// A fresh identifier is assigned when `document_id` is `None`.
    pub async fn ingest(
        &self,
        text: &str,
        filename: &str,
        document_id: Option<String>,
    ) -> Result<IngestReceipt, EngineError> {
        let chunks = self.chunker.chunk(text)?;
        if chunks.is_empty() {
            return Err(EngineError::Validation(
                "document produced no chunks".into(),
            ));
        }

        let vectors = self.embeddings.embed_batch(&chunks).await?;
        let document_id = document_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let chunk_count = chunks.len();

        let mut state = self.state.write().await;
        DocumentIndex::build(&self.dir, &document_id, filename, chunks, vectors).await?;
        // Register only after the unit is durably on disk.
        state
            .registry
            .register(
                &document_id,
                filename,
                chunk_count,
                document_path(&self.dir, &document_id),
            )
            .await?;

        let EngineState { registry, combined } = &mut *state;
        combined.rebuild(registry).await?;

        Ok(IngestReceipt {
            document_id,
            chunk_count,
        })
    }

    /// Removes a document: unregister first, then delete the storage unit, so
    /// a crash in between leaves at worst an orphaned file.
    ///
    /// Returns `Ok(false)` when the document was not registered.
    pub async fn remove_document(&self, document_id: &str) -> Result<bool, EngineError> {
        let mut state = self.state.write().await;
        let was_registered = state.registry.unregister(document_id).await?;
        // Delete even when unregistered: cleans up orphaned units.
        DocumentIndex::delete(&self.dir, document_id).await?;

        if was_registered {
            let EngineState { registry, combined } = &mut *state;
            combined.rebuild(registry).await?;
        }
        Ok(was_registered)
    }

    /// Searches for the `k` chunks most similar to `query`.
    ///
    /// With `document_id` set, only that document is searched; otherwise the
    /// combined index spans the whole corpus (rebuilt lazily on the first
    /// query after startup).
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<SearchHit>, EngineError> {
        if query.trim().is_empty() {
            return Err(EngineError::Validation("query must not be empty".into()));
        }
        let query_vector = self.embeddings.embed_query(query).await?;

        if let Some(document_id) = document_id {
            let state = self.state.read().await;
            if state.registry.resolve(document_id).is_none() {
                return Err(EngineError::NotFound(format!(
                    "document {document_id} is not registered"
                )));
            }
            drop(state);
            let document = DocumentIndex::load(&self.dir, document_id).await?;
            return document.search(&query_vector, k);
        }

        {
            let state = self.state.read().await;
            if state.combined.is_built() {
                return state.combined.search(&query_vector, k);
            }
        }

        let mut state = self.state.write().await;
        if !state.combined.is_built() {
            let EngineState { registry, combined } = &mut *state;
            combined.rebuild(registry).await?;
        }
        state.combined.search(&query_vector, k)
    }

    /// Formats up to `max_chunks` retrieval results as a context block, each
    /// hit tagged with its source filename and a truncated document
    /// identifier. Returns an empty string when nothing matches.
    pub async fn rag_context(
        &self,
        query: &str,
        max_chunks: usize,
        document_id: Option<&str>,
    ) -> Result<String, EngineError> {
        let hits = self.search(query, max_chunks, document_id).await?;
        Ok(format_rag_context(&hits))
    }

    /// Snapshot of all registered documents.
    pub async fn list_documents(&self) -> BTreeMap<String, RegistryEntry> {
        self.state.read().await.registry.list().clone()
    }

    /// Catalog entry for one document, if registered.
    pub async fn document_info(&self, document_id: &str) -> Option<RegistryEntry> {
        self.state.read().await.registry.resolve(document_id).cloned()
    }
}

/// Renders hits as source-tagged context blocks separated by blank lines.
#[must_use]
pub fn format_rag_context(hits: &[SearchHit]) -> String {
    let blocks: Vec<String> = hits
        .iter()
        .map(|hit| {
            let short_id: String = hit.document_id.chars().take(8).collect();
            format!("[From {} (doc {short_id}...)]: {}", hit.filename, hit.text)
        })
        .collect();
    blocks.join("\n\n")
}
