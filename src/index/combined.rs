//! The derived cross-document index.
//!
//! A non-authoritative, rebuildable cache: all registered documents' vectors
//! concatenated in registry iteration order, with a parallel flat list of
//! chunk references. Rebuilt in full on any registry mutation — rebuild cost
//! is bounded by total corpus size and mutations are rare relative to
//! queries, so correctness wins over incremental updates.

use crate::index::flat::FlatIpIndex;
use crate::index::registry::IndexRegistry;
use crate::index::{DocumentIndex, SearchHit};
use crate::types::EngineError;

/// Reference to one chunk inside the combined address space.
#[derive(Clone, Debug)]
struct ChunkRef {
    document_id: String,
    filename: String,
    position: usize,
    text: String,
}

/// Union similarity index spanning every registered document.
#[derive(Default)]
pub struct CombinedIndex {
    chunks: Vec<ChunkRef>,
    index: Option<FlatIpIndex>,
    built: bool,
}

impl CombinedIndex {
    /// Creates an empty, not-yet-built index. The first query after process
    /// start triggers a lazy rebuild via [`is_built`](Self::is_built).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once a rebuild has completed (even over an empty
    /// registry).
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Total chunks addressable across all documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Returns `true` when the union is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Rebuilds the union from every document in `registry`, in registry
    /// iteration order.
    ///
    /// The new state is assembled into fresh locals and swapped in only on
    /// success: a failed rebuild (missing unit, mixed vector dimensions)
    /// leaves the previous consistent state intact.
    pub async fn rebuild(&mut self, registry: &IndexRegistry) -> Result<(), EngineError> {
        let mut chunks = Vec::new();
        let mut vectors: Vec<Vec<f32>> = Vec::new();

        for document_id in registry.list().keys() {
            let document = DocumentIndex::load(registry.dir(), document_id).await?;
            for (chunk, vector) in document.chunks().iter().zip(document.embeddings()) {
                chunks.push(ChunkRef {
                    document_id: document.document_id().to_string(),
                    filename: document.filename().to_string(),
                    position: chunk.position,
                    text: chunk.text.clone(),
                });
                vectors.push(vector.clone());
            }
        }

        let index = if vectors.is_empty() {
            None
        } else {
            let dimension = vectors[0].len();
            let mut index = FlatIpIndex::new(dimension);
            for vector in vectors {
                index.add(vector)?;
            }
            Some(index)
        };

        self.chunks = chunks;
        self.index = index;
        self.built = true;
        Ok(())
    }

    /// Returns up to `k` hits across all documents, ordered by descending
    /// similarity. An empty union yields an empty result without error.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, EngineError> {
        let Some(index) = &self.index else {
            return Ok(Vec::new());
        };

        let scored = index.search(query, k)?;
        Ok(scored
            .into_iter()
            .map(|(global_position, score)| {
                let chunk = &self.chunks[global_position];
                SearchHit {
                    text: chunk.text.clone(),
                    filename: chunk.filename.clone(),
                    document_id: chunk.document_id.clone(),
                    position: chunk.position,
                    score,
                }
            })
            .collect())
    }
}
