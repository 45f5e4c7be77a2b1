//! The per-document index: one document's chunks, raw embeddings, and
//! similarity structure, persisted together as a single durable unit.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::index::flat::FlatIpIndex;
use crate::index::{document_path, write_atomic, SearchHit, StoredChunk};
use crate::types::EngineError;

/// Serialized form of a per-document unit: metadata, chunks, and the raw
/// (unnormalized) embeddings the similarity index is rebuilt from on load.
#[derive(Serialize, Deserialize)]
struct DocumentUnit {
    document_id: String,
    filename: String,
    created_at: DateTime<Utc>,
    chunks: Vec<StoredChunk>,
    embeddings: Vec<Vec<f32>>,
}

/// A single document's chunks, embeddings, and similarity index.
///
/// This is the unit of storage and deletion: [`build`](DocumentIndex::build)
/// persists everything atomically under `{document_id}.json`, and
/// [`delete`](DocumentIndex::delete) removes exactly that file.
#[derive(Debug)]
pub struct DocumentIndex {
    document_id: String,
    filename: String,
    created_at: DateTime<Utc>,
    chunks: Vec<StoredChunk>,
    embeddings: Vec<Vec<f32>>,
    index: FlatIpIndex,
}

impl DocumentIndex {
    /// Builds the index over `chunks`/`vectors` and persists the whole unit
    /// under `dir`.
    ///
    /// # Errors
    ///
    /// [`EngineError::Validation`] when the inputs are empty, their lengths
    /// differ, or the vectors do not share one dimension;
    /// [`EngineError::Persistence`] when the unit cannot be written.
    pub async fn build(
        dir: &Path,
        document_id: &str,
        filename: &str,
        chunks: Vec<String>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, EngineError> {
        if chunks.is_empty() {
            return Err(EngineError::Validation(
                "cannot build an index over zero chunks".into(),
            ));
        }
        if chunks.len() != vectors.len() {
            return Err(EngineError::Validation(format!(
                "chunk count ({}) does not match vector count ({})",
                chunks.len(),
                vectors.len()
            )));
        }

        let stored: Vec<StoredChunk> = chunks
            .into_iter()
            .enumerate()
            .map(|(position, text)| StoredChunk {
                document_id: document_id.to_string(),
                text,
                position,
            })
            .collect();

        let index = index_from_vectors(&vectors)?;

        let unit = DocumentUnit {
            document_id: document_id.to_string(),
            filename: filename.to_string(),
            created_at: Utc::now(),
            chunks: stored,
            embeddings: vectors,
        };

        let bytes = serde_json::to_vec(&unit)?;
        write_atomic(&document_path(dir, document_id), &bytes).await?;

        Ok(Self {
            document_id: unit.document_id,
            filename: unit.filename,
            created_at: unit.created_at,
            chunks: unit.chunks,
            embeddings: unit.embeddings,
            index,
        })
    }

    /// Loads a persisted unit and reconstructs its similarity index.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] when no unit exists for `document_id`.
    pub async fn load(dir: &Path, document_id: &str) -> Result<Self, EngineError> {
        let path = document_path(dir, document_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::NotFound(format!(
                    "no stored index for document {document_id}"
                )));
            }
            Err(err) => return Err(err.into()),
        };

        let unit: DocumentUnit = serde_json::from_slice(&bytes)?;
        let index = index_from_vectors(&unit.embeddings)?;

        Ok(Self {
            document_id: unit.document_id,
            filename: unit.filename,
            created_at: unit.created_at,
            chunks: unit.chunks,
            embeddings: unit.embeddings,
            index,
        })
    }

    /// Removes the persisted unit. Deleting an absent document is not an
    /// error; `Ok(false)` signals the no-op.
    pub async fn delete(dir: &Path, document_id: &str) -> Result<bool, EngineError> {
        let path = document_path(dir, document_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Returns up to `k` hits ordered by descending similarity.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, EngineError> {
        let scored = self.index.search(query, k)?;
        Ok(scored
            .into_iter()
            .map(|(position, score)| {
                let chunk = &self.chunks[position];
                SearchHit {
                    text: chunk.text.clone(),
                    filename: self.filename.clone(),
                    document_id: self.document_id.clone(),
                    position: chunk.position,
                    score,
                }
            })
            .collect())
    }

    /// Document identifier.
    #[must_use]
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Original filename of the document.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Creation timestamp of the unit.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The document's chunks, in position order.
    #[must_use]
    pub fn chunks(&self) -> &[StoredChunk] {
        &self.chunks
    }

    /// The raw (unnormalized) embeddings, parallel to [`chunks`](Self::chunks).
    #[must_use]
    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    /// Number of chunks (equals embedding and index population counts).
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

fn index_from_vectors(vectors: &[Vec<f32>]) -> Result<FlatIpIndex, EngineError> {
    let dimension = vectors
        .first()
        .map(Vec::len)
        .ok_or_else(|| EngineError::Validation("cannot index zero vectors".into()))?;
    if dimension == 0 {
        return Err(EngineError::Validation(
            "embedding vectors must not be zero-dimensional".into(),
        ));
    }

    let mut index = FlatIpIndex::new(dimension);
    for vector in vectors {
        index.add(vector.clone())?;
    }
    Ok(index)
}
