//! Vector indexing: per-document durable units, the authoritative registry,
//! and the derived combined index.
//!
//! ```text
//!  ingest ──► DocumentIndex::build ──► {document_id}.json   (durability unit)
//!                     │
//!                     └──► IndexRegistry::register ──► registry.json (catalog)
//!                                        │
//!  query  ──► CombinedIndex::rebuild ◄───┘   (derived, rebuildable cache)
//! ```
//!
//! The registry is the single source of truth for which documents exist; a
//! document unit absent from the registry is considered deleted even if its
//! file lingers. Callers register only after a unit is durably built and
//! unregister before deleting the unit, so a crash leaves at worst an
//! orphaned file, never a dangling registry entry.

pub mod combined;
pub mod document;
pub mod flat;
pub mod registry;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::EngineError;

pub use combined::CombinedIndex;
pub use document::DocumentIndex;
pub use flat::FlatIpIndex;
pub use registry::{IndexRegistry, RegistryEntry};

/// A chunk as stored inside a per-document unit. Immutable after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Identifier of the owning document.
    pub document_id: String,
    /// The chunk text.
    pub text: String,
    /// Zero-based position within the owning document.
    pub position: usize,
}

/// A similarity search result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// The matched chunk text.
    pub text: String,
    /// Original filename of the source document.
    pub filename: String,
    /// Identifier of the source document.
    pub document_id: String,
    /// Zero-based chunk position within the source document.
    pub position: usize,
    /// Cosine similarity score, higher is more similar.
    pub score: f32,
}

/// Path of the durable unit for `document_id` under `dir`.
pub(crate) fn document_path(dir: &Path, document_id: &str) -> PathBuf {
    dir.join(format!("{document_id}.json"))
}

/// Writes `bytes` to `path` atomically: a temp file in the same directory is
/// fully written, then renamed over the target. A partial write can never
/// leave a torn artifact behind.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    let parent = path
        .parent()
        .ok_or_else(|| EngineError::Persistence(format!("no parent directory for {path:?}")))?;
    tokio::fs::create_dir_all(parent).await?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
