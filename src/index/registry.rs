//! The durable document catalog.
//!
//! The registry is the single source of truth for which documents exist. The
//! whole file is the durability unit: every mutation rewrites `registry.json`
//! atomically, so a crash can never leave a torn registry behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::index::write_atomic;
use crate::types::EngineError;

/// Well-known registry file name inside the storage directory.
pub const REGISTRY_FILE: &str = "registry.json";

/// Catalog entry for one registered document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Original filename of the document.
    pub filename: String,
    /// Number of chunks in the document's index.
    pub chunk_count: usize,
    /// When the document was registered.
    pub created_at: DateTime<Utc>,
    /// Location of the per-document storage unit.
    pub path: PathBuf,
}

/// Durable mapping from document identifiers to [`RegistryEntry`] values.
///
/// Entries are kept in a `BTreeMap` so iteration order — and therefore the
/// global chunk positions assigned by the combined index — is deterministic.
pub struct IndexRegistry {
    dir: PathBuf,
    entries: BTreeMap<String, RegistryEntry>,
}

impl IndexRegistry {
    /// Opens the registry under `dir`, loading `registry.json` if present.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let dir = dir.into();
        let path = dir.join(REGISTRY_FILE);
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self { dir, entries })
    }

    /// The storage directory this registry lives in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Upserts an entry and durably rewrites the registry.
    ///
    /// Call only after the corresponding document unit has been durably
    /// built; a crash between unit write and registration leaves an orphaned
    /// file, never a dangling entry.
    pub async fn register(
        &mut self,
        document_id: &str,
        filename: &str,
        chunk_count: usize,
        path: PathBuf,
    ) -> Result<(), EngineError> {
        self.entries.insert(
            document_id.to_string(),
            RegistryEntry {
                filename: filename.to_string(),
                chunk_count,
                created_at: Utc::now(),
                path,
            },
        );
        self.persist().await
    }

    /// Removes an entry and durably rewrites the registry.
    ///
    /// Returns `Ok(false)` when the document was not registered — removing an
    /// already-gone document is legitimate caller intent, not an error.
    pub async fn unregister(&mut self, document_id: &str) -> Result<bool, EngineError> {
        if self.entries.remove(document_id).is_none() {
            return Ok(false);
        }
        self.persist().await?;
        Ok(true)
    }

    /// All entries, keyed by document identifier.
    #[must_use]
    pub fn list(&self) -> &BTreeMap<String, RegistryEntry> {
        &self.entries
    }

    /// Looks up a single entry.
    #[must_use]
    pub fn resolve(&self, document_id: &str) -> Option<&RegistryEntry> {
        self.entries.get(document_id)
    }

    /// Number of registered documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no documents are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn persist(&self) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec(&self.entries)?;
        write_atomic(&self.dir.join(REGISTRY_FILE), &bytes).await
    }
}
