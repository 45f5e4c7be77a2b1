//! Crate-wide error taxonomy.
//!
//! Every fallible operation in the engine returns [`EngineError`]. The
//! variants map directly onto caller-visible failure classes:
//!
//! - [`Validation`](EngineError::Validation): malformed caller input (empty
//!   chunk set, degenerate chunker configuration, mismatched vector
//!   dimensions).
//! - [`NotFound`](EngineError::NotFound): unknown document or session
//!   identifier.
//! - [`Provider`](EngineError::Provider): embedding or completion capability
//!   failure, surfaced unchanged and never retried at this layer.
//! - [`Persistence`](EngineError::Persistence): storage read/write failure.
//! - [`Chunking`](EngineError::Chunking): tokenizer encode/decode failure.

use thiserror::Error;

/// Error type shared by all engine components.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed caller input or configuration.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown document, session, or goal identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// Embedding or completion provider failure.
    #[error("provider error: {0}")]
    Provider(String),

    /// Storage read/write failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Tokenizer failure while chunking.
    #[error("chunking error: {0}")]
    Chunking(String),
}

impl EngineError {
    /// Returns `true` for [`NotFound`](EngineError::NotFound).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Persistence(err.to_string())
    }
}
