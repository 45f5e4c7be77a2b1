//! Token-window chunking for document ingestion.
//!
//! Documents are split into overlapping, token-bounded segments before
//! embedding. The window slides by `size - overlap` tokens per step, so
//! consecutive chunks share exactly `overlap` tokens and no hard context
//! boundary loses meaning mid-window. The last chunk may be shorter than
//! `size`.
//!
//! Tokenization uses the `cl100k_base` encoding from `tiktoken-rs`.

use tiktoken_rs::{cl100k_base, CoreBPE};

use crate::types::EngineError;

/// Default window size in tokens.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Default overlap between consecutive windows in tokens.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Splits raw text into overlapping token-bounded chunks.
///
/// # Examples
///
/// ```no_run
/// use docweave::chunking::TokenChunker;
///
/// let chunker = TokenChunker::new(500, 50).unwrap();
/// let chunks = chunker.chunk("some long document text").unwrap();
/// ```
pub struct TokenChunker {
    bpe: CoreBPE,
    size: usize,
    overlap: usize,
}

impl TokenChunker {
    /// Creates a chunker with the given window size and overlap, in tokens.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] when `size` is zero or
    /// `overlap >= size` (the window would never advance).
    pub fn new(size: usize, overlap: usize) -> Result<Self, EngineError> {
        if size == 0 {
            return Err(EngineError::Validation(
                "chunk size must be greater than zero".into(),
            ));
        }
        if overlap >= size {
            return Err(EngineError::Validation(format!(
                "chunk overlap ({overlap}) must be smaller than chunk size ({size})"
            )));
        }
        let bpe = cl100k_base().map_err(|err| EngineError::Chunking(err.to_string()))?;
        Ok(Self { bpe, size, overlap })
    }

    /// Creates a chunker with the default 500-token windows and 50-token
    /// overlap.
    pub fn with_defaults() -> Result<Self, EngineError> {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }

    /// Window size in tokens.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Overlap between consecutive windows in tokens.
    #[must_use]
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Splits `text` into overlapping chunks.
    ///
    /// Empty or whitespace-only input yields no chunks. Each produced chunk
    /// decodes at most `size` tokens; the final chunk may be shorter.
    pub fn chunk(&self, text: &str) -> Result<Vec<String>, EngineError> {
        let tokens = self.bpe.encode_ordinary(text);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let step = self.size - self.overlap;
        let mut chunks = Vec::with_capacity(tokens.len().div_ceil(step));

        let mut start = 0;
        while start < tokens.len() {
            let end = usize::min(start + self.size, tokens.len());
            let window = tokens[start..end].to_vec();
            let chunk = self
                .bpe
                .decode(window)
                .map_err(|err| EngineError::Chunking(err.to_string()))?;
            chunks.push(chunk);
            start += step;
        }

        Ok(chunks)
    }

    /// Number of tokens `text` encodes to. Used by tests and telemetry.
    #[must_use]
    pub fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}
