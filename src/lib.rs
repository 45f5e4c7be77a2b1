//! Retrieval-augmented chat engine.
//!
//! Documents are chunked into overlapping token windows, embedded through an
//! external capability, and indexed per document with a durable registry as
//! the catalog; queries run against one document or a derived combined index
//! spanning the whole corpus. Generation streams completion deltas to the
//! caller and afterwards extracts learning memory and goals from the
//! completed exchange.
//!
//! ```text
//! upload ──► chunking::TokenChunker ──► providers::EmbeddingProvider
//!                                                │
//!                                                ▼
//!              index::DocumentIndex  ◄── per-document durable unit
//!                        │
//!                        ├─► index::IndexRegistry (authoritative catalog)
//!                        └─► index::CombinedIndex (derived, rebuilt on mutation)
//!
//! query ──► retrieval::RetrievalEngine::search ──► context::compose
//!                                                        │
//!                                                        ▼
//! generation::ChatEngine ──► ChatEvent::Delta ... ──► ChatEvent::Terminal
//!                        └──► extraction (memory + goals, post-hoc)
//! ```

pub mod chunking;
pub mod context;
pub mod extraction;
pub mod generation;
pub mod index;
pub mod message;
pub mod providers;
pub mod retrieval;
pub mod stores;
pub mod types;

pub use generation::{ChatEngine, ChatEvent, ChatRequest, GenerationConfig, TerminalEvent};
pub use index::SearchHit;
pub use retrieval::{IngestReceipt, RetrievalEngine};
pub use types::EngineError;
