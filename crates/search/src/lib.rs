//! # Codeweave Search
//!
//! Hybrid retrieval over indexed chunks.
//!
//! ## Architecture
//!
//! ```text
//! query
//!   │
//!   ├──> EmbeddingProvider ──> dense hits (VectorStore)   ─┐
//!   ├──> tokenize_code ──────> sparse hits (repository)   ─┤
//!   │                                                      ▼
//!   │                                  RRF fusion (K = 60, alpha)
//!   │                                                      │
//!   │                                Reranker (cross-encoder | signals)
//!   │                                                      │
//!   └────────────────────────> dependency expansion (callees, depth 1)
//! ```

mod completeness;
mod engine;
mod error;
mod fusion;
mod hybrid;
mod rerank;

pub use completeness::expand_dependencies;
pub use engine::{ChunkSource, ScoredChunk, SearchEngine, DEPENDENCY_DEPTH};
pub use error::{Result, SearchError};
pub use fusion::{RrfFusion, RRF_K};
pub use hybrid::HybridIndex;
pub use rerank::{CrossEncoder, RerankHit, Reranker};
