//! # Codeweave Vector Store
//!
//! Chunk storage, dense vectors and the persisted index layout.
//!
//! ## Features
//!
//! - **Chunk repository** with lexical token-overlap lookup
//! - **Flat cosine index** with deterministic tie order
//! - **Embedding provider contract** plus a deterministic offline stub
//! - **Index manifest** that rejects incompatible embedding settings
//!
//! ## Architecture
//!
//! ```text
//! CodeChunk[]
//!     │
//!     ├──> ChunkRepository ──────> chunks.json
//!     │
//!     ├──> EmbeddingProvider
//!     │      └─> VectorStore ────> vectors.json
//!     │
//!     └──> IndexManifest ────────> index_manifest.json
//! ```
//!
//! ## Example
//!
//! ```
//! use codeweave_vector_store::VectorStore;
//!
//! let store = VectorStore::new(2);
//! store.add("a.py::f::0", vec![1.0, 0.0]).unwrap();
//! let hits = store.search(&[1.0, 0.0], 5).unwrap();
//! assert_eq!(hits[0].0, "a.py::f::0");
//! ```

mod embeddings;
mod error;
mod manifest;
mod paths;
mod repository;
mod store;

pub use embeddings::{
    cosine_similarity, EmbeddingConfig, EmbeddingProvider, StubEmbeddingProvider,
    EMBEDDING_MODE_ENV, STUB_PROVIDER,
};
pub use error::{Result, VectorStoreError};
pub use manifest::{IndexManifest, ManifestChunking, ManifestEmbedding, MANIFEST_VERSION};
pub use paths::{IndexPaths, CHUNKS_FILE, DEFAULT_INDEX_DIR, MANIFEST_FILE, VECTORS_FILE};
pub use repository::{ChunkRepository, InMemoryChunkRepository};
pub use store::VectorStore;
