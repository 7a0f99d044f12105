//! # Codeweave Indexer
//!
//! Project indexing for graph queries and hybrid search.
//!
//! ## Pipeline
//!
//! ```text
//! Directory
//!     │
//!     ├──> FileScanner (.gitignore aware, parser extensions only)
//!     │      └─> Source files
//!     │
//!     ├──> GraphBuilder
//!     │      └─> KnowledgeStore
//!     │
//!     ├──> Chunker
//!     │      └─> Code chunks
//!     │
//!     └──> Embedding provider (batched)
//!            └─> Chunk repository + vector store + manifest
//! ```
//!
//! After the initial pass a [`FileWatcher`] feeds changed files to a
//! [`BackgroundIndexer`], which replaces their chunks one file at a time.
//!
//! ## Example
//!
//! ```no_run
//! use codeweave_chunker::ChunkingConfig;
//! use codeweave_indexer::Indexer;
//! use codeweave_vector_store::{EmbeddingConfig, StubEmbeddingProvider};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let embedder = Arc::new(StubEmbeddingProvider::new(EmbeddingConfig::default())?);
//!     let indexer = Indexer::new(embedder, ChunkingConfig::default())?;
//!     let (store, stats) = indexer.index_directory("/path/to/project").await?;
//!
//!     store.save("/path/to/project/codeweave_knowledge.json")?;
//!     indexer.save("/path/to/project/.codeweave").await?;
//!     println!("Indexed {} files, {} chunks", stats.files, stats.chunks);
//!     Ok(())
//! }
//! ```

mod background;
mod error;
mod indexer;
mod scanner;
mod stats;
mod watcher;

pub use background::{BackgroundIndexer, WorkerStats, STOP_TIMEOUT};
pub use error::{IndexerError, Result};
pub use indexer::{Indexer, FILE_HASHES_FILE};
pub use scanner::FileScanner;
pub use stats::{FileOutcome, IndexStats};
pub use watcher::FileWatcher;
