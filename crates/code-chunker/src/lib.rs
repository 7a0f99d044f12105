//! # Codeweave Chunker
//!
//! Turns knowledge-graph entities into retrieval chunks.
//!
//! ## Architecture
//!
//! ```text
//! ParseResult (one file)
//!     │
//!     ├──> Module chunks (code files only)
//!     │      ├─ <file>::module::0   leading comment/docstring block
//!     │      └─ <file>::imports::0  import statements
//!     │
//!     └──> Entity chunks
//!            ├─ content = signature + """docstring""" + source
//!            ├─ sliding window (max_chunk_size, overlap)
//!            └─ metadata: kind, has_docstring, chunk_index, last_modified
//! ```
//!
//! ## Example
//!
//! ```rust
//! use codeweave_chunker::{Chunker, ChunkingConfig};
//! use codeweave_graph::{Entity, EntityKind, Location};
//!
//! let chunker = Chunker::new(ChunkingConfig::default()).unwrap();
//! let entity = Entity::new("a.py::f", EntityKind::Function, "f", "f", Location::new("a.py", 1, 2))
//!     .with_source("def f():\n    return 1");
//!
//! let chunks = chunker.chunk_entity(&entity, None);
//! assert_eq!(chunks[0].id, "a.py::f::0");
//! ```

mod chunker;
mod config;
mod error;
mod tokenizer;
mod types;

pub use chunker::Chunker;
pub use config::ChunkingConfig;
pub use error::{ChunkerError, Result};
pub use tokenizer::tokenize_code;
pub use types::{
    CodeChunk, META_CHUNK_INDEX, META_HAS_DOCSTRING, META_KIND, META_LAST_MODIFIED, META_TYPE,
};
