//! # Codeweave Graph
//!
//! Knowledge graph of code, documentation and history entities.
//!
//! ## Features
//!
//! - **Typed entities and edges** - modules, classes, functions, sections, commits
//! - **Reference resolution** - placeholder targets resolved by name after parsing
//! - **Graph queries** - callers/callees, containment, dependencies, call traces, impact
//! - **Snapshots** - versioned JSON save/load that rejects unknown kinds
//!
//! ## Architecture
//!
//! ```text
//! Source files
//!     │
//!     ├──> SourceParser (per extension)
//!     │      └─ ParseResult { entities, relationships, errors }
//!     │
//!     ├──> GraphBuilder
//!     │      ├─ Merge results (last write wins on id)
//!     │      ├─ Collect file-scoped errors
//!     │      └─ Resolve ref:: placeholders via a name index
//!     │
//!     └──> KnowledgeStore
//!            ├─ Ordered entities + flat relationship list
//!            └─ Query API + JSON snapshot
//! ```

mod builder;
mod error;
mod parsers;
mod store;
mod types;

pub use builder::{BuildStats, GraphBuilder, SourceParser};
pub use error::{GraphError, Result};
pub use parsers::{MarkdownParser, PythonParser, YamlParser};
pub use store::{
    resolve_store_path, GraphStats, ImpactReport, KnowledgeStore, TraceDirection, TracedEntity,
    DEFAULT_STORE_FILE, MAX_TRACE_DEPTH, MAX_TRACE_RESULTS, SNAPSHOT_VERSION,
};
pub use types::{
    Entity, EntityKind, Location, ParseResult, Relationship, RelationshipKind, RelationshipTarget,
    EXTERNAL_PREFIX, REF_PREFIX,
};
