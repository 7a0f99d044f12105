use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata key: owning entity kind
pub const META_KIND: &str = "kind";
/// Metadata key: `"true"` when the entity carries a docstring
pub const META_HAS_DOCSTRING: &str = "has_docstring";
/// Metadata key: window index within the owning entity
pub const META_CHUNK_INDEX: &str = "chunk_index";
/// Metadata key: file mtime in seconds since the Unix epoch
pub const META_LAST_MODIFIED: &str = "last_modified";
/// Metadata key: synthetic chunk type (`module_header`, `imports`)
pub const META_TYPE: &str = "type";

/// A retrievable slice of one entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeChunk {
    /// `<entity_id>::<index>`
    pub id: String,

    /// Owning entity
    pub entity_id: String,

    /// Text that gets indexed and returned
    pub content: String,

    /// Sparse terms for lexical matching
    pub tokens: Vec<String>,

    /// Free-form ranking flags
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CodeChunk {
    /// Create a chunk and tokenize its content
    #[must_use]
    pub fn new(id: impl Into<String>, entity_id: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: id.into(),
            entity_id: entity_id.into(),
            tokens: crate::tokenize_code(&content),
            content,
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn kind(&self) -> Option<&str> {
        self.meta(META_KIND)
    }

    pub fn has_docstring(&self) -> bool {
        self.meta(META_HAS_DOCSTRING) == Some("true")
    }

    /// File mtime as fractional epoch seconds, when recorded
    pub fn last_modified(&self) -> Option<f64> {
        self.meta(META_LAST_MODIFIED)?.parse().ok()
    }
}
