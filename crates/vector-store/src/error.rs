use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error(
        "Index manifest mismatch on {field}: index was built with {expected}, \
         active configuration uses {actual}. Rebuild the index or restore the old settings."
    )]
    ManifestMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("No index found at {}", .0.display())]
    IndexMissing(PathBuf),
}
