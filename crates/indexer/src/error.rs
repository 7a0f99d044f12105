use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Chunker error: {0}")]
    ChunkerError(#[from] codeweave_chunker::ChunkerError),

    #[error("Vector store error: {0}")]
    VectorStoreError(#[from] codeweave_vector_store::VectorStoreError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid ignore pattern: {0}")]
    InvalidGlob(#[from] globset::Error),

    #[error("Invalid project path: {0}")]
    InvalidPath(String),

    #[error("No parser registered for {}", .0.display())]
    Unsupported(PathBuf),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("Background indexer is not running")]
    QueueClosed,
}
