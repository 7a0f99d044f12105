use codeweave_context::ContextError;
use codeweave_graph::GraphError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Knowledge store not found at {}. Run `codeweave analyze <directory>` first.", .0.display())]
    StoreNotFound(PathBuf),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Search(#[from] codeweave_search::SearchError),

    #[error(transparent)]
    Indexer(#[from] codeweave_indexer::IndexerError),

    #[error(transparent)]
    VectorStore(#[from] codeweave_vector_store::VectorStoreError),

    #[error("Invalid config {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("No embedding provider registered for '{0}'")]
    UnsupportedProvider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    pub fn entity_not_found(id: impl Into<String>) -> Self {
        Self::Graph(GraphError::EntityNotFound(id.into()))
    }

    /// Whether the caller asked for an entity that does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Graph(GraphError::EntityNotFound(_)))
            || matches!(self, Self::Context(err) if err.is_not_found())
    }
}
