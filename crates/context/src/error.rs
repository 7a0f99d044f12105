use codeweave_graph::GraphError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ContextError>;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Unknown task type: {0}")]
    UnknownTask(String),
}

impl ContextError {
    pub fn entity_not_found(id: impl Into<String>) -> Self {
        Self::Graph(GraphError::EntityNotFound(id.into()))
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Graph(GraphError::EntityNotFound(_)))
    }
}
