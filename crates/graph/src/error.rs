use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Unknown {field} tag: {value}")]
    UnknownKind { field: &'static str, value: String },

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
