use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Cannot open store directory {path:?}: {source}")]
    Configuration {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Corrupt persistence: {0}")]
    CorruptPersistence(String),

    #[error("Unsupported store format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Invalid position {position} (store holds {len} entries)")]
    InvalidIndex { position: usize, len: usize },

    #[error("Position {position} belongs to collection '{actual}', not '{expected}'")]
    CollectionMismatch {
        position: usize,
        expected: String,
        actual: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
