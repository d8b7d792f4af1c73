//! Error types for the graph consolidation and retrieval engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Index artifact missing: {0}")]
    MissingIndex(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Completion API error: {0}")]
    CompletionError(String),

    #[error("Embedding API error: {0}")]
    EmbeddingError(String),

    #[error("Graph store error: {0}")]
    GraphStoreError(String),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<neo4rs::Error> for Error {
    fn from(err: neo4rs::Error) -> Self {
        Error::GraphStoreError(err.to_string())
    }
}

impl Error {
    /// Label used for the `status` dimension of external-call metrics.
    pub fn status_label(&self) -> &'static str {
        match self {
            Error::Timeout { .. } => "timeout",
            _ => "error",
        }
    }
}
