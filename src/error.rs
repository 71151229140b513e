use std::time::Duration;

use thiserror::Error;

/// Configuration problems detected before any network call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing {0}")]
    MissingField(String),

    #[error("metadata lookup failed: {0}")]
    Metadata(String),
}

impl ConfigError {
    pub fn missing(field: impl Into<String>) -> Self {
        ConfigError::MissingField(field.into())
    }
}

/// Failures while resolving a resource endpoint through the cloud directory.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource not found")]
    NotFound,

    #[error("directory lookup failed: {0}")]
    Directory(String),
}

/// Failures while running the metric battery against a resolved resource.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("unexpected row shape from {0}")]
    UnexpectedRow(&'static str),

    #[error("missing database configuration")]
    MissingDatabase,
}

/// Per-instance failure caught at the runner boundary. Nothing propagates
/// past `run_all`.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Collection(#[from] CollectionError),
}
