use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("task catalog is empty")]
    EmptyCatalog,
    #[error("failed to read catalog {path}: {source}")]
    CatalogIo { path: PathBuf, source: io::Error },
    #[error("invalid catalog {path}: {source}")]
    CatalogFormat {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid generator config: {0}")]
    InvalidConfig(String),
    #[error("invalid parameters for {kind} task: {source}")]
    InvalidParameters {
        kind: String,
        source: serde_json::Error,
    },
}
