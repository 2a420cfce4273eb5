//! Error taxonomy for the retrieval subsystem.
//!
//! Library modules return [`RetrievalError`] so callers can tell a missing
//! artifact apart from a corrupted one; the CLI and HTTP layers wrap these
//! in `anyhow` or map them to status codes.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the retrieval pipeline.
pub type Result<T> = std::result::Result<T, RetrievalError>;

#[derive(Debug, Error)]
pub enum RetrievalError {
    /// A required credential, endpoint, or setting is absent or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An ingestion artifact does not exist yet.
    #[error("{what} not found at {location}. Run ingestion first: `cra ingest`")]
    NotFound {
        what: &'static str,
        location: String,
    },

    /// Corpus traversal produced no documents.
    #[error("no documents found under {dirs}. Add .txt files and retry")]
    EmptyCorpus { dirs: String },

    /// Index and docstore disagree, or an artifact could not be decoded.
    #[error("corrupt artifacts: {0}")]
    Corruption(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The embedding backend failed or returned a malformed response.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The managed vector service failed or was unreachable.
    #[error("vector service error: {0}")]
    Remote(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RetrievalError {
    pub(crate) fn not_found(what: &'static str, path: &std::path::Path) -> Self {
        RetrievalError::NotFound {
            what,
            location: path.display().to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RetrievalError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the error means "ingestion has not run yet" rather than a
    /// fault in the artifacts or the environment.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RetrievalError::NotFound { .. })
    }
}
