//! Error types for the snapshot store.
//!
//! All errors are propagated via [`StoreError`] with the path of the entry
//! that failed where one exists. The poll scheduler treats every variant
//! as retryable on the next cycle.

use std::path::PathBuf;

/// Errors that can occur in the snapshot store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A snapshot could not be encoded or decoded.
    #[error("serialization error on {path}: {source}")]
    Serialization {
        /// File involved.
        path: PathBuf,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// An entry exists but does not belong to the requested document.
    #[error("corrupt snapshot entry {path}: {reason}")]
    Corrupt {
        /// File involved.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The backend is not accepting requests.
    #[error("snapshot store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Build an [`StoreError::Io`] for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
