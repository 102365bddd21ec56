//! Error types for the DocLookout daemon.
//!
//! [`DaemonError`] wraps every failure that can stop startup, so `main`
//! can propagate with `?`.

/// Top-level error for the daemon binary.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: doclookout_core::ConfigError,
    },

    /// The snapshot store could not be opened.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: doclookout_store::StoreError,
    },

    /// A fetcher or notifier could not be built.
    #[error("source error: {source}")]
    Source {
        /// The underlying construction error.
        #[from]
        source: doclookout_sources::SourceError,
    },

    /// Waiting for the shutdown signal failed.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The logging subscriber could not be installed.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },
}
