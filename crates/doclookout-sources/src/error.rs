//! Error types for building source adapters.
//!
//! Runtime failures are reported through the core's `FetchError` and
//! `EmitError`; this type only covers construction.

/// Errors that can occur while constructing an adapter.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The HTTP client could not be built (TLS backend, bad header value).
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
