//! The fetcher capability.
//!
//! The core never talks HTTP or touches files itself. It hands a
//! [`SourceLocator`] to a [`Fetcher`] and gets back a fingerprint plus
//! whatever metadata the transport could cheaply provide. Every
//! [`FetchError`] is treated as transient: the scheduler backs off and
//! retries.

use std::future::Future;
use std::time::Duration;

use doclookout_types::{Fingerprint, Metadata, SourceKind, SourceLocator};

/// Errors a fetcher can report. All are retried with backoff.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The fetch did not finish within the configured timeout.
    #[error("fetch timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// Connectivity pre-check failed; the fetch was not attempted.
    #[error("network unavailable")]
    Offline,

    /// Connection, TLS or protocol failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("unexpected HTTP status {status}")]
    Status {
        /// The HTTP status code.
        status: u16,
    },

    /// Local filesystem failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// The fetcher does not handle this kind of locator.
    #[error("no fetcher for {0:?} locators")]
    Unsupported(SourceKind),

    /// The response could not be turned into a fingerprint.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    /// Digest or version token of the current content.
    pub fingerprint: Fingerprint,
    /// Transport metadata (content length, `ETag`, modification time...).
    pub metadata: Metadata,
}

impl FetchedDocument {
    /// A fetched document without metadata.
    pub fn new(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            metadata: Metadata::new(),
        }
    }
}

/// Retrieves the current state of a document.
///
/// `timeout` is advisory for the implementation (e.g. a per-request
/// timeout on the HTTP client); the scheduler enforces it independently.
pub trait Fetcher: Send + Sync {
    /// Fetch the document at `locator`.
    fn fetch(
        &self,
        locator: &SourceLocator,
        timeout: Duration,
    ) -> impl Future<Output = Result<FetchedDocument, FetchError>> + Send;
}
