//! HTTP(S) fetcher.
//!
//! Three fingerprint strategies, picked once from configuration:
//!
//! - `content_length`: a `HEAD` request; the fingerprint is the
//!   `Content-Length` header (`len:<n>`, or `len:unknown` when the server
//!   omits it). Cheap, but blind to same-size edits.
//! - `validators`: a `HEAD` request; `ETag`, else `Last-Modified`, else the
//!   content length.
//! - `body_hash`: a `GET` request; BLAKE3 of the body.

use std::time::Duration;

use doclookout_core::config::{FingerprintStrategy, HttpConfig};
use doclookout_core::{FetchError, FetchedDocument, Fetcher};
use doclookout_types::{Fingerprint, Metadata, SourceKind, SourceLocator};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG, HeaderMap, HeaderName, LAST_MODIFIED};
use tracing::debug;

use crate::error::SourceError;

/// Fetches HTTP(S) documents with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    strategy: FingerprintStrategy,
}

impl HttpFetcher {
    /// Build a fetcher with its own client.
    pub fn new(config: &HttpConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self::with_client(client, config.strategy))
    }

    /// Build a fetcher around an existing client.
    pub const fn with_client(client: reqwest::Client, strategy: FingerprintStrategy) -> Self {
        Self { client, strategy }
    }

    /// The configured strategy.
    pub const fn strategy(&self) -> FingerprintStrategy {
        self.strategy
    }

    async fn send(
        &self,
        locator: &SourceLocator,
        timeout: Duration,
    ) -> Result<reqwest::Response, FetchError> {
        let request = match self.strategy {
            FingerprintStrategy::ContentLength | FingerprintStrategy::Validators => {
                self.client.head(locator.as_str())
            }
            FingerprintStrategy::BodyHash => self.client.get(locator.as_str()),
        };
        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(&e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        locator: &SourceLocator,
        timeout: Duration,
    ) -> Result<FetchedDocument, FetchError> {
        if locator.kind() != SourceKind::Http {
            return Err(FetchError::Unsupported(locator.kind()));
        }

        let response = self.send(locator, timeout).await?;
        let metadata = header_metadata(response.headers());

        let fingerprint = match self.strategy {
            FingerprintStrategy::ContentLength | FingerprintStrategy::Validators => {
                fingerprint_from_headers(self.strategy, response.headers())
            }
            FingerprintStrategy::BodyHash => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| transport_error(&e, timeout))?;
                format!("blake3:{}", blake3::hash(&body).to_hex())
            }
        };

        debug!(locator = %locator, fingerprint = %fingerprint, "fetched");
        let fingerprint =
            Fingerprint::new(fingerprint).map_err(|e| FetchError::InvalidResponse(e.to_string()))?;
        Ok(FetchedDocument {
            fingerprint,
            metadata,
        })
    }
}

fn transport_error(error: &reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    } else {
        FetchError::Transport(error.to_string())
    }
}

fn header_str<'h>(headers: &'h HeaderMap, name: &HeaderName) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    header_str(headers, &CONTENT_LENGTH).and_then(|v| v.parse().ok())
}

/// Fingerprint for the header-based strategies.
///
/// `BodyHash` falls back to the content length here; its real fingerprint
/// needs the body.
pub fn fingerprint_from_headers(strategy: FingerprintStrategy, headers: &HeaderMap) -> String {
    if strategy == FingerprintStrategy::Validators {
        if let Some(etag) = header_str(headers, &ETAG) {
            return format!("etag:{etag}");
        }
        if let Some(modified) = header_str(headers, &LAST_MODIFIED) {
            return format!("modified:{modified}");
        }
    }
    content_length(headers).map_or_else(|| "len:unknown".to_owned(), |n| format!("len:{n}"))
}

/// Transport metadata worth keeping next to the fingerprint.
pub fn header_metadata(headers: &HeaderMap) -> Metadata {
    let mut metadata = Metadata::new();
    for (key, name) in [
        ("content_length", &CONTENT_LENGTH),
        ("content_type", &CONTENT_TYPE),
        ("etag", &ETAG),
        ("last_modified", &LAST_MODIFIED),
    ] {
        if let Some(value) = header_str(headers, name) {
            metadata.insert(key.to_owned(), value.to_owned());
        }
    }
    metadata
}
