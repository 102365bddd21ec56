//! Routing fetcher.
//!
//! The scheduler is generic over one [`Fetcher`]; [`SourceFetcher`] picks
//! the HTTP or file implementation from the locator's [`SourceKind`].

use std::time::Duration;

use doclookout_core::config::HttpConfig;
use doclookout_core::{FetchError, FetchedDocument, Fetcher};
use doclookout_types::{SourceKind, SourceLocator};

use crate::error::SourceError;
use crate::file::FileFetcher;
use crate::http::HttpFetcher;

/// Dispatches on the locator kind.
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    http: HttpFetcher,
    file: FileFetcher,
}

impl SourceFetcher {
    /// Build with an HTTP client configured from `config`.
    pub fn new(config: &HttpConfig) -> Result<Self, SourceError> {
        Ok(Self::with_http(HttpFetcher::new(config)?))
    }

    /// Build around an existing HTTP fetcher.
    pub const fn with_http(http: HttpFetcher) -> Self {
        Self {
            http,
            file: FileFetcher::new(),
        }
    }
}

impl Fetcher for SourceFetcher {
    async fn fetch(
        &self,
        locator: &SourceLocator,
        timeout: Duration,
    ) -> Result<FetchedDocument, FetchError> {
        match locator.kind() {
            SourceKind::Http => self.http.fetch(locator, timeout).await,
            SourceKind::File => self.file.fetch(locator, timeout).await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn routes_file_locators_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        tokio::fs::write(&path, b"abc").await.unwrap();

        let fetcher = SourceFetcher::new(&HttpConfig::default()).unwrap();
        let locator = SourceLocator::parse(path.to_str().unwrap()).unwrap();
        let fetched = fetcher.fetch(&locator, Duration::from_secs(1)).await.unwrap();

        assert!(fetched.fingerprint.as_str().starts_with("blake3:"));
    }
}
