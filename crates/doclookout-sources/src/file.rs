//! Local file fetcher.
//!
//! The fingerprint is the BLAKE3 digest of the file contents, streamed in
//! fixed-size chunks so large documents are never held in memory.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use doclookout_core::{FetchError, FetchedDocument, Fetcher};
use doclookout_types::{Fingerprint, Metadata, SourceLocator};
use tokio::io::AsyncReadExt;

const CHUNK: usize = 65_536;

/// Fetches `file://` and absolute-path locators from the local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl FileFetcher {
    /// Create a file fetcher.
    pub const fn new() -> Self {
        Self
    }
}

fn io_error(path: &Path, error: &std::io::Error) -> FetchError {
    FetchError::Io(format!("{}: {error}", path.display()))
}

/// Stream `path` through BLAKE3.
pub async fn hash_file(path: &Path) -> Result<String, FetchError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| io_error(path, &e))?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0_u8; CHUNK];
    loop {
        let n = file.read(&mut buf).await.map_err(|e| io_error(path, &e))?;
        if n == 0 {
            break;
        }
        let chunk = buf
            .get(..n)
            .ok_or_else(|| FetchError::Io(format!("{}: short read", path.display())))?;
        hasher.update(chunk);
    }
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}

impl Fetcher for FileFetcher {
    async fn fetch(
        &self,
        locator: &SourceLocator,
        _timeout: Duration,
    ) -> Result<FetchedDocument, FetchError> {
        let path = locator
            .file_path()
            .ok_or(FetchError::Unsupported(locator.kind()))?;

        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| io_error(&path, &e))?;
        if !meta.is_file() {
            return Err(FetchError::Io(format!("{}: not a regular file", path.display())));
        }

        let fingerprint = hash_file(&path).await?;

        let mut metadata = Metadata::new();
        metadata.insert("size".to_owned(), meta.len().to_string());
        if let Ok(modified) = meta.modified() {
            let modified: DateTime<Utc> = modified.into();
            metadata.insert("modified".to_owned(), modified.to_rfc3339());
        }

        let fingerprint =
            Fingerprint::new(fingerprint).map_err(|e| FetchError::InvalidResponse(e.to_string()))?;
        Ok(FetchedDocument {
            fingerprint,
            metadata,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fingerprint_tracks_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        tokio::fs::write(&path, b"hello").await.unwrap();
        let locator = SourceLocator::parse(path.to_str().unwrap()).unwrap();

        let first = FileFetcher.fetch(&locator, Duration::from_secs(1)).await.unwrap();
        assert_eq!(
            first.fingerprint.as_str(),
            format!("blake3:{}", blake3::hash(b"hello").to_hex())
        );
        assert_eq!(first.metadata["size"], "5");
        assert!(first.metadata.contains_key("modified"));

        let again = FileFetcher.fetch(&locator, Duration::from_secs(1)).await.unwrap();
        assert_eq!(first.fingerprint, again.fingerprint);

        tokio::fs::write(&path, b"hellO").await.unwrap();
        let changed = FileFetcher.fetch(&locator, Duration::from_secs(1)).await.unwrap();
        assert_ne!(first.fingerprint, changed.fingerprint);
    }

    #[tokio::test]
    async fn file_scheme_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        tokio::fs::write(&path, vec![7_u8; 131_075]).await.unwrap();
        let locator = SourceLocator::parse(format!("file://{}", path.display())).unwrap();

        let fetched = FileFetcher.fetch(&locator, Duration::from_secs(1)).await.unwrap();
        let expected = blake3::hash(&vec![7_u8; 131_075]);
        assert_eq!(fetched.fingerprint.as_str(), format!("blake3:{}", expected.to_hex()));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let locator =
            SourceLocator::parse(dir.path().join("gone.md").to_str().unwrap()).unwrap();
        let err = FileFetcher.fetch(&locator, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, FetchError::Io(_)));
    }

    #[tokio::test]
    async fn directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let locator = SourceLocator::parse(dir.path().to_str().unwrap()).unwrap();
        let err = FileFetcher.fetch(&locator, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, FetchError::Io(_)));
    }

    #[tokio::test]
    async fn http_locator_is_unsupported() {
        let locator = SourceLocator::parse("https://example.com/a").unwrap();
        let err = FileFetcher.fetch(&locator, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, FetchError::Unsupported(_)));
    }
}
