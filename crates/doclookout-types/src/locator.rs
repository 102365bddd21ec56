//! Source locators.
//!
//! A locator names where a document lives. Only two transports exist:
//! HTTP(S) URLs and local files (`file://` URLs or absolute paths). The
//! locator is validated once at registry load so fetchers can dispatch on
//! [`SourceKind`] without re-checking.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors produced when validating a locator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocatorError {
    /// The locator was empty.
    #[error("source locator must not be empty")]
    Empty,

    /// The locator has no recognised scheme and is not an absolute path.
    #[error("unsupported source locator {0:?} (expected http://, https://, file:// or an absolute path)")]
    Unsupported(String),

    /// The locator had a scheme but nothing after it.
    #[error("source locator {0:?} has no host or path")]
    MissingTarget(String),
}

/// The transport a locator resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// `http://` or `https://` URL.
    Http,
    /// Local file (`file://` URL or absolute path).
    File,
}

/// A validated document locator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceLocator(String);

impl SourceLocator {
    /// Validate a locator string.
    pub fn parse(raw: impl Into<String>) -> Result<Self, LocatorError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LocatorError::Empty);
        }
        let lower = trimmed.to_ascii_lowercase();
        for scheme in ["http://", "https://", "file://"] {
            if let Some(rest) = lower.strip_prefix(scheme) {
                if rest.is_empty() {
                    return Err(LocatorError::MissingTarget(trimmed.to_owned()));
                }
                return Ok(Self(trimmed.to_owned()));
            }
        }
        if Path::new(trimmed).is_absolute() {
            return Ok(Self(trimmed.to_owned()));
        }
        Err(LocatorError::Unsupported(trimmed.to_owned()))
    }

    /// Which transport serves this locator.
    pub fn kind(&self) -> SourceKind {
        let lower = self.0.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            SourceKind::Http
        } else {
            SourceKind::File
        }
    }

    /// Filesystem path for [`SourceKind::File`] locators.
    pub fn file_path(&self) -> Option<PathBuf> {
        if self.kind() != SourceKind::File {
            return None;
        }
        let path = self
            .0
            .get(..7)
            .filter(|prefix| prefix.eq_ignore_ascii_case("file://"))
            .and_then(|_| self.0.get(7..))
            .unwrap_or(&self.0);
        Some(PathBuf::from(path))
    }

    /// Borrow the locator as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SourceLocator {
    type Error = LocatorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SourceLocator> for String {
    fn from(locator: SourceLocator) -> Self {
        locator.0
    }
}

impl core::fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_locators() {
        let locator = SourceLocator::parse("https://example.com/syllabus.doc");
        assert_eq!(locator.map(|l| l.kind()), Ok(SourceKind::Http));
        let upper = SourceLocator::parse("HTTP://example.com/a");
        assert_eq!(upper.map(|l| l.kind()), Ok(SourceKind::Http));
    }

    #[test]
    fn file_url_strips_scheme() {
        let locator = SourceLocator::parse("file:///srv/docs/plan.doc").ok();
        assert_eq!(
            locator.and_then(|l| l.file_path()),
            Some(PathBuf::from("/srv/docs/plan.doc"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn absolute_path_is_file() {
        let locator = SourceLocator::parse("/srv/docs/plan.doc").ok();
        assert_eq!(locator.as_ref().map(SourceLocator::kind), Some(SourceKind::File));
        assert_eq!(
            locator.and_then(|l| l.file_path()),
            Some(PathBuf::from("/srv/docs/plan.doc"))
        );
    }

    #[test]
    fn rejects_relative_and_unknown() {
        assert!(matches!(
            SourceLocator::parse("docs/plan.doc"),
            Err(LocatorError::Unsupported(_))
        ));
        assert!(matches!(
            SourceLocator::parse("ftp://example.com/x"),
            Err(LocatorError::Unsupported(_))
        ));
        assert_eq!(SourceLocator::parse("  "), Err(LocatorError::Empty));
        assert!(matches!(
            SourceLocator::parse("https://"),
            Err(LocatorError::MissingTarget(_))
        ));
    }

    #[test]
    fn http_locator_has_no_file_path() {
        let locator = SourceLocator::parse("https://example.com/a").ok();
        assert_eq!(locator.and_then(|l| l.file_path()), None);
    }
}
