//! Identifier types.
//!
//! Documents are identified by operator-chosen strings (when the
//! configuration omits an id, the locator itself is used). Change events
//! get a UUID v7 so downstream notifiers can deduplicate deliveries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length of a document identifier, in characters.
///
/// Ids default to the locator, so this has to fit long signed URLs.
pub const MAX_DOCUMENT_ID_LEN: usize = 8 * 1024;

/// Errors produced when validating an identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The identifier was empty or only whitespace.
    #[error("document id must not be empty")]
    Empty,

    /// The identifier exceeded [`MAX_DOCUMENT_ID_LEN`].
    #[error("document id is {len} characters, maximum is {MAX_DOCUMENT_ID_LEN}")]
    TooLong {
        /// Actual length in characters.
        len: usize,
    },

    /// The identifier contained a control character.
    #[error("document id contains control characters")]
    ControlCharacter,
}

/// Identifier of a monitored document.
///
/// Validated on construction: non-empty, at most [`MAX_DOCUMENT_ID_LEN`]
/// characters, no control characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    /// Validate and wrap a document identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(IdError::Empty);
        }
        let len = id.chars().count();
        if len > MAX_DOCUMENT_ID_LEN {
            return Err(IdError::TooLong { len });
        }
        if id.chars().any(char::is_control) {
            return Err(IdError::ControlCharacter);
        }
        Ok(Self(id))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DocumentId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

impl core::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier of a single emitted change event (UUID v7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for EventId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_urls_as_ids() {
        let id = DocumentId::new("https://cs.fit.edu/~dmitra/ArtInt/Spr2024/AI-PlanSp2024.doc");
        assert!(id.is_ok());
    }

    #[test]
    fn rejects_blank_ids() {
        assert_eq!(DocumentId::new(""), Err(IdError::Empty));
        assert_eq!(DocumentId::new("   "), Err(IdError::Empty));
    }

    #[test]
    fn rejects_control_characters() {
        assert_eq!(
            DocumentId::new("syllabus\nv2"),
            Err(IdError::ControlCharacter)
        );
    }

    #[test]
    fn accepts_long_urls() {
        let url = format!("https://example.com/download?token={}", "a".repeat(2000));
        assert_eq!(DocumentId::new(url.clone()).ok().map(|id| id.to_string()), Some(url));
    }

    #[test]
    fn rejects_overlong_ids() {
        let long = "x".repeat(MAX_DOCUMENT_ID_LEN + 1);
        assert!(matches!(
            DocumentId::new(long),
            Err(IdError::TooLong { .. })
        ));
    }

    #[test]
    fn deserialization_validates() {
        let bad: Result<DocumentId, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
        let good: Result<DocumentId, _> = serde_json::from_str("\"syllabus\"");
        assert_eq!(good.ok().map(|id| id.to_string()), Some("syllabus".to_owned()));
    }

    #[test]
    fn event_ids_are_distinct() {
        let first = EventId::new();
        let second = EventId::new();
        assert_ne!(first, second);
        assert_eq!(first.to_string(), first.into_inner().to_string());
    }
}
