//! Core value types: descriptors, fingerprints, snapshots and change events.
//!
//! All of these are immutable once built. A [`Snapshot`] is superseded by a
//! new value when a document's fingerprint moves; it is never edited in
//! place. A [`ChangeEvent`] is emitted once and not persisted.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DocumentId, EventId};
use crate::locator::SourceLocator;

/// Poll interval used when configuration does not specify one (60 s).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Free-form fetch metadata (content length, `ETag`, modification time...).
pub type Metadata = BTreeMap<String, String>;

/// Error returned when constructing an empty [`Fingerprint`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("fingerprint must not be empty")]
pub struct FingerprintError;

/// A short, comparable digest or version token for a document's content.
///
/// Two fingerprints are equal exactly when the detector should consider
/// the document unchanged.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap a non-empty fingerprint token.
    pub fn new(token: impl Into<String>) -> Result<Self, FingerprintError> {
        let token = token.into();
        if token.is_empty() {
            return Err(FingerprintError);
        }
        Ok(Self(token))
    }

    /// Borrow the token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = FingerprintError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.0
    }
}

impl core::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity and polling configuration of a monitored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    /// Stable identifier; the snapshot store is keyed by it.
    pub id: DocumentId,
    /// Where the document is fetched from.
    pub locator: SourceLocator,
    /// Time between successful polls.
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
    /// Disabled documents stay registered but are not polled.
    pub enabled: bool,
}

impl DocumentDescriptor {
    /// Build an enabled descriptor with the given interval.
    pub const fn new(id: DocumentId, locator: SourceLocator, poll_interval: Duration) -> Self {
        Self {
            id,
            locator,
            poll_interval,
            enabled: true,
        }
    }
}

/// The last recorded state of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Document this snapshot belongs to.
    pub document_id: DocumentId,
    /// Fingerprint recorded for the document.
    pub fingerprint: Fingerprint,
    /// When this fingerprint was first observed.
    pub observed_at: DateTime<Utc>,
    /// Optional fetch metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl Snapshot {
    /// Create a snapshot observed now, with no metadata.
    pub fn new(document_id: DocumentId, fingerprint: Fingerprint) -> Self {
        Self {
            document_id,
            fingerprint,
            observed_at: Utc::now(),
            metadata: Metadata::new(),
        }
    }

    /// Attach metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Notification that a document's fingerprint moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Unique id of this event.
    pub event_id: EventId,
    /// Document that changed.
    pub document_id: DocumentId,
    /// Locator of the document, for rendering notifications.
    pub locator: SourceLocator,
    /// Fingerprint before the change; `None` on first sight.
    pub previous_fingerprint: Option<Fingerprint>,
    /// Fingerprint after the change.
    pub new_fingerprint: Fingerprint,
    /// When the change was detected.
    pub detected_at: DateTime<Utc>,
    /// Poll sequence number (per document) of the detecting cycle.
    pub poll_sequence: u64,
}

impl ChangeEvent {
    /// Whether this event reports a document seen for the first time.
    pub const fn is_first_sight(&self) -> bool {
        self.previous_fingerprint.is_none()
    }
}

/// Serde helper: [`Duration`] as integer milliseconds.
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_fingerprint_rejected() {
        assert_eq!(Fingerprint::new(""), Err(FingerprintError));
        assert!(Fingerprint::new("len:1024").is_ok());
    }

    #[test]
    fn snapshot_json_layout_is_stable() {
        let snapshot = Snapshot {
            document_id: DocumentId::new("D1").unwrap(),
            fingerprint: Fingerprint::new("abc").unwrap(),
            observed_at: DateTime::parse_from_rfc3339("2024-01-15T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            metadata: Metadata::new(),
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "document_id": "D1",
                "fingerprint": "abc",
                "observed_at": "2024-01-15T10:00:00Z"
            })
        );
        let back: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn descriptor_interval_is_milliseconds() {
        let descriptor = DocumentDescriptor::new(
            DocumentId::new("D1").unwrap(),
            SourceLocator::parse("https://example.com/a.doc").unwrap(),
            Duration::from_secs(60),
        );
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json.get("poll_interval"), Some(&serde_json::json!(60_000)));
        assert_eq!(json.get("enabled"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn first_sight_event_has_no_previous() {
        let event = ChangeEvent {
            event_id: EventId::new(),
            document_id: DocumentId::new("D1").unwrap(),
            locator: SourceLocator::parse("https://example.com/a.doc").unwrap(),
            previous_fingerprint: None,
            new_fingerprint: Fingerprint::new("abc").unwrap(),
            detected_at: Utc::now(),
            poll_sequence: 1,
        };
        assert!(event.is_first_sight());
    }
}
