//! The change detector.
//!
//! One detection cycle compares a freshly fetched [`Snapshot`] with the
//! one the store holds for the same document, records the new snapshot
//! when the fingerprint moved, and hands the resulting [`ChangeEvent`] to
//! the emitter. The per-document lock is held from the store read through
//! emission, so cycles for one document never interleave.
//!
//! Ordering of the side effects:
//!
//! 1. the snapshot is persisted;
//! 2. only then is the event emitted.
//!
//! A failed write aborts the cycle before emission, so the change is
//! re-detected on the next poll. A failed emission does not roll back the
//! write; the event is reported lost and not retried. Emission is bounded
//! by a timeout, so a stalled downstream only holds up its own document.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use doclookout_store::{DocumentLocks, SnapshotStore, StoreError};
use doclookout_types::{ChangeEvent, EventId, Snapshot, SourceLocator};
use tracing::{debug, info, warn};

use crate::emitter::{EmitError, Emitter};

/// Errors that abort a detection cycle.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// Reading or writing the snapshot store failed.
    #[error("snapshot store error: {0}")]
    Store(#[from] StoreError),
}

/// What the comparison decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// The fetched fingerprint equals the stored one.
    Unchanged,
    /// The fingerprint moved; the event carries old and new.
    Changed(ChangeEvent),
    /// No snapshot existed. Carries an event only when first-sight
    /// emission is enabled.
    FirstSight(Option<ChangeEvent>),
}

impl Detection {
    /// The event to emit, if any.
    pub const fn event(&self) -> Option<&ChangeEvent> {
        match self {
            Self::Unchanged | Self::FirstSight(None) => None,
            Self::Changed(event) | Self::FirstSight(Some(event)) => Some(event),
        }
    }
}

/// Result of handing the event to the emitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// There was nothing to emit.
    NotNeeded,
    /// The emitter accepted the event.
    Accepted,
    /// The emitter rejected the event. The snapshot already advanced.
    Rejected(EmitError),
}

/// Full outcome of one detection cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    /// The comparison result.
    pub detection: Detection,
    /// What happened to the event.
    pub delivery: Delivery,
}

/// Default bound on a single `emit` call.
pub const DEFAULT_EMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Compares fetched snapshots with stored ones and emits change events.
#[derive(Debug)]
pub struct ChangeDetector<S, E> {
    store: Arc<S>,
    emitter: Arc<E>,
    locks: DocumentLocks,
    emit_on_first_sight: bool,
    emit_timeout: Duration,
}

impl<S: SnapshotStore, E: Emitter> ChangeDetector<S, E> {
    /// Create a detector. First-sight emission is off and emission is
    /// bounded by [`DEFAULT_EMIT_TIMEOUT`].
    pub fn new(store: Arc<S>, emitter: Arc<E>) -> Self {
        Self {
            store,
            emitter,
            locks: DocumentLocks::new(),
            emit_on_first_sight: false,
            emit_timeout: DEFAULT_EMIT_TIMEOUT,
        }
    }

    /// Emit an event the first time a document is seen.
    #[must_use]
    pub const fn with_emit_on_first_sight(mut self, enabled: bool) -> Self {
        self.emit_on_first_sight = enabled;
        self
    }

    /// Give up on an `emit` call after `timeout`; the event counts as
    /// rejected.
    #[must_use]
    pub const fn with_emit_timeout(mut self, timeout: Duration) -> Self {
        self.emit_timeout = timeout;
        self
    }

    /// The underlying store.
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Drop per-document locks that nobody holds.
    ///
    /// The scheduler calls this whenever documents leave the registry.
    pub fn prune_locks(&self) {
        self.locks.prune();
    }

    /// Number of per-document locks currently tracked.
    pub fn tracked_locks(&self) -> usize {
        self.locks.len()
    }

    /// Run one detection cycle for `fetched.document_id`.
    ///
    /// `locator` is copied into the event for notifiers; `poll_sequence`
    /// is the per-document sequence number of the cycle.
    pub async fn detect(
        &self,
        locator: &SourceLocator,
        fetched: Snapshot,
        poll_sequence: u64,
    ) -> Result<CycleOutcome, DetectError> {
        let document_id = fetched.document_id.clone();
        let _lock = self.locks.acquire(&document_id).await;

        let current = self.store.get(&document_id).await?;

        let previous = match current {
            Some(current) if current.fingerprint == fetched.fingerprint => {
                debug!(
                    document_id = %document_id,
                    fingerprint = %fetched.fingerprint,
                    poll_sequence,
                    "document unchanged"
                );
                return Ok(CycleOutcome {
                    detection: Detection::Unchanged,
                    delivery: Delivery::NotNeeded,
                });
            }
            Some(current) => Some(current.fingerprint),
            None => None,
        };

        let event = ChangeEvent {
            event_id: EventId::new(),
            document_id: document_id.clone(),
            locator: locator.clone(),
            previous_fingerprint: previous.clone(),
            new_fingerprint: fetched.fingerprint.clone(),
            detected_at: Utc::now(),
            poll_sequence,
        };

        self.store.put(&fetched).await?;

        let detection = if let Some(previous) = &previous {
            info!(
                document_id = %document_id,
                previous = %previous,
                current = %event.new_fingerprint,
                poll_sequence,
                "document changed"
            );
            Detection::Changed(event)
        } else if self.emit_on_first_sight {
            info!(
                document_id = %document_id,
                fingerprint = %event.new_fingerprint,
                "first sight, emitting"
            );
            Detection::FirstSight(Some(event))
        } else {
            info!(
                document_id = %document_id,
                fingerprint = %event.new_fingerprint,
                "first sight, baseline recorded"
            );
            Detection::FirstSight(None)
        };

        let delivery = match detection.event() {
            None => Delivery::NotNeeded,
            Some(event) => match self.emit_bounded(event).await {
                Ok(()) => Delivery::Accepted,
                Err(e) => {
                    warn!(
                        document_id = %document_id,
                        event_id = %event.event_id,
                        error = %e,
                        "change event rejected by emitter; not retried"
                    );
                    Delivery::Rejected(e)
                }
            },
        };

        Ok(CycleOutcome {
            detection,
            delivery,
        })
    }

    async fn emit_bounded(&self, event: &ChangeEvent) -> Result<(), EmitError> {
        match tokio::time::timeout(self.emit_timeout, self.emitter.emit(event)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(EmitError::Timeout {
                timeout_ms: u64::try_from(self.emit_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}
