//! Per-document poll state and the status board.
//!
//! Each document loop owns its [`PollState`] and publishes a copy, along
//! with its lifecycle [`DocumentPhase`], to a shared [`StatusBoard`] so the
//! daemon (and tests) can report on it without touching the loop.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use doclookout_types::DocumentId;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

/// Lifecycle phase of a monitored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentPhase {
    /// Waiting for the next eligible poll time.
    #[default]
    Idle,
    /// A fetch is in flight.
    Fetching,
    /// The fetched snapshot is being compared and recorded.
    Detecting,
    /// The last cycle failed; waiting out the retry delay.
    Backoff,
    /// Not polled until re-enabled.
    Disabled,
}

impl DocumentPhase {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// `Disabled` is reachable from anywhere and is terminal here; only
    /// [`StatusBoard::enable`] leaves it.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (_, Self::Disabled)
                | (Self::Idle | Self::Backoff, Self::Idle)
                | (Self::Detecting, Self::Idle | Self::Backoff)
                | (Self::Idle, Self::Fetching)
                | (Self::Fetching, Self::Detecting | Self::Backoff)
        )
    }
}

impl core::fmt::Display for DocumentPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Detecting => "detecting",
            Self::Backoff => "backoff",
            Self::Disabled => "disabled",
        };
        f.write_str(name)
    }
}

/// Scheduling bookkeeping for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollState {
    /// Start of the most recent fetch attempt.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Failures since the last successful cycle.
    pub consecutive_failures: u32,
    /// Earliest time the next attempt may start.
    pub next_eligible_at: Option<DateTime<Utc>>,
}

/// Published status of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentStatus {
    /// Current lifecycle phase.
    pub phase: DocumentPhase,
    /// Backoff bookkeeping.
    pub poll_state: PollState,
    /// Failures exceeded the degraded threshold.
    pub degraded: bool,
    /// Most recent fetch or store error, cleared on success.
    pub last_error: Option<String>,
    /// Most recent emitter rejection. Not cleared by later cycles.
    pub last_emission_error: Option<String>,
    /// When a change (or emitted first sight) was last detected.
    pub last_change_at: Option<DateTime<Utc>>,
    /// Completed poll cycles, successful or not.
    pub polls: u64,
    /// Change events produced.
    pub changes_detected: u64,
}

/// Shared map of document id to [`DocumentStatus`].
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<BTreeMap<DocumentId, DocumentStatus>>>,
}

impl StatusBoard {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Status of one document.
    pub async fn get(&self, id: &DocumentId) -> Option<DocumentStatus> {
        self.inner.read().await.get(id).cloned()
    }

    /// Copy of every entry.
    pub async fn snapshot(&self) -> BTreeMap<DocumentId, DocumentStatus> {
        self.inner.read().await.clone()
    }

    /// Apply `f` to the status of `id`. Untracked ids are ignored.
    pub async fn update<F>(&self, id: &DocumentId, f: F)
    where
        F: FnOnce(&mut DocumentStatus),
    {
        if let Some(status) = self.inner.write().await.get_mut(id) {
            f(status);
        }
    }

    /// Start tracking `id` as `Idle`, or bring it back from `Disabled`.
    pub async fn enable(&self, id: &DocumentId) {
        self.inner.write().await.entry(id.clone()).or_default().phase = DocumentPhase::Idle;
    }

    /// Mark `id` as `Disabled`, tracking it if needed.
    pub async fn disable(&self, id: &DocumentId) {
        self.inner.write().await.entry(id.clone()).or_default().phase = DocumentPhase::Disabled;
    }

    /// Move `id` to `next`, ignoring illegal transitions and untracked ids.
    ///
    /// Returns whether the phase changed.
    pub async fn transition(&self, id: &DocumentId, next: DocumentPhase) -> bool {
        let mut map = self.inner.write().await;
        let Some(status) = map.get_mut(id) else {
            return false;
        };
        if status.phase == next {
            return false;
        }
        if !status.phase.can_transition_to(next) {
            debug!(
                document_id = %id,
                from = %status.phase,
                to = %next,
                "ignored illegal phase transition"
            );
            return false;
        }
        status.phase = next;
        true
    }

    /// Forget `id`.
    pub async fn remove(&self, id: &DocumentId) {
        self.inner.write().await.remove(id);
    }

    /// Ids currently marked degraded.
    pub async fn degraded(&self) -> Vec<DocumentId> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|(_, status)| status.degraded)
            .map(|(id, _)| id.clone())
            .collect()
    }
}
