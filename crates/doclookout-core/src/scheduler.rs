//! The poll scheduler.
//!
//! A supervisor task owns one tokio task per enabled document. It watches
//! the [`Registry`] revision and reconciles: new or re-enabled documents
//! get a loop, removed or disabled ones have theirs cancelled, and
//! descriptor changes (interval, locator) are pushed into the running loop
//! through a per-document [`watch`] channel.
//!
//! Each document loop:
//!
//! 1. sleeps until its next eligible time (the first poll is immediate);
//! 2. takes a permit from the shared fetch [`Semaphore`];
//! 3. fetches under the configured timeout and releases the permit;
//! 4. runs the [`ChangeDetector`] (whose emission has its own timeout);
//! 5. schedules the next attempt after the interval on success, or after
//!    an exponential backoff on failure, both with jitter.
//!
//! A loop never waits on another document, so a permanently failing
//! source only ever delays itself. When a loop is cancelled while a fetch
//! is in flight, the fetch runs to completion (or timeout) and its result
//! is thrown away.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use doclookout_store::SnapshotStore;
use doclookout_types::{DocumentDescriptor, DocumentId, Snapshot};
use tokio::sync::{Notify, Semaphore, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backoff::{backoff_delay, jittered};
use crate::config::SchedulerConfig;
use crate::detector::{ChangeDetector, CycleOutcome, Delivery, DetectError};
use crate::emitter::Emitter;
use crate::fetcher::{FetchError, Fetcher};
use crate::registry::Registry;
use crate::status::{DocumentPhase, StatusBoard};

/// Longest single sleep a loop will schedule.
const MAX_DELAY: Duration = Duration::from_secs(31_536_000);

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// One-shot cancellation signal with a single waiter.
#[derive(Debug, Default)]
struct CancelFlag {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.notify.notified().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Public handle
// ---------------------------------------------------------------------------

/// Handle to a running scheduler.
#[derive(Debug)]
pub struct PollScheduler {
    status: StatusBoard,
    stop: Arc<CancelFlag>,
    supervisor: JoinHandle<()>,
}

impl PollScheduler {
    /// Spawn the supervisor and a loop for every enabled document.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start<F, S, E>(
        registry: Arc<Registry>,
        fetcher: Arc<F>,
        detector: Arc<ChangeDetector<S, E>>,
        config: SchedulerConfig,
    ) -> Self
    where
        F: Fetcher + 'static,
        S: SnapshotStore + 'static,
        E: Emitter + 'static,
    {
        let permits = config
            .max_concurrent_fetches
            .clamp(1, Semaphore::MAX_PERMITS);
        let status = StatusBoard::new();
        let stop = Arc::new(CancelFlag::default());
        let shared = Arc::new(Shared {
            fetcher,
            detector,
            permits: Arc::new(Semaphore::new(permits)),
            status: status.clone(),
            config,
        });

        info!(
            documents = registry.len(),
            max_concurrent_fetches = permits,
            "poll scheduler starting"
        );

        let supervisor = Supervisor {
            registry,
            shared,
            loops: BTreeMap::new(),
            sequences: BTreeMap::new(),
            draining: Vec::new(),
        };
        let supervisor = tokio::spawn(supervisor.run(Arc::clone(&stop)));

        Self {
            status,
            stop,
            supervisor,
        }
    }

    /// Live per-document status.
    pub const fn status(&self) -> &StatusBoard {
        &self.status
    }

    /// Whether the supervisor is still running.
    pub fn is_running(&self) -> bool {
        !self.supervisor.is_finished()
    }

    /// Cancel every loop, wait for in-flight cycles to finish, and return
    /// the final status board.
    pub async fn shutdown(self) -> StatusBoard {
        self.stop.cancel();
        if let Err(e) = self.supervisor.await {
            warn!(error = %e, "scheduler supervisor ended abnormally");
        }
        info!("poll scheduler stopped");
        self.status
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// State shared by the supervisor and every loop.
struct Shared<F, S, E> {
    fetcher: Arc<F>,
    detector: Arc<ChangeDetector<S, E>>,
    permits: Arc<Semaphore>,
    status: StatusBoard,
    config: SchedulerConfig,
}

struct LoopHandle {
    descriptor: watch::Sender<DocumentDescriptor>,
    cancel: Arc<CancelFlag>,
    task: JoinHandle<()>,
}

impl LoopHandle {
    fn cancel(self) -> JoinHandle<()> {
        self.cancel.cancel();
        self.task
    }
}

struct Supervisor<F, S, E> {
    registry: Arc<Registry>,
    shared: Arc<Shared<F, S, E>>,
    loops: BTreeMap<DocumentId, LoopHandle>,
    /// Poll sequence counters; they survive disable/enable so sequence
    /// numbers keep increasing for a document.
    sequences: BTreeMap<DocumentId, Arc<AtomicU64>>,
    /// Cancelled loops that may still be finishing a cycle.
    draining: Vec<JoinHandle<()>>,
}

impl<F, S, E> Supervisor<F, S, E>
where
    F: Fetcher + 'static,
    S: SnapshotStore + 'static,
    E: Emitter + 'static,
{
    async fn run(mut self, stop: Arc<CancelFlag>) {
        let mut revisions = self.registry.subscribe();
        loop {
            self.reconcile().await;
            self.draining.retain(|task| !task.is_finished());

            tokio::select! {
                biased;
                () = stop.cancelled() => break,
                changed = revisions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        let loops = std::mem::take(&mut self.loops);
        let active = loops.len();
        self.draining
            .extend(loops.into_values().map(LoopHandle::cancel));
        debug!(active, draining = self.draining.len(), "waiting for document loops");
        for result in futures::future::join_all(self.draining).await {
            if let Err(e) = result {
                warn!(error = %e, "document loop ended abnormally");
            }
        }
    }

    async fn reconcile(&mut self) {
        let wanted: BTreeMap<DocumentId, DocumentDescriptor> = self
            .registry
            .descriptors()
            .into_iter()
            .map(|descriptor| (descriptor.id.clone(), descriptor))
            .collect();

        // Stop loops for documents that were removed or disabled.
        let stale: Vec<DocumentId> = self
            .loops
            .keys()
            .filter(|id| !wanted.get(*id).is_some_and(|d| d.enabled))
            .cloned()
            .collect();
        for id in stale {
            if let Some(handle) = self.loops.remove(&id) {
                info!(document_id = %id, "stopping document loop");
                self.draining.push(handle.cancel());
            }
        }

        // Forget documents that left the registry entirely.
        let removed: Vec<DocumentId> = self
            .sequences
            .keys()
            .filter(|id| !wanted.contains_key(*id))
            .cloned()
            .collect();
        let pruned = !removed.is_empty();
        for id in removed {
            self.sequences.remove(&id);
            self.shared.status.remove(&id).await;
        }
        if pruned {
            self.shared.detector.prune_locks();
        }

        for (id, descriptor) in wanted {
            if !descriptor.enabled {
                self.sequences.entry(id.clone()).or_default();
                self.shared.status.disable(&id).await;
                continue;
            }
            if let Some(handle) = self.loops.get(&id) {
                handle.descriptor.send_if_modified(|current| {
                    if *current == descriptor {
                        return false;
                    }
                    debug!(document_id = %id, "descriptor updated");
                    *current = descriptor;
                    true
                });
                continue;
            }
            self.spawn_loop(id, descriptor).await;
        }
    }

    async fn spawn_loop(&mut self, id: DocumentId, descriptor: DocumentDescriptor) {
        info!(
            document_id = %id,
            locator = %descriptor.locator,
            interval_ms = u64::try_from(descriptor.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "starting document loop"
        );
        self.shared.status.enable(&id).await;

        let (tx, rx) = watch::channel(descriptor);
        let cancel = Arc::new(CancelFlag::default());
        let sequence = Arc::clone(self.sequences.entry(id.clone()).or_default());
        let document_loop = DocumentLoop {
            id: id.clone(),
            descriptor: rx,
            shared: Arc::clone(&self.shared),
            cancel: Arc::clone(&cancel),
            sequence,
            failures: 0,
            degraded: false,
        };
        let task = tokio::spawn(document_loop.run());
        self.loops.insert(
            id,
            LoopHandle {
                descriptor: tx,
                cancel,
                task,
            },
        );
    }
}

// ---------------------------------------------------------------------------
// Per-document loop
// ---------------------------------------------------------------------------

struct DocumentLoop<F, S, E> {
    id: DocumentId,
    descriptor: watch::Receiver<DocumentDescriptor>,
    shared: Arc<Shared<F, S, E>>,
    cancel: Arc<CancelFlag>,
    sequence: Arc<AtomicU64>,
    failures: u32,
    degraded: bool,
}

/// Why a cycle did not complete.
#[derive(Debug, thiserror::Error)]
enum CycleError {
    #[error(transparent)]
    Fetch(FetchError),
    #[error(transparent)]
    Detect(DetectError),
}

impl<F, S, E> DocumentLoop<F, S, E>
where
    F: Fetcher,
    S: SnapshotStore,
    E: Emitter,
{
    async fn run(mut self) {
        let mut next = Instant::now();
        let mut last_completed: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                changed = self.descriptor.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    // Re-time from the last completed cycle with the new interval.
                    if let Some(completed) = last_completed {
                        let delay = self.delay_after_cycle();
                        next = deadline(completed, delay);
                        self.publish_next(delay).await;
                    }
                    continue;
                }
                () = tokio::time::sleep_until(next) => {}
            }

            let Some(delay) = self.cycle().await else {
                break;
            };
            let completed = Instant::now();
            last_completed = Some(completed);
            next = deadline(completed, delay);
        }
        debug!(document_id = %self.id, "document loop exited");
    }

    /// Run one fetch/detect cycle. Returns the delay until the next one,
    /// or `None` when the loop was cancelled.
    async fn cycle(&mut self) -> Option<Duration> {
        let permit = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return None,
            permit = Arc::clone(&self.shared.permits).acquire_owned() => permit.ok()?,
        };

        let descriptor = self.descriptor.borrow_and_update().clone();
        let poll_sequence = self.sequence.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        let status = &self.shared.status;

        status.transition(&self.id, DocumentPhase::Idle).await;
        status.transition(&self.id, DocumentPhase::Fetching).await;
        if self.cancel.is_cancelled() {
            return None;
        }
        status
            .update(&self.id, |s| s.poll_state.last_attempt_at = Some(Utc::now()))
            .await;

        let timeout = self.shared.config.fetch_timeout();
        let fetched = match tokio::time::timeout(
            timeout,
            self.shared.fetcher.fetch(&descriptor.locator, timeout),
        )
        .await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(FetchError::Timeout {
                timeout_ms: self.shared.config.fetch_timeout_ms,
            }),
        };
        drop(permit);

        if self.cancel.is_cancelled() {
            debug!(
                document_id = %self.id,
                poll_sequence,
                "document disabled mid-flight; discarding fetch result"
            );
            return None;
        }

        let result = match fetched {
            Ok(document) => {
                status.transition(&self.id, DocumentPhase::Detecting).await;
                let snapshot = Snapshot::new(self.id.clone(), document.fingerprint)
                    .with_metadata(document.metadata);
                self.shared
                    .detector
                    .detect(&descriptor.locator, snapshot, poll_sequence)
                    .await
                    .map_err(CycleError::Detect)
            }
            Err(e) => Err(CycleError::Fetch(e)),
        };

        if self.cancel.is_cancelled() {
            return None;
        }

        let delay = match result {
            Ok(outcome) => self.on_success(&outcome).await,
            Err(e) => self.on_failure(&e, poll_sequence).await,
        };
        self.publish_next(delay).await;
        Some(delay)
    }

    async fn on_success(&mut self, outcome: &CycleOutcome) -> Duration {
        if self.degraded {
            info!(
                document_id = %self.id,
                failures = self.failures,
                "document recovered"
            );
        }
        self.failures = 0;
        self.degraded = false;

        let now = Utc::now();
        let changed = outcome.detection.event().is_some();
        let emission_error = match &outcome.delivery {
            Delivery::Rejected(e) => Some(e.to_string()),
            Delivery::NotNeeded | Delivery::Accepted => None,
        };
        self.shared
            .status
            .update(&self.id, |s| {
                s.polls = s.polls.saturating_add(1);
                s.poll_state.consecutive_failures = 0;
                s.degraded = false;
                s.last_error = None;
                if changed {
                    s.changes_detected = s.changes_detected.saturating_add(1);
                    s.last_change_at = Some(now);
                }
                if emission_error.is_some() {
                    s.last_emission_error = emission_error;
                }
            })
            .await;
        self.shared
            .status
            .transition(&self.id, DocumentPhase::Idle)
            .await;

        self.delay_after_cycle()
    }

    async fn on_failure(&mut self, error: &CycleError, poll_sequence: u64) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = self.delay_after_cycle();
        let threshold = self.shared.config.degraded_threshold;

        warn!(
            document_id = %self.id,
            poll_sequence,
            failures = self.failures,
            retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "poll failed"
        );
        if self.failures > threshold && !self.degraded {
            warn!(
                document_id = %self.id,
                failures = self.failures,
                threshold,
                "document degraded; retrying at capped backoff"
            );
            self.degraded = true;
        }

        let failures = self.failures;
        let degraded = self.degraded;
        let message = error.to_string();
        self.shared
            .status
            .update(&self.id, |s| {
                s.polls = s.polls.saturating_add(1);
                s.poll_state.consecutive_failures = failures;
                s.degraded = degraded;
                s.last_error = Some(message);
            })
            .await;
        self.shared
            .status
            .transition(&self.id, DocumentPhase::Backoff)
            .await;

        delay
    }

    /// Delay after the most recent cycle, given the current failure count
    /// and descriptor.
    fn delay_after_cycle(&self) -> Duration {
        let interval = self.descriptor.borrow().poll_interval;
        let base = if self.failures == 0 {
            interval
        } else {
            backoff_delay(interval, self.failures, self.shared.config.max_backoff())
        };
        jittered(base, self.shared.config.jitter_ratio_percent).min(MAX_DELAY)
    }

    async fn publish_next(&self, delay: Duration) {
        let next = next_eligible_at(Utc::now(), delay);
        self.shared
            .status
            .update(&self.id, |s| s.poll_state.next_eligible_at = next)
            .await;
    }
}

fn deadline(from: Instant, delay: Duration) -> Instant {
    from.checked_add(delay.min(MAX_DELAY)).unwrap_or(from)
}

fn next_eligible_at(now: DateTime<Utc>, delay: Duration) -> Option<DateTime<Utc>> {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_before_wait_is_not_lost() {
        let flag = CancelFlag::default();
        flag.cancel();
        tokio::time::timeout(Duration::from_secs(1), flag.cancelled())
            .await
            .unwrap();
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_wakes_waiter() {
        let flag = Arc::new(CancelFlag::default());
        let waiter = tokio::spawn({
            let flag = Arc::clone(&flag);
            async move { flag.cancelled().await }
        });
        tokio::task::yield_now().await;
        flag.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn next_eligible_is_in_the_future() {
        let now = Utc::now();
        let next = next_eligible_at(now, Duration::from_secs(30)).unwrap();
        assert_eq!(next.signed_duration_since(now).num_seconds(), 30);
    }

    #[test]
    fn deadline_saturates() {
        let now = Instant::now();
        assert!(deadline(now, Duration::MAX) > now);
    }
}
