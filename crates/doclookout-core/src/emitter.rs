//! The emitter capability.
//!
//! An [`Emitter`] hands a [`ChangeEvent`] to whatever delivers
//! notifications. The detector calls it synchronously inside the poll
//! cycle, so for one document events are delivered in poll order.

use std::future::Future;

use doclookout_types::ChangeEvent;

/// Errors reported by an emitter. The event is not retried by the core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmitError {
    /// The downstream refused the event.
    #[error("event rejected: {0}")]
    Rejected(String),

    /// The downstream could not be reached.
    #[error("delivery transport error: {0}")]
    Transport(String),

    /// The downstream did not answer within the emission timeout.
    #[error("delivery timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// The downstream answered with a non-success status.
    #[error("notifier returned HTTP {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
}

/// Delivers change events downstream.
pub trait Emitter: Send + Sync {
    /// Deliver one event. `Ok` means accepted.
    fn emit(&self, event: &ChangeEvent) -> impl Future<Output = Result<(), EmitError>> + Send;
}

/// An emitter that records every event it accepts.
///
/// Can be switched to reject mode to exercise emission failures. Used by
/// tests and handy for dry runs.
#[derive(Debug, Default)]
pub struct CollectingEmitter {
    events: std::sync::Mutex<Vec<ChangeEvent>>,
    rejecting: std::sync::atomic::AtomicBool,
}

impl CollectingEmitter {
    /// Create an emitter that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `emit` calls fail (or succeed again).
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting
            .store(rejecting, std::sync::atomic::Ordering::Release);
    }

    /// Copy of every accepted event, in delivery order.
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Emitter for CollectingEmitter {
    async fn emit(&self, event: &ChangeEvent) -> Result<(), EmitError> {
        if self.rejecting.load(std::sync::atomic::Ordering::Acquire) {
            return Err(EmitError::Rejected("collector is rejecting".to_owned()));
        }
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}
