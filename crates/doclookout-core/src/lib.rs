//! Change detection and polling engine for DocLookout.
//!
//! The control flow is Registry -> Poll Scheduler -> per document:
//! Fetcher -> Change Detector (reads and updates the snapshot store) ->
//! Emitter on change. Fetching and emitting are capabilities supplied by
//! the caller, so this crate never touches the network itself.
//!
//! # Modules
//!
//! - [`fetcher`] -- The [`Fetcher`] capability and [`FetchError`].
//! - [`emitter`] -- The [`Emitter`] capability and [`EmitError`].
//! - [`detector`] -- [`ChangeDetector`]: compare, persist, emit.
//! - [`registry`] -- The live set of monitored documents.
//! - [`scheduler`] -- [`PollScheduler`]: supervisor plus one loop per
//!   document, with backoff and a shared fetch limit.
//! - [`backoff`] -- Retry delay and jitter arithmetic.
//! - [`status`] -- Per-document phase, poll state and the status board.
//! - [`config`] -- YAML configuration loading.

pub mod backoff;
pub mod config;
pub mod detector;
pub mod emitter;
pub mod fetcher;
pub mod registry;
pub mod scheduler;
pub mod status;

pub use config::{ConfigError, DocLookoutConfig, DocumentConfig, SchedulerConfig};
pub use detector::{
    ChangeDetector, CycleOutcome, DEFAULT_EMIT_TIMEOUT, Delivery, DetectError, Detection,
};
pub use emitter::{CollectingEmitter, EmitError, Emitter};
pub use fetcher::{FetchError, FetchedDocument, Fetcher};
pub use registry::{ConfigurationError, Registry, SyncReport};
pub use scheduler::PollScheduler;
pub use status::{DocumentPhase, DocumentStatus, PollState, StatusBoard};
