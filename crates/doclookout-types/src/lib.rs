//! Shared type definitions for DocLookout.
//!
//! This crate is the single source of truth for the values that flow
//! between the registry, the poll scheduler, the change detector, the
//! snapshot store and the notifiers.
//!
//! # Modules
//!
//! - [`ids`] -- Document and event identifiers
//! - [`locator`] -- Source locators (HTTP URLs and filesystem paths)
//! - [`structs`] -- Descriptors, fingerprints, snapshots and change events

pub mod ids;
pub mod locator;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use ids::{DocumentId, EventId, IdError};
pub use locator::{LocatorError, SourceKind, SourceLocator};
pub use structs::{
    ChangeEvent, DEFAULT_POLL_INTERVAL, DocumentDescriptor, Fingerprint, FingerprintError,
    Metadata, Snapshot,
};
