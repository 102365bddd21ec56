//! Snapshot storage for DocLookout.
//!
//! The store holds exactly one current [`Snapshot`] per document: the
//! fingerprint the change detector compares fresh fetches against. It is
//! the only state that must survive a restart, so the file backend writes
//! every entry durably (temp file, fsync, atomic rename) before reporting
//! success.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   <blake3(document_id)>.json   {document_id, fingerprint, observed_at, metadata?}
//!   ...
//! ```
//!
//! One file per document keeps writes for different documents fully
//! independent; same-document writes are serialized by [`DocumentLocks`].
//!
//! # Modules
//!
//! - [`traits`] -- The [`SnapshotStore`] contract
//! - [`file`] -- Durable one-file-per-document backend
//! - [`memory`] -- In-memory backend
//! - [`locks`] -- Per-document async locks
//! - [`backend`] -- Enum dispatch over the concrete backends
//! - [`error`] -- Shared error types
//!
//! [`Snapshot`]: doclookout_types::Snapshot

pub mod backend;
pub mod error;
pub mod file;
pub mod locks;
pub mod memory;
pub mod traits;

// Re-export primary types for convenience.
pub use backend::StoreBackend;
pub use error::StoreError;
pub use file::{FileSnapshotStore, PersistedEntry};
pub use locks::DocumentLocks;
pub use memory::MemorySnapshotStore;
pub use traits::SnapshotStore;
