//! Enum dispatch over the concrete store backends.
//!
//! The daemon picks a backend from configuration at startup; the scheduler
//! is generic over [`SnapshotStore`], so this enum lets one monomorphized
//! scheduler serve either choice.

use doclookout_types::{DocumentId, Snapshot};

use crate::error::StoreError;
use crate::file::FileSnapshotStore;
use crate::memory::MemorySnapshotStore;
use crate::traits::SnapshotStore;

/// A snapshot store selected at runtime.
#[derive(Debug)]
pub enum StoreBackend {
    /// Durable directory-of-files store.
    File(FileSnapshotStore),
    /// Volatile in-memory store.
    Memory(MemorySnapshotStore),
}

impl StoreBackend {
    /// Human-readable name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Memory(_) => "memory",
        }
    }
}

impl SnapshotStore for StoreBackend {
    async fn get(&self, id: &DocumentId) -> Result<Option<Snapshot>, StoreError> {
        match self {
            Self::File(store) => store.get(id).await,
            Self::Memory(store) => store.get(id).await,
        }
    }

    async fn put(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        match self {
            Self::File(store) => store.put(snapshot).await,
            Self::Memory(store) => store.put(snapshot).await,
        }
    }

    async fn remove(&self, id: &DocumentId) -> Result<bool, StoreError> {
        match self {
            Self::File(store) => store.remove(id).await,
            Self::Memory(store) => store.remove(id).await,
        }
    }
}
