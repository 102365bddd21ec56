//! The snapshot store contract.

use std::future::Future;

use doclookout_types::{DocumentId, Snapshot};

use crate::error::StoreError;

/// Persistent mapping from document id to its current [`Snapshot`].
///
/// Implementations must make [`put`](SnapshotStore::put) durable before
/// returning `Ok`: the change detector only emits an event after a
/// successful put, and a crash right after must not lose the advance.
/// Entries for different documents are independent.
pub trait SnapshotStore: Send + Sync {
    /// Current snapshot for `id`, or `None` if the document was never seen.
    fn get(
        &self,
        id: &DocumentId,
    ) -> impl Future<Output = Result<Option<Snapshot>, StoreError>> + Send;

    /// Replace the current snapshot for `snapshot.document_id`.
    fn put(&self, snapshot: &Snapshot) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete the entry for `id`. Returns whether an entry existed.
    fn remove(&self, id: &DocumentId) -> impl Future<Output = Result<bool, StoreError>> + Send;
}
