//! In-memory snapshot backend.
//!
//! Not durable: a restart forgets everything, so the first poll after a
//! restart is a first sight again. Used in tests and when the operator
//! explicitly selects `store.kind: memory`.

use std::collections::BTreeMap;

use doclookout_types::{DocumentId, Snapshot};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::traits::SnapshotStore;

/// Snapshot store that keeps entries in a map.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    entries: RwLock<BTreeMap<DocumentId, Snapshot>>,
}

impl MemorySnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `snapshots`.
    pub fn with_snapshots(snapshots: impl IntoIterator<Item = Snapshot>) -> Self {
        let entries = snapshots
            .into_iter()
            .map(|snapshot| (snapshot.document_id.clone(), snapshot))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Copy of every entry.
    pub async fn entries(&self) -> BTreeMap<DocumentId, Snapshot> {
        self.entries.read().await.clone()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    async fn get(&self, id: &DocumentId) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn put(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(snapshot.document_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn remove(&self, id: &DocumentId) -> Result<bool, StoreError> {
        Ok(self.entries.write().await.remove(id).is_some())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use doclookout_types::Fingerprint;

    use super::*;

    #[tokio::test]
    async fn prepopulated_entries_are_visible() {
        let id = DocumentId::new("D1").unwrap();
        let store = MemorySnapshotStore::with_snapshots([Snapshot::new(
            id.clone(),
            Fingerprint::new("abc").unwrap(),
        )]);

        let got = store.get(&id).await.unwrap();
        assert_eq!(got.map(|s| s.fingerprint.to_string()), Some("abc".to_owned()));
        assert!(store.remove(&id).await.unwrap());
        assert!(store.entries().await.is_empty());
    }
}
