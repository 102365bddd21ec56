//! Per-document async locks.
//!
//! Lock scope is one document id. The map itself sits behind a short
//! synchronous mutex that is never held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use doclookout_types::DocumentId;
use tokio::sync::OwnedMutexGuard;

/// A lazily populated set of async mutexes keyed by document id.
#[derive(Debug, Default)]
pub struct DocumentLocks {
    inner: Mutex<HashMap<DocumentId, Arc<tokio::sync::Mutex<()>>>>,
}

impl DocumentLocks {
    /// Create an empty lock set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    ///
    /// The guard releases the lock when dropped.
    pub async fn acquire(&self, id: &DocumentId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(id.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Drop lock entries nobody currently holds or waits on.
    pub fn prune(&self) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Number of lock entries currently tracked.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no lock entries are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_document_is_serialized() {
        let locks = Arc::new(DocumentLocks::new());
        let id = DocumentId::new("D1").unwrap();

        let guard = locks.acquire(&id).await;
        let contender = {
            let locks = Arc::clone(&locks);
            let id = id.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_documents_do_not_block() {
        let locks = DocumentLocks::new();
        let a = DocumentId::new("A").unwrap();
        let b = DocumentId::new("B").unwrap();

        let _held = locks.acquire(&a).await;
        let other = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&b)).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let locks = DocumentLocks::new();
        let a = DocumentId::new("A").unwrap();
        let b = DocumentId::new("B").unwrap();

        let held = locks.acquire(&a).await;
        drop(locks.acquire(&b).await);
        assert_eq!(locks.len(), 2);

        locks.prune();
        assert_eq!(locks.len(), 1);

        drop(held);
        locks.prune();
        assert!(locks.is_empty());
    }
}
