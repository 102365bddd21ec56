//! Durable one-file-per-document snapshot backend.
//!
//! Every entry is a small JSON document named after the BLAKE3 digest of
//! its document id (ids are arbitrary strings such as URLs, so they are
//! not used as file names directly). The embedded `document_id` is
//! checked on every read.
//!
//! Writes follow the classic crash-safe sequence: write a uniquely named
//! temp file, fsync it, rename it over the target, then fsync the
//! directory. A reader therefore sees either the old or the new entry,
//! never a torn one.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use doclookout_types::{DocumentId, Fingerprint, Snapshot};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::locks::DocumentLocks;
use crate::traits::SnapshotStore;

/// Extension of committed entries.
const ENTRY_EXTENSION: &str = "json";

/// Extension of in-progress writes.
const TEMP_EXTENSION: &str = "tmp";

/// The externally inspectable part of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEntry {
    /// Fingerprint currently recorded.
    pub fingerprint: Fingerprint,
    /// When it was first observed.
    pub observed_at: DateTime<Utc>,
}

/// Snapshot store backed by a directory of JSON files.
#[derive(Debug)]
pub struct FileSnapshotStore {
    root: PathBuf,
    locks: DocumentLocks,
}

impl FileSnapshotStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// Leftover temp files from interrupted writes are deleted; the
    /// committed entry they would have replaced is still intact.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::io(&root, e))?;

        let mut removed: u32 = 0;
        let mut entries = tokio::fs::read_dir(&root)
            .await
            .map_err(|e| StoreError::io(&root, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&root, e))?
        {
            let path = entry.path();
            if has_extension(&path, TEMP_EXTENSION) {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => removed = removed.saturating_add(1),
                    Err(e) => warn!(path = %path.display(), error = %e, "failed to remove stale temp file"),
                }
            }
        }

        debug!(root = %root.display(), stale_temp_files = removed, "snapshot store opened");
        Ok(Self {
            root,
            locks: DocumentLocks::new(),
        })
    }

    /// Directory holding the entries.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the entry file for `id`.
    pub fn entry_path(&self, id: &DocumentId) -> PathBuf {
        let digest = blake3::hash(id.as_str().as_bytes());
        self.root
            .join(format!("{}.{ENTRY_EXTENSION}", digest.to_hex()))
    }

    /// Read every committed entry into the inspection mapping
    /// `document_id -> {fingerprint, observed_at}`.
    ///
    /// Unreadable entries are logged and skipped so one bad file does not
    /// hide the rest.
    pub async fn export(&self) -> Result<BTreeMap<DocumentId, PersistedEntry>, StoreError> {
        let mut mapping = BTreeMap::new();
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| StoreError::io(&self.root, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.root, e))?
        {
            let path = entry.path();
            if !has_extension(&path, ENTRY_EXTENSION) {
                continue;
            }
            match read_entry(&path).await {
                Ok(Some(snapshot)) => {
                    mapping.insert(
                        snapshot.document_id,
                        PersistedEntry {
                            fingerprint: snapshot.fingerprint,
                            observed_at: snapshot.observed_at,
                        },
                    );
                }
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable snapshot entry"),
            }
        }

        Ok(mapping)
    }
}

impl SnapshotStore for FileSnapshotStore {
    async fn get(&self, id: &DocumentId) -> Result<Option<Snapshot>, StoreError> {
        let path = self.entry_path(id);
        let Some(snapshot) = read_entry(&path).await? else {
            return Ok(None);
        };
        if &snapshot.document_id != id {
            return Err(StoreError::Corrupt {
                path,
                reason: format!(
                    "entry belongs to {:?}, expected {:?}",
                    snapshot.document_id.as_str(),
                    id.as_str()
                ),
            });
        }
        Ok(Some(snapshot))
    }

    async fn put(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let _guard = self.locks.acquire(&snapshot.document_id).await;
        let target = self.entry_path(&snapshot.document_id);
        let bytes = serde_json::to_vec_pretty(snapshot).map_err(|source| {
            StoreError::Serialization {
                path: target.clone(),
                source,
            }
        })?;
        atomic_write(&self.root, &target, &bytes).await?;
        debug!(
            document_id = %snapshot.document_id,
            fingerprint = %snapshot.fingerprint,
            "snapshot persisted"
        );
        Ok(())
    }

    async fn remove(&self, id: &DocumentId) -> Result<bool, StoreError> {
        let guard = self.locks.acquire(id).await;
        let path = self.entry_path(id);
        let existed = match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        drop(guard);
        self.locks.prune();
        Ok(existed)
    }
}

/// Read and decode one entry; `Ok(None)` if the file does not exist.
async fn read_entry(path: &Path) -> Result<Option<Snapshot>, StoreError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Serialization {
            path: path.to_path_buf(),
            source,
        })
}

/// Write `data` to `target` via temp file + fsync + rename.
async fn atomic_write(dir: &Path, target: &Path, data: &[u8]) -> Result<(), StoreError> {
    let tmp = dir.join(format!("{}.{TEMP_EXTENSION}", Uuid::new_v4().simple()));

    let result = async {
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        file.write_all(data)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        file.sync_all().await.map_err(|e| StoreError::io(&tmp, e))?;
        drop(file);
        tokio::fs::rename(&tmp, target)
            .await
            .map_err(|e| StoreError::io(target, e))
    }
    .await;

    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(&tmp).await {
            debug!(path = %tmp.display(), error = %e, "temp file cleanup failed");
        }
        return result;
    }

    sync_dir(dir).await;
    Ok(())
}

/// Flush the directory entry for a rename. Best effort.
#[cfg(unix)]
async fn sync_dir(dir: &Path) {
    let result = match tokio::fs::File::open(dir).await {
        Ok(handle) => handle.sync_all().await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        debug!(dir = %dir.display(), error = %e, "directory fsync failed");
    }
}

/// Directories cannot be opened for sync here.
#[cfg(not(unix))]
#[allow(clippy::unused_async)]
async fn sync_dir(_dir: &Path) {}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == extension)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn snapshot(id: &str, fingerprint: &str) -> Snapshot {
        Snapshot::new(
            DocumentId::new(id).unwrap(),
            Fingerprint::new(fingerprint).unwrap(),
        )
    }

    #[tokio::test]
    async fn missing_entry_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).await.unwrap();
        let got = store.get(&DocumentId::new("D1").unwrap()).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn put_then_get_returns_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).await.unwrap();

        store.put(&snapshot("D1", "abc")).await.unwrap();
        store.put(&snapshot("D1", "def")).await.unwrap();

        let got = store.get(&DocumentId::new("D1").unwrap()).await.unwrap();
        assert_eq!(got.map(|s| s.fingerprint.to_string()), Some("def".to_owned()));
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileSnapshotStore::open(dir.path()).await.unwrap();
            store
                .put(&snapshot("https://example.com/plan.doc", "len:1024"))
                .await
                .unwrap();
        }

        let reopened = FileSnapshotStore::open(dir.path()).await.unwrap();
        let got = reopened
            .get(&DocumentId::new("https://example.com/plan.doc").unwrap())
            .await
            .unwrap();
        assert_eq!(
            got.map(|s| s.fingerprint.to_string()),
            Some("len:1024".to_owned())
        );
    }

    #[tokio::test]
    async fn open_removes_stale_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("deadbeef.tmp");
        std::fs::write(&stale, b"partial").unwrap();

        let _store = FileSnapshotStore::open(dir.path()).await.unwrap();
        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn failed_write_cleans_up_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).await.unwrap();
        let d1 = DocumentId::new("D1").unwrap();
        // A directory in the entry's place makes the final rename fail.
        let blocker = store.entry_path(&d1);
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("keep"), b"x").unwrap();

        let result = store.put(&snapshot("D1", "abc")).await;

        assert!(matches!(result, Err(StoreError::Io { .. })));
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| has_extension(&entry.path(), TEMP_EXTENSION))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn mismatched_entry_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).await.unwrap();
        let d1 = DocumentId::new("D1").unwrap();

        let foreign = serde_json::to_vec(&snapshot("D2", "abc")).unwrap();
        std::fs::write(store.entry_path(&d1), foreign).unwrap();

        let result = store.get(&d1).await;
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn garbage_entry_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).await.unwrap();
        let d1 = DocumentId::new("D1").unwrap();
        std::fs::write(store.entry_path(&d1), b"{not json").unwrap();

        let result = store.get(&d1).await;
        assert!(matches!(result, Err(StoreError::Serialization { .. })));
    }

    #[tokio::test]
    async fn export_maps_ids_to_fingerprints() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).await.unwrap();
        store.put(&snapshot("D1", "abc")).await.unwrap();
        store.put(&snapshot("D2", "xyz")).await.unwrap();
        std::fs::write(dir.path().join("junk.json"), b"nope").unwrap();

        let mapping = store.export().await.unwrap();
        assert_eq!(mapping.len(), 2);
        assert_eq!(
            mapping
                .get(&DocumentId::new("D2").unwrap())
                .map(|e| e.fingerprint.to_string()),
            Some("xyz".to_owned())
        );
    }

    #[tokio::test]
    async fn remove_deletes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).await.unwrap();
        let d1 = DocumentId::new("D1").unwrap();
        store.put(&snapshot("D1", "abc")).await.unwrap();

        assert!(store.remove(&d1).await.unwrap());
        assert!(!store.remove(&d1).await.unwrap());
        assert!(store.get(&d1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_puts_to_distinct_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FileSnapshotStore::open(dir.path()).await.unwrap());

        let mut handles = Vec::new();
        for n in 0..16 {
            let store = std::sync::Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .put(&snapshot(&format!("doc-{n}"), &format!("fp-{n}")))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.export().await.unwrap().len(), 16);
    }
}
