//! Configuration hot reload.
//!
//! [`ConfigWatcher`] re-reads the configuration file whenever its
//! modification time moves. [`apply`] pushes the document list into the
//! [`Registry`], which the running scheduler follows on its own.
//! Other sections are only read at startup.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use doclookout_core::{ConfigError, DocLookoutConfig, Registry, SyncReport};
use doclookout_store::SnapshotStore;
use doclookout_types::DEFAULT_POLL_INTERVAL;
use tracing::{info, warn};

/// Tracks the configuration file's modification time.
#[derive(Debug)]
pub struct ConfigWatcher {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl ConfigWatcher {
    /// Watch `path`, treating its current modification time as seen.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last_modified = modified(&path).ok();
        Self {
            path,
            last_modified,
        }
    }

    /// The watched file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reload the file if it changed since the last call.
    ///
    /// Returns `Ok(None)` when the modification time is unchanged. A file
    /// that fails to parse is reported once per modification.
    pub fn poll(&mut self) -> Result<Option<DocLookoutConfig>, ConfigError> {
        let current = modified(&self.path)?;
        if self.last_modified == Some(current) {
            return Ok(None);
        }
        self.last_modified = Some(current);
        DocLookoutConfig::from_file(&self.path).map(Some)
    }
}

fn modified(path: &Path) -> Result<SystemTime, ConfigError> {
    Ok(std::fs::metadata(path)?.modified()?)
}

/// Sync the registry with `config.documents`.
///
/// With `store.prune_removed` set, snapshots of documents that left the
/// configuration are deleted. A failed delete is logged and skipped.
pub async fn apply<S: SnapshotStore>(
    registry: &Registry,
    store: &S,
    config: &DocLookoutConfig,
) -> SyncReport {
    let report = registry.sync(&config.documents, DEFAULT_POLL_INTERVAL);

    if config.store.prune_removed {
        for id in &report.removed {
            match store.remove(id).await {
                Ok(true) => info!(document_id = %id, "pruned snapshot of removed document"),
                Ok(false) => {}
                Err(e) => warn!(document_id = %id, error = %e, "failed to prune snapshot"),
            }
        }
    }
    report
}

/// Whether anything outside `documents` differs between two configurations.
pub fn needs_restart(running: &DocLookoutConfig, loaded: &DocLookoutConfig) -> bool {
    running.scheduler != loaded.scheduler
        || running.store != loaded.store
        || running.notifier != loaded.notifier
        || running.connectivity != loaded.connectivity
        || running.http != loaded.http
        || running.logging != loaded.logging
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use std::time::Duration;

    use doclookout_store::MemorySnapshotStore;
    use doclookout_types::{DocumentId, Fingerprint, Snapshot};

    use super::*;

    const ONE_DOC: &str = "documents:\n  - id: terms\n    locator: https://example.com/terms.pdf\n";

    fn touch(path: &Path, offset: Duration) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + offset).unwrap();
    }

    #[test]
    fn unchanged_file_is_not_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doclookout.yaml");
        std::fs::write(&path, ONE_DOC).unwrap();

        let mut watcher = ConfigWatcher::new(&path);
        assert!(watcher.poll().unwrap().is_none());
    }

    #[test]
    fn modified_file_is_reloaded_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doclookout.yaml");
        std::fs::write(&path, "documents: []\n").unwrap();
        let mut watcher = ConfigWatcher::new(&path);

        std::fs::write(&path, ONE_DOC).unwrap();
        touch(&path, Duration::from_secs(10));

        let config = watcher.poll().unwrap().unwrap();
        assert_eq!(config.documents.len(), 1);
        assert!(watcher.poll().unwrap().is_none());
    }

    #[test]
    fn broken_file_is_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doclookout.yaml");
        std::fs::write(&path, ONE_DOC).unwrap();
        let mut watcher = ConfigWatcher::new(&path);

        std::fs::write(&path, "documents: [unclosed").unwrap();
        touch(&path, Duration::from_secs(10));

        assert!(watcher.poll().is_err());
        assert!(watcher.poll().unwrap().is_none());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = ConfigWatcher::new(dir.path().join("absent.yaml"));
        assert!(matches!(watcher.poll(), Err(ConfigError::Io { .. })));
    }

    #[tokio::test]
    async fn apply_prunes_removed_documents_when_enabled() {
        let registry = Registry::new();
        let id = DocumentId::new("terms").unwrap();
        let store = MemorySnapshotStore::with_snapshots([Snapshot::new(
            id.clone(),
            Fingerprint::new("len:1").unwrap(),
        )]);

        let mut config = DocLookoutConfig::parse(ONE_DOC).unwrap();
        let report = apply(&registry, &store, &config).await;
        assert_eq!(report.added, vec![id.clone()]);

        config.documents.clear();
        config.store.prune_removed = true;
        let report = apply(&registry, &store, &config).await;

        assert_eq!(report.removed, vec![id.clone()]);
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn apply_keeps_snapshots_by_default() {
        let registry = Registry::new();
        let id = DocumentId::new("terms").unwrap();
        let store = MemorySnapshotStore::with_snapshots([Snapshot::new(
            id.clone(),
            Fingerprint::new("len:1").unwrap(),
        )]);

        let mut config = DocLookoutConfig::parse(ONE_DOC).unwrap();
        apply(&registry, &store, &config).await;
        config.documents.clear();
        apply(&registry, &store, &config).await;

        assert!(registry.is_empty());
        assert!(store.get(&id).await.unwrap().is_some());
    }

    #[test]
    fn document_edits_do_not_need_restart() {
        let running = DocLookoutConfig::default();
        let documents_only = DocLookoutConfig::parse(ONE_DOC).unwrap();
        assert!(!needs_restart(&running, &documents_only));

        let mut scheduler = DocLookoutConfig::default();
        scheduler.scheduler.max_concurrent_fetches = 9;
        assert!(needs_restart(&running, &scheduler));
    }
}
