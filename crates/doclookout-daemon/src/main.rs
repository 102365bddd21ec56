//! DocLookout daemon.
//!
//! Watches the documents listed in `doclookout.yaml` and reports every
//! change through the configured notifier.
//!
//! # Startup Sequence
//!
//! 1. Resolve the config path (`DOCLOOKOUT_CONFIG`, else `doclookout.yaml`);
//!    if the file is missing, write a commented default and exit
//! 2. Load configuration and initialize structured logging
//! 3. Open the snapshot store and build the fetcher and notifier
//! 4. Sync the registry with the configured documents
//! 5. Start the poll scheduler
//! 6. Re-sync the registry whenever the config file changes
//! 7. On Ctrl-C, stop the scheduler and log each document's final status

mod error;
mod reload;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use doclookout_core::config::{DEFAULT_CONFIG_FILE, LoggingConfig, StoreKind};
use doclookout_core::{ChangeDetector, DocLookoutConfig, PollScheduler, Registry, StatusBoard};
use doclookout_sources::{ConnectivityProbe, GatedFetcher, NotifierEmitter, SourceFetcher};
use doclookout_store::{FileSnapshotStore, MemorySnapshotStore, StoreBackend};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::error::DaemonError;
use crate::reload::ConfigWatcher;

/// Floor for `reload_interval_ms`; zero would spin.
const MIN_RELOAD_INTERVAL: Duration = Duration::from_millis(100);

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any startup step fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path();

    if !config_path.exists() {
        DocLookoutConfig::write_default(&config_path)?;
        telemetry::init(&LoggingConfig::default())?;
        warn!(
            path = %config_path.display(),
            "no configuration found; wrote a default file. Add documents to it and restart"
        );
        return Ok(());
    }

    let config = DocLookoutConfig::from_file(&config_path)?;
    telemetry::init(&config.logging)?;
    info!(
        path = %config_path.display(),
        documents = config.documents.len(),
        store = ?config.store.kind,
        strategy = ?config.http.strategy,
        "doclookout starting"
    );

    run(config, config_path).await?;
    Ok(())
}

/// `DOCLOOKOUT_CONFIG`, else `doclookout.yaml` in the working directory.
fn config_path() -> PathBuf {
    std::env::var_os("DOCLOOKOUT_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from)
}

async fn open_store(config: &DocLookoutConfig) -> Result<StoreBackend, DaemonError> {
    let store = match config.store.kind {
        StoreKind::File => {
            StoreBackend::File(FileSnapshotStore::open(config.store.path.clone()).await?)
        }
        StoreKind::Memory => StoreBackend::Memory(MemorySnapshotStore::new()),
    };
    info!(
        backend = store.name(),
        path = %config.store.path.display(),
        "snapshot store ready"
    );
    Ok(store)
}

fn build_fetcher(config: &DocLookoutConfig) -> Result<GatedFetcher<SourceFetcher>, DaemonError> {
    let fetcher = SourceFetcher::new(&config.http)?;
    if config.connectivity.enabled {
        info!(probe_url = %config.connectivity.probe_url, "connectivity check enabled");
        Ok(GatedFetcher::new(
            fetcher,
            ConnectivityProbe::new(&config.connectivity)?,
        ))
    } else {
        Ok(GatedFetcher::ungated(fetcher))
    }
}

/// Wire everything together and run until Ctrl-C.
async fn run(config: DocLookoutConfig, config_path: PathBuf) -> Result<(), DaemonError> {
    let store = open_store(&config).await?;
    let notifier = NotifierEmitter::from_config(&config.notifier)?;
    info!(notifier = notifier.name(), "notifier ready");
    let fetcher = Arc::new(build_fetcher(&config)?);

    let detector = Arc::new(
        ChangeDetector::new(Arc::new(store), Arc::new(notifier))
            .with_emit_on_first_sight(config.scheduler.emit_on_first_sight)
            .with_emit_timeout(config.notifier.timeout()),
    );

    let registry = Arc::new(Registry::new());
    let report = reload::apply(&registry, detector.store().as_ref(), &config).await;
    info!(
        registered = registry.len(),
        rejected = report.rejected.len(),
        "documents registered"
    );

    let scheduler = PollScheduler::start(
        Arc::clone(&registry),
        fetcher,
        Arc::clone(&detector),
        config.scheduler.clone(),
    );

    let mut watcher = ConfigWatcher::new(config_path);
    let mut reload_every =
        tokio::time::interval(config.reload_interval().max(MIN_RELOAD_INTERVAL));
    reload_every.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_seen = config;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                signal?;
                info!("shutdown requested");
                break;
            }
            _ = reload_every.tick() => {
                match watcher.poll() {
                    Ok(Some(loaded)) => {
                        let report =
                            reload::apply(&registry, detector.store().as_ref(), &loaded).await;
                        info!(
                            path = %watcher.path().display(),
                            added = report.added.len(),
                            updated = report.updated.len(),
                            removed = report.removed.len(),
                            rejected = report.rejected.len(),
                            "configuration reloaded"
                        );
                        if reload::needs_restart(&last_seen, &loaded) {
                            warn!(
                                "only document changes apply while running; \
                                 restart to apply the rest"
                            );
                        }
                        last_seen = loaded;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(
                            path = %watcher.path().display(),
                            error = %e,
                            "configuration reload failed, keeping current documents"
                        );
                    }
                }
            }
        }
    }

    let board = scheduler.shutdown().await;
    log_final_status(&board).await;
    info!("doclookout stopped");
    Ok(())
}

async fn log_final_status(board: &StatusBoard) {
    for (id, status) in board.snapshot().await {
        info!(
            document_id = %id,
            phase = %status.phase,
            polls = status.polls,
            changes_detected = status.changes_detected,
            consecutive_failures = status.poll_state.consecutive_failures,
            degraded = status.degraded,
            last_error = status.last_error.as_deref().unwrap_or("none"),
            "final document status"
        );
    }
}
