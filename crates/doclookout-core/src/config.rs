//! Configuration loading and typed config structures.
//!
//! The daemon reads `doclookout.yaml` (path overridable with
//! `DOCLOOKOUT_CONFIG`). Every field has a default, so an empty file is a
//! valid configuration that monitors nothing. JSON is a subset of YAML, so
//! a JSON file parses as well.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::DEFAULT_JITTER_PERCENT;

/// File name looked up when `DOCLOOKOUT_CONFIG` is not set.
pub const DEFAULT_CONFIG_FILE: &str = "doclookout.yaml";

/// Written by the daemon when no configuration file exists.
pub const DEFAULT_CONFIG_YAML: &str = r#"# DocLookout configuration.
# Add the documents to watch under `documents`, then restart the daemon.
# Changes to this file are picked up while running.

scheduler:
  max_concurrent_fetches: 4
  fetch_timeout_ms: 10000
  max_backoff_ms: 3600000
  degraded_threshold: 5
  jitter_ratio_percent: 10
  emit_on_first_sight: false

store:
  kind: file          # file | memory
  path: snapshots
  prune_removed: false

notifier:
  webhook_url: ""     # Discord webhook; empty logs changes instead
  role_id_to_ping: "" # optional role mentioned in every notification
  timeout_ms: 10000   # a delivery slower than this counts as lost

connectivity:
  enabled: true
  probe_url: "https://discord.com/"
  cache_ttl_ms: 30000

http:
  strategy: content_length  # content_length | validators | body_hash

logging:
  level: info
  format: pretty      # pretty | json

reload_interval_ms: 5000

documents: []
#  - locator: "https://example.com/terms.pdf"
#    interval_ms: 60000
#  - id: handbook
#    locator: "/srv/docs/handbook.md"
#    enabled: false
"#;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read or write the configuration file.
    #[error("failed to access config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DocLookoutConfig {
    /// Poll scheduling.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Snapshot persistence.
    #[serde(default)]
    pub store: StoreConfig,

    /// Where change notifications go.
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Internet connectivity pre-check.
    #[serde(default)]
    pub connectivity: ConnectivityConfig,

    /// HTTP fetching.
    #[serde(default)]
    pub http: HttpConfig,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// How often the daemon checks the file for changes.
    #[serde(default = "default_reload_interval_ms")]
    pub reload_interval_ms: u64,

    /// Monitored documents.
    #[serde(default)]
    pub documents: Vec<DocumentConfig>,
}

impl Default for DocLookoutConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            store: StoreConfig::default(),
            notifier: NotifierConfig::default(),
            connectivity: ConnectivityConfig::default(),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
            reload_interval_ms: default_reload_interval_ms(),
            documents: Vec::new(),
        }
    }
}

impl DocLookoutConfig {
    /// Load configuration from a YAML (or JSON) file.
    ///
    /// Environment variables override file values:
    /// - `DOCLOOKOUT_WEBHOOK_URL` overrides `notifier.webhook_url`
    /// - `DOCLOOKOUT_STORE_PATH` overrides `store.path`
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Write [`DEFAULT_CONFIG_YAML`] to `path`.
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, DEFAULT_CONFIG_YAML)?;
        Ok(())
    }

    /// Apply `DOCLOOKOUT_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DOCLOOKOUT_WEBHOOK_URL") {
            self.notifier.webhook_url = Some(val);
        }
        if let Ok(val) = std::env::var("DOCLOOKOUT_STORE_PATH") {
            self.store.path = PathBuf::from(val);
        }
    }

    /// Reload poll interval.
    pub const fn reload_interval(&self) -> Duration {
        Duration::from_millis(self.reload_interval_ms)
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Fetches allowed in flight at once, across all documents.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Per-fetch deadline.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Upper bound for the failure backoff.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// A document is degraded once its consecutive failures exceed this.
    #[serde(default = "default_degraded_threshold")]
    pub degraded_threshold: u32,

    /// Random perturbation applied to every scheduled delay, in percent.
    #[serde(default = "default_jitter_ratio_percent")]
    pub jitter_ratio_percent: u8,

    /// Emit an event the first time a document is seen.
    #[serde(default)]
    pub emit_on_first_sight: bool,
}

impl SchedulerConfig {
    /// Fetch timeout as a [`Duration`].
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Maximum backoff as a [`Duration`].
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            degraded_threshold: default_degraded_threshold(),
            jitter_ratio_percent: default_jitter_ratio_percent(),
            emit_on_first_sight: false,
        }
    }
}

/// Which snapshot backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// One JSON file per document under `path`.
    #[default]
    File,
    /// Nothing survives a restart.
    Memory,
}

/// Snapshot store settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Backend selection.
    #[serde(default)]
    pub kind: StoreKind,

    /// Root directory of the file store.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Delete the stored snapshot when a document leaves the configuration.
    #[serde(default)]
    pub prune_removed: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::File,
            path: default_store_path(),
            prune_removed: false,
        }
    }
}

/// Notification settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NotifierConfig {
    /// Discord-compatible webhook URL. Empty or missing means log only.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Role mentioned at the start of each notification.
    #[serde(default)]
    pub role_id_to_ping: Option<String>,

    /// Upper bound on one delivery, in milliseconds.
    #[serde(default = "default_notifier_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            role_id_to_ping: None,
            timeout_ms: default_notifier_timeout_ms(),
        }
    }
}

impl NotifierConfig {
    /// Delivery timeout as a [`Duration`].
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The webhook URL, if one is configured and non-blank.
    pub fn webhook_url(&self) -> Option<&str> {
        non_blank(self.webhook_url.as_deref())
    }

    /// The role id, if one is configured and non-blank.
    pub fn role_id(&self) -> Option<&str> {
        non_blank(self.role_id_to_ping.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Connectivity pre-check settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectivityConfig {
    /// Skip HTTP fetches while the probe fails.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// URL fetched to decide whether the network is up.
    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    /// How long a probe result is reused.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
}

impl ConnectivityConfig {
    /// Probe cache TTL as a [`Duration`].
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            probe_url: default_probe_url(),
            cache_ttl_ms: default_cache_ttl_ms(),
        }
    }
}

/// How an HTTP document is fingerprinted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintStrategy {
    /// `HEAD`, `Content-Length` only.
    #[default]
    ContentLength,
    /// `HEAD`, `ETag` then `Last-Modified` then `Content-Length`.
    Validators,
    /// `GET`, BLAKE3 of the body.
    BodyHash,
}

/// HTTP fetcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HttpConfig {
    /// Fingerprinting strategy.
    #[serde(default)]
    pub strategy: FingerprintStrategy,

    /// `User-Agent` header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            strategy: FingerprintStrategy::ContentLength,
            user_agent: default_user_agent(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Pretty,
        }
    }
}

/// One monitored document as written in the configuration.
///
/// Validation happens in [`Registry::sync`](crate::registry::Registry::sync).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct DocumentConfig {
    /// Stable id. Defaults to the locator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// URL or absolute path.
    pub locator: String,

    /// Poll interval; the registry default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,

    /// Defaults to enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl DocumentConfig {
    /// An enabled entry with only a locator.
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            id: None,
            locator: locator.into(),
            interval_ms: None,
            enabled: None,
        }
    }

    /// The id this entry registers under.
    pub fn effective_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.locator)
    }
}

const fn default_max_concurrent_fetches() -> usize {
    4
}

const fn default_fetch_timeout_ms() -> u64 {
    10_000
}

const fn default_notifier_timeout_ms() -> u64 {
    10_000
}

const fn default_max_backoff_ms() -> u64 {
    3_600_000
}

const fn default_degraded_threshold() -> u32 {
    5
}

const fn default_jitter_ratio_percent() -> u8 {
    DEFAULT_JITTER_PERCENT
}

const fn default_reload_interval_ms() -> u64 {
    5_000
}

fn default_store_path() -> PathBuf {
    PathBuf::from("snapshots")
}

fn default_probe_url() -> String {
    "https://discord.com/".to_owned()
}

const fn default_cache_ttl_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    format!("DocLookout/{}", env!("CARGO_PKG_VERSION"))
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = DocLookoutConfig::default();
        assert_eq!(config.scheduler.max_concurrent_fetches, 4);
        assert_eq!(config.scheduler.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.scheduler.max_backoff(), Duration::from_secs(3600));
        assert_eq!(config.scheduler.degraded_threshold, 5);
        assert_eq!(config.scheduler.jitter_ratio_percent, 10);
        assert!(!config.scheduler.emit_on_first_sight);
        assert_eq!(config.store.kind, StoreKind::File);
        assert!(config.connectivity.enabled);
        assert_eq!(config.http.strategy, FingerprintStrategy::ContentLength);
        assert_eq!(config.reload_interval(), Duration::from_secs(5));
        assert_eq!(config.notifier.timeout(), Duration::from_secs(10));
        assert!(config.documents.is_empty());
    }

    #[test]
    fn bootstrap_file_parses_to_defaults() {
        let config = DocLookoutConfig::parse(DEFAULT_CONFIG_YAML).unwrap();
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert_eq!(config.store, StoreConfig::default());
        assert_eq!(config.notifier.webhook_url(), None);
        assert_eq!(config.notifier.timeout_ms, 10_000);
        assert_eq!(config.reload_interval_ms, 5000);
        assert!(config.documents.is_empty());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
scheduler:
  max_concurrent_fetches: 8
  fetch_timeout_ms: 2500
  max_backoff_ms: 60000
  degraded_threshold: 2
  jitter_ratio_percent: 0
  emit_on_first_sight: true

store:
  kind: memory
  path: /var/lib/doclookout
  prune_removed: true

notifier:
  webhook_url: "https://discord.com/api/webhooks/1/abc"
  role_id_to_ping: "1234"
  timeout_ms: 750

connectivity:
  enabled: false

http:
  strategy: body_hash
  user_agent: "tests"

logging:
  level: debug
  format: json

documents:
  - locator: "https://example.com/a.pdf"
  - id: handbook
    locator: "/srv/handbook.md"
    interval_ms: 1000
    enabled: false
"#;

        let config = DocLookoutConfig::parse(yaml).unwrap();

        assert_eq!(config.scheduler.max_concurrent_fetches, 8);
        assert_eq!(config.scheduler.fetch_timeout(), Duration::from_millis(2500));
        assert!(config.scheduler.emit_on_first_sight);
        assert_eq!(config.store.kind, StoreKind::Memory);
        assert!(config.store.prune_removed);
        assert_eq!(config.notifier.role_id(), Some("1234"));
        assert_eq!(config.notifier.timeout(), Duration::from_millis(750));
        assert!(!config.connectivity.enabled);
        assert_eq!(config.connectivity.probe_url, "https://discord.com/");
        assert_eq!(config.http.strategy, FingerprintStrategy::BodyHash);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.documents.len(), 2);
        assert_eq!(config.documents[0].effective_id(), "https://example.com/a.pdf");
        assert_eq!(config.documents[1].effective_id(), "handbook");
        assert_eq!(config.documents[1].enabled, Some(false));
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = DocLookoutConfig::parse("scheduler:\n  degraded_threshold: 9\n").unwrap();
        assert_eq!(config.scheduler.degraded_threshold, 9);
        assert_eq!(config.scheduler.max_concurrent_fetches, 4);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(DocLookoutConfig::parse("").is_ok());
    }

    #[test]
    fn parse_json() {
        let json = r#"{"documents": [{"locator": "https://example.com/x", "interval_ms": 500}]}"#;
        let config = DocLookoutConfig::parse(json).unwrap();
        assert_eq!(config.documents[0].interval_ms, Some(500));
    }

    #[test]
    fn blank_notifier_values_are_absent() {
        let config = DocLookoutConfig::parse("notifier:\n  webhook_url: \"  \"\n").unwrap();
        assert_eq!(config.notifier.webhook_url(), None);
        assert_eq!(config.notifier.role_id(), None);
    }

    #[test]
    fn unknown_enum_value_is_an_error() {
        let err = DocLookoutConfig::parse("store:\n  kind: sqlite\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
    }
}
