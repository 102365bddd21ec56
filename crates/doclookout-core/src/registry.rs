//! The live set of monitored documents.
//!
//! Every mutation bumps a revision number published on a
//! [`tokio::sync::watch`] channel. The scheduler's supervisor subscribes
//! to it and reconciles its per-document loops against
//! [`Registry::descriptors`] whenever the revision moves, so documents can
//! be added, removed, re-timed or toggled without a restart.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use doclookout_types::{DocumentDescriptor, DocumentId, IdError, LocatorError, SourceLocator};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::DocumentConfig;

/// A document entry that cannot be registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// The id is empty, too long or contains control characters.
    #[error("invalid document id {id:?}: {source}")]
    InvalidId {
        /// The rejected id.
        id: String,
        /// Why it was rejected.
        source: IdError,
    },

    /// The locator is not a URL or absolute path we can fetch.
    #[error("invalid locator for document {id:?}: {source}")]
    InvalidLocator {
        /// Id of the entry.
        id: String,
        /// Why it was rejected.
        source: LocatorError,
    },

    /// A poll interval of zero would spin.
    #[error("document {id:?} has a zero poll interval")]
    ZeroInterval {
        /// Id of the entry.
        id: String,
    },

    /// Another entry already uses this id.
    #[error("duplicate document id {id:?}")]
    DuplicateId {
        /// The repeated id.
        id: String,
    },

    /// The document is not registered.
    #[error("unknown document {0}")]
    UnknownDocument(DocumentId),
}

/// Counts from one [`Registry::sync`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Newly registered documents.
    pub added: Vec<DocumentId>,
    /// Documents whose descriptor changed.
    pub updated: Vec<DocumentId>,
    /// Documents no longer present in the configuration.
    pub removed: Vec<DocumentId>,
    /// Entries that failed validation, including ones already reported.
    pub rejected: Vec<ConfigurationError>,
}

impl SyncReport {
    /// Whether the sync changed the registered set.
    pub fn changed(&self) -> bool {
        !(self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty())
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    documents: BTreeMap<DocumentId, DocumentDescriptor>,
    reported_invalid: BTreeSet<DocumentConfig>,
}

/// Registered documents plus a revision counter.
#[derive(Debug)]
pub struct Registry {
    state: Mutex<RegistryState>,
    revision: watch::Sender<u64>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry at revision 0.
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: Mutex::new(RegistryState::default()),
            revision,
        }
    }

    /// Receive a notification whenever the registry changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Current revision.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut RegistryState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Register a new document.
    pub fn add(&self, descriptor: DocumentDescriptor) -> Result<(), ConfigurationError> {
        if descriptor.poll_interval.is_zero() {
            return Err(ConfigurationError::ZeroInterval {
                id: descriptor.id.to_string(),
            });
        }
        self.with_state(|state| {
            if state.documents.contains_key(&descriptor.id) {
                return Err(ConfigurationError::DuplicateId {
                    id: descriptor.id.to_string(),
                });
            }
            state.documents.insert(descriptor.id.clone(), descriptor);
            Ok(())
        })?;
        self.bump();
        Ok(())
    }

    /// Insert or replace a document. Returns whether anything changed.
    pub fn upsert(&self, descriptor: DocumentDescriptor) -> Result<bool, ConfigurationError> {
        if descriptor.poll_interval.is_zero() {
            return Err(ConfigurationError::ZeroInterval {
                id: descriptor.id.to_string(),
            });
        }
        let changed = self.with_state(|state| {
            if state.documents.get(&descriptor.id) == Some(&descriptor) {
                return false;
            }
            state.documents.insert(descriptor.id.clone(), descriptor);
            true
        });
        if changed {
            self.bump();
        }
        Ok(changed)
    }

    /// Unregister a document. Returns the removed descriptor.
    pub fn remove(&self, id: &DocumentId) -> Option<DocumentDescriptor> {
        let removed = self.with_state(|state| state.documents.remove(id));
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    /// Change a document's poll interval.
    pub fn set_interval(&self, id: &DocumentId, interval: Duration) -> Result<(), ConfigurationError> {
        if interval.is_zero() {
            return Err(ConfigurationError::ZeroInterval { id: id.to_string() });
        }
        self.modify(id, |descriptor| {
            let changed = descriptor.poll_interval != interval;
            descriptor.poll_interval = interval;
            changed
        })
    }

    /// Enable or disable polling of a document.
    pub fn set_enabled(&self, id: &DocumentId, enabled: bool) -> Result<(), ConfigurationError> {
        self.modify(id, |descriptor| {
            let changed = descriptor.enabled != enabled;
            descriptor.enabled = enabled;
            changed
        })
    }

    fn modify(
        &self,
        id: &DocumentId,
        f: impl FnOnce(&mut DocumentDescriptor) -> bool,
    ) -> Result<(), ConfigurationError> {
        let changed = self.with_state(|state| {
            state
                .documents
                .get_mut(id)
                .map(f)
                .ok_or_else(|| ConfigurationError::UnknownDocument(id.clone()))
        })?;
        if changed {
            self.bump();
        }
        Ok(())
    }

    /// Descriptor of one document.
    pub fn get(&self, id: &DocumentId) -> Option<DocumentDescriptor> {
        self.with_state(|state| state.documents.get(id).cloned())
    }

    /// Every registered descriptor, ordered by id.
    pub fn descriptors(&self) -> Vec<DocumentDescriptor> {
        self.with_state(|state| state.documents.values().cloned().collect())
    }

    /// Number of registered documents.
    pub fn len(&self) -> usize {
        self.with_state(|state| state.documents.len())
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the registered set match `entries`.
    ///
    /// Valid entries are added or updated, registered documents missing
    /// from `entries` are removed, and invalid entries are skipped. Each
    /// distinct invalid entry is logged once; it is logged again only
    /// after it changes. When two entries share an id the later one is
    /// rejected. The revision moves at most once per call.
    pub fn sync(&self, entries: &[DocumentConfig], default_interval: Duration) -> SyncReport {
        let mut report = SyncReport::default();
        let mut wanted: BTreeMap<DocumentId, DocumentDescriptor> = BTreeMap::new();
        let mut invalid: Vec<(DocumentConfig, ConfigurationError)> = Vec::new();

        for entry in entries {
            match validate(entry, default_interval) {
                Ok(descriptor) if wanted.contains_key(&descriptor.id) => {
                    let err = ConfigurationError::DuplicateId {
                        id: descriptor.id.to_string(),
                    };
                    invalid.push((entry.clone(), err));
                }
                Ok(descriptor) => {
                    wanted.insert(descriptor.id.clone(), descriptor);
                }
                Err(err) => invalid.push((entry.clone(), err)),
            }
        }

        self.with_state(|state| {
            let mut still_invalid = BTreeSet::new();
            for (entry, err) in invalid {
                if !state.reported_invalid.contains(&entry) {
                    warn!(error = %err, locator = %entry.locator, "skipping invalid document entry");
                }
                still_invalid.insert(entry);
                report.rejected.push(err);
            }
            state.reported_invalid = still_invalid;

            let gone: Vec<DocumentId> = state
                .documents
                .keys()
                .filter(|id| !wanted.contains_key(*id))
                .cloned()
                .collect();
            for id in gone {
                state.documents.remove(&id);
                report.removed.push(id);
            }

            for (id, descriptor) in wanted {
                match state.documents.get(&id) {
                    Some(existing) if *existing == descriptor => {}
                    Some(_) => {
                        state.documents.insert(id.clone(), descriptor);
                        report.updated.push(id);
                    }
                    None => {
                        state.documents.insert(id.clone(), descriptor);
                        report.added.push(id);
                    }
                }
            }
        });

        if report.changed() {
            info!(
                added = report.added.len(),
                updated = report.updated.len(),
                removed = report.removed.len(),
                "registry synchronized"
            );
            self.bump();
        }
        report
    }
}

/// Turn a configuration entry into a descriptor.
pub fn validate(
    entry: &DocumentConfig,
    default_interval: Duration,
) -> Result<DocumentDescriptor, ConfigurationError> {
    let raw_id = entry.effective_id();
    let id = DocumentId::new(raw_id).map_err(|source| ConfigurationError::InvalidId {
        id: raw_id.to_owned(),
        source,
    })?;
    let locator = SourceLocator::parse(entry.locator.as_str()).map_err(|source| {
        ConfigurationError::InvalidLocator {
            id: raw_id.to_owned(),
            source,
        }
    })?;
    let interval = entry
        .interval_ms
        .map_or(default_interval, Duration::from_millis);
    if interval.is_zero() {
        return Err(ConfigurationError::ZeroInterval {
            id: raw_id.to_owned(),
        });
    }
    let mut descriptor = DocumentDescriptor::new(id, locator, interval);
    descriptor.enabled = entry.enabled.unwrap_or(true);
    Ok(descriptor)
}
