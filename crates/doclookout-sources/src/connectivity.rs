//! Internet connectivity pre-check.
//!
//! Before an HTTP fetch, [`GatedFetcher`] asks a [`ConnectivityProbe`]
//! whether the network is up. While it is not, HTTP fetches fail fast with
//! [`FetchError::Offline`] (which the scheduler backs off like any other
//! transient failure) instead of each document timing out separately.
//! File locators are never gated.
//!
//! The probe result is cached for a short TTL so that many documents
//! polling at once cost a single probe request.

use std::time::Duration;

use doclookout_core::config::ConnectivityConfig;
use doclookout_core::{FetchError, FetchedDocument, Fetcher};
use doclookout_types::{SourceKind, SourceLocator};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::SourceError;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
struct ProbeResult {
    at: Instant,
    online: bool,
}

/// Cached "is the network up" check.
#[derive(Debug)]
pub struct ConnectivityProbe {
    client: reqwest::Client,
    url: String,
    ttl: Duration,
    last: Mutex<Option<ProbeResult>>,
}

impl ConnectivityProbe {
    /// Build a probe from configuration.
    pub fn new(config: &ConnectivityConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;
        Ok(Self::with_client(client, config.probe_url.clone(), config.cache_ttl()))
    }

    /// Build a probe around an existing client.
    pub fn with_client(client: reqwest::Client, url: String, ttl: Duration) -> Self {
        Self {
            client,
            url,
            ttl,
            last: Mutex::new(None),
        }
    }

    /// Whether the probe URL answered recently.
    ///
    /// Any HTTP response counts as online; only transport failures count
    /// as offline. Concurrent callers share one in-flight probe.
    pub async fn is_online(&self) -> bool {
        let mut last = self.last.lock().await;
        if let Some(cached) = cached(*last, Instant::now(), self.ttl) {
            return cached;
        }

        let online = match self.client.get(&self.url).send().await {
            Ok(_) => true,
            Err(e) => {
                warn!(probe_url = %self.url, error = %e, "connectivity probe failed");
                false
            }
        };
        if let Some(previous) = *last
            && !previous.online
            && online
        {
            info!(probe_url = %self.url, "connectivity restored");
        }
        *last = Some(ProbeResult {
            at: Instant::now(),
            online,
        });
        online
    }
}

/// A cached result still inside its TTL.
fn cached(last: Option<ProbeResult>, now: Instant, ttl: Duration) -> Option<bool> {
    last.filter(|r| now.saturating_duration_since(r.at) < ttl)
        .map(|r| r.online)
}

/// Wraps a fetcher and short-circuits HTTP fetches while offline.
#[derive(Debug)]
pub struct GatedFetcher<F> {
    inner: F,
    probe: Option<ConnectivityProbe>,
}

impl<F: Fetcher> GatedFetcher<F> {
    /// Gate `inner` behind `probe`.
    pub const fn new(inner: F, probe: ConnectivityProbe) -> Self {
        Self {
            inner,
            probe: Some(probe),
        }
    }

    /// Pass every fetch straight through.
    pub const fn ungated(inner: F) -> Self {
        Self { inner, probe: None }
    }

    /// The wrapped fetcher.
    pub const fn inner(&self) -> &F {
        &self.inner
    }
}

impl<F: Fetcher> Fetcher for GatedFetcher<F> {
    async fn fetch(
        &self,
        locator: &SourceLocator,
        timeout: Duration,
    ) -> Result<FetchedDocument, FetchError> {
        if let Some(probe) = &self.probe
            && locator.kind() == SourceKind::Http
            && !probe.is_online().await
        {
            return Err(FetchError::Offline);
        }
        self.inner.fetch(locator, timeout).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn cache_respects_ttl() {
        let now = Instant::now();
        let fresh = Some(ProbeResult {
            at: now,
            online: false,
        });
        let ttl = Duration::from_secs(30);

        assert_eq!(cached(fresh, now, ttl), Some(false));
        assert_eq!(cached(fresh, now + Duration::from_secs(29), ttl), Some(false));
        assert_eq!(cached(fresh, now + Duration::from_secs(30), ttl), None);
        assert_eq!(cached(None, now, ttl), None);
    }

    #[test]
    fn zero_ttl_never_caches() {
        let now = Instant::now();
        let result = Some(ProbeResult { at: now, online: true });
        assert_eq!(cached(result, now, Duration::ZERO), None);
    }
}
