//! Log notifier and the configured-notifier dispatch enum.

use doclookout_core::config::NotifierConfig;
use doclookout_core::{EmitError, Emitter};
use doclookout_types::{ChangeEvent, Fingerprint};
use tracing::info;

use crate::error::SourceError;
use crate::webhook::WebhookEmitter;

/// Writes every change event as a structured log record.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEmitter;

impl Emitter for LogEmitter {
    async fn emit(&self, event: &ChangeEvent) -> Result<(), EmitError> {
        info!(
            target: "doclookout::changes",
            event_id = %event.event_id,
            document_id = %event.document_id,
            locator = %event.locator,
            previous = event.previous_fingerprint.as_ref().map_or("none", Fingerprint::as_str),
            current = %event.new_fingerprint,
            poll_sequence = event.poll_sequence,
            "document updated"
        );
        Ok(())
    }
}

/// The notifier selected by configuration.
///
/// Enum dispatch keeps the scheduler monomorphic over one emitter type.
#[derive(Debug, Clone)]
pub enum NotifierEmitter {
    /// Discord-style webhook.
    Webhook(WebhookEmitter),
    /// Structured log only.
    Log(LogEmitter),
}

impl NotifierEmitter {
    /// Webhook when a URL is configured, log otherwise.
    pub fn from_config(config: &NotifierConfig) -> Result<Self, SourceError> {
        match config.webhook_url() {
            Some(url) => Ok(Self::Webhook(WebhookEmitter::new(
                url,
                config.role_id().map(ToOwned::to_owned),
                config.timeout(),
            )?)),
            None => Ok(Self::Log(LogEmitter)),
        }
    }

    /// Human-readable name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Webhook(_) => "webhook",
            Self::Log(_) => "log",
        }
    }
}

impl Emitter for NotifierEmitter {
    async fn emit(&self, event: &ChangeEvent) -> Result<(), EmitError> {
        match self {
            Self::Webhook(emitter) => emitter.emit(event).await,
            Self::Log(emitter) => emitter.emit(event).await,
        }
    }
}
