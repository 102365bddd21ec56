//! Discord-style webhook notifier.
//!
//! Each change event becomes one `POST` with a JSON body:
//!
//! ```json
//! {
//!   "content": "<@&ROLE_ID>",
//!   "tts": false,
//!   "embeds": [{
//!     "title": "Document Updated!",
//!     "color": 10088191,
//!     "description": "The following document has been updated:\n - <locator>\n...",
//!     "timestamp": "<detected_at>"
//!   }]
//! }
//! ```
//!
//! `content` is empty when no role is configured.

use std::time::Duration;

use doclookout_core::{EmitError, Emitter};
use doclookout_types::ChangeEvent;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::SourceError;

/// Embed accent colour.
pub const EMBED_COLOR: u32 = 0x0099_EEFF;

/// Longest error body kept in [`EmitError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Posts change events to a webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookEmitter {
    client: reqwest::Client,
    url: String,
    role_id: Option<String>,
}

impl WebhookEmitter {
    /// Build an emitter with its own client; requests give up after
    /// `timeout`.
    pub fn new(
        url: impl Into<String>,
        role_id: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, url, role_id))
    }

    /// Build around an existing client.
    pub fn with_client(
        client: reqwest::Client,
        url: impl Into<String>,
        role_id: Option<String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            role_id,
        }
    }
}

impl Emitter for WebhookEmitter {
    async fn emit(&self, event: &ChangeEvent) -> Result<(), EmitError> {
        let payload = build_payload(event, self.role_id.as_deref());

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| EmitError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(EmitError::Status {
                status: status.as_u16(),
                body: truncate(body, MAX_ERROR_BODY),
            });
        }

        debug!(
            document_id = %event.document_id,
            event_id = %event.event_id,
            status = status.as_u16(),
            "webhook accepted change event"
        );
        Ok(())
    }
}

/// Build the webhook body for `event`.
pub fn build_payload(event: &ChangeEvent, role_id: Option<&str>) -> Value {
    let content = role_id
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map_or_else(String::new, |r| format!("<@&{r}>"));

    let previous = event
        .previous_fingerprint
        .as_ref()
        .map_or_else(|| "none (first observation)".to_owned(), |f| format!("`{f}`"));
    let description = format!(
        "The following document has been updated:\n - {}\n\nPrevious: {}\nCurrent: `{}`",
        event.locator, previous, event.new_fingerprint
    );

    json!({
        "content": content,
        "tts": false,
        "embeds": [{
            "title": "Document Updated!",
            "color": EMBED_COLOR,
            "description": description,
            "timestamp": event.detected_at.to_rfc3339(),
        }]
    })
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut cut = max;
        while !body.is_char_boundary(cut) {
            cut = cut.saturating_sub(1);
        }
        body.truncate(cut);
    }
    body
}
