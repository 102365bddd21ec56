//! Logging setup.

use doclookout_core::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

use crate::error::DaemonError;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `logging.level`; an unparsable level falls back
/// to `info`.
pub fn init(config: &LoggingConfig) -> Result<(), DaemonError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| DaemonError::Logging {
        message: e.to_string(),
    })
}
