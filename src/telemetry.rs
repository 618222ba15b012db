//! Installs the global `tracing` subscriber.
//!
//! Events emitted inside a request carry the `request` span and with it the
//! `request_id` field, so every line an application logs while handling a
//! request can be joined with that request's record.

use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, TelemetryConfig};
use crate::error::Error;

/// Installs a `fmt` subscriber for the whole process.
///
/// `RUST_LOG` wins over `config.level` when set. Fails if the directive
/// does not parse or a global subscriber is already installed.
pub fn init(config: &TelemetryConfig) -> Result<(), Error> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| Error::Telemetry(format!("invalid level `{}`: {e}", config.level)))?,
    };

    let builder = fmt().with_env_filter(filter).with_target(true);
    let installed = match config.format {
        LogFormat::Json   => builder.json().with_current_span(true).try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    installed.map_err(|e| Error::Telemetry(e.to_string()))
}
