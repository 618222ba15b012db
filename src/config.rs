//! Configuration.
//!
//! Everything has a default, so an empty TOML document is a valid config:
//!
//! ```toml
//! [logging]
//! include_body = true
//! content_types = ["application/json"]
//! redacted_headers = ["authorization", "x-api-key"]
//! max_body_bytes = 51200
//! capture_without_content_type = true
//! print_stacktrace = false
//!
//! [request_id]
//! response_header = "x-request-id"
//! # inbound_chain_header = "x-request-id-chain"
//! max_inbound_len = 32
//!
//! [telemetry]
//! level = "info"
//! format = "json"
//!
//! [server]
//! addr = "0.0.0.0:3000"
//! ```

use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use crate::error::Error;

/// CloudWatch rejects log events above 256 KiB and wraps long lines, which
/// breaks JSON parsing. 50 KiB per body leaves room for escaping, both
/// bodies and the rest of the record.
pub const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub request_id: RequestIdConfig,
    pub telemetry: TelemetryConfig,
    pub server: ServerConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}

/// What the logging filter records.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Capture request and response bodies at all.
    pub include_body: bool,
    /// Media types whose bodies are captured, compared without parameters.
    pub content_types: Vec<String>,
    /// Header names whose values are replaced by `*REDACTED*`.
    pub redacted_headers: Vec<String>,
    /// Bodies longer than this many bytes are cut and marked.
    pub max_body_bytes: usize,
    /// Capture bodies of messages that carry no content type. Those are
    /// often malformed requests, which is exactly when the body helps.
    pub capture_without_content_type: bool,
    /// Print the error chain of failed requests to stderr (local dev).
    pub print_stacktrace: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            include_body: true,
            content_types: vec!["application/json".to_owned()],
            redacted_headers: vec!["authorization".to_owned(), "x-api-key".to_owned()],
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            capture_without_content_type: true,
            print_stacktrace: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RequestIdConfig {
    /// Response header carrying the current request id.
    pub response_header: String,
    /// Inbound header whose comma-separated chain is trusted and extended.
    /// Leave unset unless every client that can reach the service is trusted.
    pub inbound_chain_header: Option<String>,
    /// Longest inbound chain accepted; older entries are dropped.
    pub max_inbound_len: usize,
}

impl Default for RequestIdConfig {
    fn default() -> Self {
        Self {
            response_header: "x-request-id".to_owned(),
            inbound_chain_header: None,
            max_inbound_len: 32,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { level: "info".to_owned(), format: LogFormat::Json }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: SocketAddr::from(([0, 0, 0, 0], 3000)) }
    }
}
