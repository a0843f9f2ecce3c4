//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the orchestrator.
//! All types derive Serde traits for deserialization from the YAML config file
//! (typically mounted from a ConfigMap).

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Well-known chunker that treats the whole text as one chunk.
pub const DEFAULT_CHUNKER_ID: &str = "whole_doc_chunker";

/// Root configuration for the orchestrator.
///
/// Detector and TLS maps are ordered so that loading the same file twice
/// yields identical contents.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    /// Inbound header names forwarded to upstream services (case-insensitive).
    #[serde(default)]
    pub passthrough_headers: Vec<String>,

    /// Primary chat-completions service.
    pub openai: OpenAiConfig,

    /// Detector services keyed by detector name.
    #[serde(default)]
    pub detectors: BTreeMap<String, DetectorConfig>,

    /// Named TLS profiles referenced by services.
    #[serde(default)]
    pub tls: BTreeMap<String, TlsProfileConfig>,

    /// Listener configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream timeouts.
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// The `openai` section.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OpenAiConfig {
    pub service: ServiceConfig,
}

/// Network location of an upstream service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub hostname: String,

    pub port: u16,

    /// Name of a profile under `tls`. Plaintext when absent.
    #[serde(default)]
    pub tls: Option<String>,
}

/// Detector API flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorType {
    /// `POST /api/v1/text/contents`, scores chunks of text.
    #[default]
    TextContents,
    /// `POST /api/v1/text/chat`, scores a whole conversation.
    TextChat,
}

impl std::fmt::Display for DetectorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectorType::TextContents => write!(f, "text_contents"),
            DetectorType::TextChat => write!(f, "text_chat"),
        }
    }
}

/// One entry under `detectors`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DetectorConfig {
    #[serde(rename = "type", default)]
    pub detector_type: DetectorType,

    pub service: ServiceConfig,

    #[serde(default = "default_chunker_id")]
    pub chunker_id: String,

    /// Scores at or above this value reject the request.
    pub default_threshold: f64,
}

fn default_chunker_id() -> String {
    DEFAULT_CHUNKER_ID.to_string()
}

/// One entry under `tls`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TlsProfileConfig {
    /// Skip certificate verification. No file of the profile is read.
    #[serde(default)]
    pub insecure: bool,

    /// Client certificate (PEM). Always required by the schema, may be a
    /// sentinel such as `/dev/null` for insecure profiles.
    pub cert_path: PathBuf,

    /// Client private key (PEM). Required unless insecure.
    #[serde(default)]
    pub key_path: Option<PathBuf>,

    /// CA bundle used as the only trust roots. Required unless insecure.
    #[serde(default)]
    pub client_ca_cert_path: Option<PathBuf>,
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8033").
    pub bind_address: String,

    /// Serve HTTPS when present.
    pub tls: Option<ListenerTlsConfig>,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,

    /// Deadline for a whole client request, including every upstream call.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8033".to_string(),
            tls: None,
            max_body_bytes: 2 * 1024 * 1024,
            request_timeout_secs: 180,
        }
    }
}

/// Certificate and key for the HTTPS listener.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ListenerTlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Timeouts applied to every upstream client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment (including TLS handshake) in seconds.
    pub connect_secs: u64,

    /// Total time for one upstream request/response in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 60,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
