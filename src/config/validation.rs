//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, thresholds, timeouts)
//! - Validate identifiers (header names, chunker ids, detector names)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: OrchestratorConfig → Result<(), Vec<ValidationError>>
//! - TLS profile references are resolved later by the service registry,
//!   which reports the missing profile by name

use std::net::SocketAddr;

use axum::http::HeaderName;

use crate::config::schema::{OrchestratorConfig, ServiceConfig};
use crate::orchestrator::chunker::Chunker;
use crate::upstream::registry::PRIMARY_SERVICE;

/// Headers that describe the inbound connection or body. The orchestrator
/// re-serializes every upstream body, so forwarding these would misframe it.
const FRAMING_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "content-type",
    "content-encoding",
    "transfer-encoding",
    "connection",
    "keep-alive",
    "te",
    "trailer",
    "upgrade",
    "proxy-authorization",
];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending key.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &OrchestratorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (i, name) in config.passthrough_headers.iter().enumerate() {
        match HeaderName::from_bytes(name.as_bytes()) {
            Err(_) => errors.push(ValidationError::new(
                format!("passthrough_headers[{i}]"),
                format!("`{name}` is not a valid header name"),
            )),
            Ok(parsed) if FRAMING_HEADERS.contains(&parsed.as_str()) => {
                errors.push(ValidationError::new(
                    format!("passthrough_headers[{i}]"),
                    format!("`{name}` describes the inbound connection and cannot be forwarded"),
                ))
            }
            Ok(_) => {}
        }
    }

    validate_service("openai.service", &config.openai.service, &mut errors);

    for (name, detector) in &config.detectors {
        let prefix = format!("detectors.{name}");
        if name == PRIMARY_SERVICE {
            errors.push(ValidationError::new(
                &prefix,
                format!("`{PRIMARY_SERVICE}` is reserved for the primary service"),
            ));
        }
        validate_service(&format!("{prefix}.service"), &detector.service, &mut errors);

        let threshold = detector.default_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            errors.push(ValidationError::new(
                format!("{prefix}.default_threshold"),
                format!("{threshold} is outside [0.0, 1.0]"),
            ));
        }
        if Chunker::from_id(&detector.chunker_id).is_none() {
            errors.push(ValidationError::new(
                format!("{prefix}.chunker_id"),
                format!("unknown chunker `{}`", detector.chunker_id),
            ));
        }
    }

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("`{}` is not a socket address", config.server.bind_address),
        ));
    }
    if config.server.max_body_bytes == 0 {
        errors.push(ValidationError::new("server.max_body_bytes", "must be greater than 0"));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be greater than 0"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_service(prefix: &str, service: &ServiceConfig, errors: &mut Vec<ValidationError>) {
    if service.hostname.trim().is_empty() {
        errors.push(ValidationError::new(format!("{prefix}.hostname"), "must not be empty"));
    }
    // u16 already bounds the upper end
    if service.port == 0 {
        errors.push(ValidationError::new(format!("{prefix}.port"), "must be in 1..=65535"));
    }
}
