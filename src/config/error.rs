//! Configuration errors.
//!
//! Every variant is fatal at startup. During hot reload the running
//! configuration is kept and the error is logged.

use std::path::PathBuf;

use crate::config::validation::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("unknown TLS profile `{name}`")]
    UnknownTlsProfile { name: String },

    #[error("unknown service `{name}`")]
    UnknownService { name: String },

    #[error("TLS profile `{profile}`: `{field}` is required when insecure is false")]
    MissingTlsField {
        profile: String,
        field: &'static str,
    },

    #[error("TLS profile `{profile}`: {field} {path} is not readable: {source}")]
    UnreadableTlsFile {
        profile: String,
        field: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS profile `{profile}`: {field} {path} contains no PEM {expected}")]
    InvalidPem {
        profile: String,
        field: &'static str,
        path: PathBuf,
        expected: &'static str,
    },

    #[error("failed to build client for service `{service}`: {source}")]
    Client {
        service: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("listener TLS: {0}")]
    ListenerTls(#[source] std::io::Error),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
