//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber from the `observability` config
//! - Let `RUST_LOG` override the configured level
//!
//! # Design Decisions
//! - JSON format for production, pretty format for development
//! - A CLI level beats the config file; `RUST_LOG` beats both

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::schema::{LogFormat, ObservabilityConfig};

/// Noise from the HTTP stack is capped unless asked for explicitly.
const DEPENDENCY_FILTERS: &str = "hyper=warn,rustls=warn,reqwest=warn";

/// Build the filter directive string for a base level.
pub fn filter_directives(level: &str) -> String {
    format!("{level},{DEPENDENCY_FILTERS}")
}

/// Install the global subscriber. Fails if the filter is invalid or a
/// subscriber is already set.
pub fn init_logging(
    config: &ObservabilityConfig,
    level_override: Option<&str>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let level = level_override.unwrap_or(&config.log_level);
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directives(level))?,
    };

    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::debug!(level = %level, format = ?config.log_format, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_parse() {
        for level in ["info", "debug", "guardrails_orchestrator=trace"] {
            assert!(EnvFilter::try_new(filter_directives(level)).is_ok());
        }
    }
}
