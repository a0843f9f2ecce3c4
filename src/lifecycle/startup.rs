//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn a validated configuration into a ready `Orchestrator`
//! - Resolve TLS profiles and build upstream clients before traffic arrives
//!
//! # Design Decisions
//! - Fail fast: any error here is fatal at startup
//! - Subsystems initialize in order, not concurrently
//! - The same path rebuilds state on hot reload, where errors keep the old state

use crate::config::validation::ValidationError;
use crate::config::{ConfigError, OrchestratorConfig};
use crate::net::tls::load_listener_tls;
use crate::net::TlsProfileStore;
use crate::orchestrator::Orchestrator;
use crate::security::PassthroughHeaders;
use crate::upstream::{ServiceRegistry, UpstreamClients};

/// Build the TLS store, registry, clients and header filter, in that order.
pub fn build_orchestrator(config: &OrchestratorConfig) -> Result<Orchestrator, ConfigError> {
    let profiles = TlsProfileStore::from_config(&config.tls);
    let registry = ServiceRegistry::from_config(config, &profiles)?;
    let clients = UpstreamClients::build(&registry, &profiles, &config.timeouts)?;
    let passthrough = PassthroughHeaders::from_names(&config.passthrough_headers).map_err(|e| {
        ConfigError::Validation(vec![ValidationError {
            field: "passthrough_headers".to_string(),
            message: e.to_string(),
        }])
    })?;

    tracing::info!(
        primary = %registry.primary().hostname,
        detectors = registry.detectors().len(),
        tls_profiles = profiles.names().count(),
        passthrough_headers = passthrough.iter().count(),
        "Orchestrator initialized"
    );
    Ok(Orchestrator::new(registry, clients, passthrough))
}

/// Everything `--check` and startup must prove before binding: the
/// orchestrator builds and the listener certificate pair loads.
pub async fn preflight(config: &OrchestratorConfig) -> Result<Orchestrator, ConfigError> {
    let orchestrator = build_orchestrator(config)?;
    if let Some(tls) = &config.server.tls {
        load_listener_tls(tls).await?;
    }
    Ok(orchestrator)
}
