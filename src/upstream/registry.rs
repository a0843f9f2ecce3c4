//! Upstream service registry.
//!
//! # Responsibilities
//! - Store the primary service and the detector chain
//! - Look up a service descriptor by name
//! - Check every TLS profile reference at load time
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Detector chain keeps configuration order (ordered map → deterministic)
//! - Explicit error for unknown names rather than a silent default

use url::Url;

use crate::config::{ConfigError, DetectorType, OrchestratorConfig, ServiceConfig};
use crate::net::TlsProfileStore;
use crate::orchestrator::chunker::Chunker;

/// Well-known name of the primary chat-completions service.
pub const PRIMARY_SERVICE: &str = "openai";

/// Where and how to reach one upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub tls_profile: Option<String>,
}

impl ServiceDescriptor {
    fn from_config(name: &str, cfg: &ServiceConfig) -> Self {
        Self {
            name: name.to_string(),
            hostname: cfg.hostname.trim().to_string(),
            port: cfg.port,
            tls_profile: cfg.tls.clone(),
        }
    }

    /// `https` when a TLS profile is referenced, `http` otherwise.
    pub fn scheme(&self) -> &'static str {
        if self.tls_profile.is_some() {
            "https"
        } else {
            "http"
        }
    }

    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!("{}://{}:{}/", self.scheme(), self.hostname, self.port))
    }
}

/// A detector service plus its screening parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorEntry {
    pub service: ServiceDescriptor,
    pub detector_type: DetectorType,
    pub chunker: Chunker,
    pub default_threshold: f64,
}

impl DetectorEntry {
    pub fn name(&self) -> &str {
        &self.service.name
    }
}

/// Read-only registry of every upstream the orchestrator may dial.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRegistry {
    primary: ServiceDescriptor,
    detectors: Vec<DetectorEntry>,
}

impl ServiceRegistry {
    /// Build the registry, failing on the first unresolvable TLS reference.
    pub fn from_config(
        config: &OrchestratorConfig,
        profiles: &TlsProfileStore,
    ) -> Result<Self, ConfigError> {
        let primary = ServiceDescriptor::from_config(PRIMARY_SERVICE, &config.openai.service);
        check_tls_reference(&primary, profiles)?;

        let mut detectors = Vec::with_capacity(config.detectors.len());
        for (name, cfg) in &config.detectors {
            let service = ServiceDescriptor::from_config(name, &cfg.service);
            check_tls_reference(&service, profiles)?;
            let chunker = Chunker::from_id(&cfg.chunker_id).ok_or_else(|| {
                ConfigError::Validation(vec![crate::config::validation::ValidationError {
                    field: format!("detectors.{name}.chunker_id"),
                    message: format!("unknown chunker `{}`", cfg.chunker_id),
                }])
            })?;
            detectors.push(DetectorEntry {
                service,
                detector_type: cfg.detector_type,
                chunker,
                default_threshold: cfg.default_threshold,
            });
        }

        Ok(Self { primary, detectors })
    }

    pub fn primary(&self) -> &ServiceDescriptor {
        &self.primary
    }

    /// Detector chain in configuration order.
    pub fn detectors(&self) -> &[DetectorEntry] {
        &self.detectors
    }

    pub fn detector(&self, name: &str) -> Option<&DetectorEntry> {
        self.detectors.iter().find(|d| d.name() == name)
    }

    /// Look up any service (primary or detector) by name.
    pub fn lookup(&self, name: &str) -> Result<&ServiceDescriptor, ConfigError> {
        if name == PRIMARY_SERVICE {
            return Ok(&self.primary);
        }
        self.detector(name)
            .map(|d| &d.service)
            .ok_or_else(|| ConfigError::UnknownService {
                name: name.to_string(),
            })
    }

    /// Primary first, then detectors.
    pub fn services(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        std::iter::once(&self.primary).chain(self.detectors.iter().map(|d| &d.service))
    }
}

fn check_tls_reference(
    service: &ServiceDescriptor,
    profiles: &TlsProfileStore,
) -> Result<(), ConfigError> {
    match &service.tls_profile {
        Some(name) if !profiles.contains(name) => {
            tracing::error!(service = %service.name, profile = %name, "Service references unknown TLS profile");
            Err(ConfigError::UnknownTlsProfile { name: name.clone() })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    const YAML: &str = r#"
openai:
  service:
    hostname: api.openai.com
    port: 443
    tls: external_llm
detectors:
  pii:
    service: { hostname: pii, port: 8001 }
    chunker_id: sentence_chunker
    default_threshold: 0.8
  hap:
    service: { hostname: hap, port: 8000 }
    default_threshold: 0.5
tls:
  external_llm:
    insecure: true
    cert_path: /dev/null
"#;

    fn registry(yaml: &str) -> Result<ServiceRegistry, ConfigError> {
        let config = parse_config(yaml).unwrap();
        let profiles = TlsProfileStore::from_config(&config.tls);
        ServiceRegistry::from_config(&config, &profiles)
    }

    #[test]
    fn builds_primary_and_ordered_chain() {
        let registry = registry(YAML).unwrap();
        assert_eq!(registry.primary().name, PRIMARY_SERVICE);
        assert_eq!(registry.primary().tls_profile.as_deref(), Some("external_llm"));

        let names: Vec<_> = registry.detectors().iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["hap", "pii"]);
        assert_eq!(registry.detector("pii").unwrap().chunker, Chunker::Sentence);
    }

    #[test]
    fn base_url_follows_tls_reference() {
        let registry = registry(YAML).unwrap();
        // default port is elided by the URL parser
        assert_eq!(
            registry.primary().base_url().unwrap().as_str(),
            "https://api.openai.com/"
        );
        assert_eq!(
            registry.lookup("hap").unwrap().base_url().unwrap().as_str(),
            "http://hap:8000/"
        );
    }

    #[test]
    fn lookup_unknown_service_fails() {
        let registry = registry(YAML).unwrap();
        assert!(registry.lookup("openai").is_ok());
        assert!(matches!(
            registry.lookup("toxicity"),
            Err(ConfigError::UnknownService { ref name }) if name == "toxicity"
        ));
    }

    #[test]
    fn unknown_tls_reference_fails_fast() {
        let yaml = YAML.replace("tls: external_llm", "tls: missing_profile");
        let err = registry(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTlsProfile { ref name } if name == "missing_profile"));
        assert!(err.to_string().contains("missing_profile"));
    }

    #[test]
    fn same_config_builds_same_registry() {
        assert_eq!(registry(YAML).unwrap(), registry(YAML).unwrap());
    }
}
