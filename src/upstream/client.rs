//! HTTP clients for upstream services.
//!
//! # Responsibilities
//! - Build one reqwest client per service from its resolved TLS policy
//! - Send JSON requests with the filtered inbound headers
//! - Classify failures (connect/TLS, timeout, HTTP status, bad body)
//!
//! # Design Decisions
//! - Clients are built once per configuration and shared via `Arc`
//! - No retries: every failure surfaces to the caller as-is
//! - Connect and request timeouts come from `timeouts` in config

use std::collections::{BTreeMap, HashMap};
use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::config::{ConfigError, TimeoutConfig};
use crate::config::validation::ValidationError;
use crate::net::{TlsClientPolicy, TlsProfileStore};
use crate::observability::metrics;
use crate::upstream::registry::{ServiceDescriptor, ServiceRegistry};

/// Failure talking to a configured upstream.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("service `{service}` is unreachable: {detail}")]
    Connect { service: String, detail: String },

    #[error("service `{service}` timed out")]
    Timeout { service: String },

    #[error("service `{service}` returned {status}: {message}")]
    Status {
        service: String,
        status: StatusCode,
        message: String,
    },

    #[error("service `{service}` sent an invalid response: {message}")]
    Decode { service: String, message: String },

    #[error("request to service `{service}` failed: {detail}")]
    Request { service: String, detail: String },
}

impl UpstreamError {
    pub fn service(&self) -> &str {
        match self {
            UpstreamError::Connect { service, .. }
            | UpstreamError::Timeout { service }
            | UpstreamError::Status { service, .. }
            | UpstreamError::Decode { service, .. }
            | UpstreamError::Request { service, .. } => service,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            UpstreamError::Connect { .. } => "connect_error",
            UpstreamError::Timeout { .. } => "timeout",
            UpstreamError::Status { .. } => "status_error",
            UpstreamError::Decode { .. } => "decode_error",
            UpstreamError::Request { .. } => "request_error",
        }
    }

    fn from_reqwest(service: &str, err: reqwest::Error) -> Self {
        let service = service.to_string();
        if err.is_timeout() {
            UpstreamError::Timeout { service }
        } else if err.is_connect() {
            UpstreamError::Connect {
                service,
                detail: error_chain(&err),
            }
        } else if err.is_decode() {
            UpstreamError::Decode {
                service,
                message: error_chain(&err),
            }
        } else {
            UpstreamError::Request {
                service,
                detail: error_chain(&err),
            }
        }
    }
}

/// Flatten an error and its sources; the root cause of a refused
/// connection or failed handshake sits at the bottom of the chain.
fn error_chain(err: &reqwest::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}

/// A client bound to one upstream service.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    name: Arc<str>,
    base_url: Url,
    http: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(
        service: &ServiceDescriptor,
        policy: Option<&TlsClientPolicy>,
        timeouts: &TimeoutConfig,
    ) -> Result<Self, ConfigError> {
        let client_error = |source| ConfigError::Client {
            service: service.name.clone(),
            source,
        };

        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .timeout(Duration::from_secs(timeouts.request_secs));
        if let Some(policy) = policy {
            builder = policy.configure(builder).map_err(client_error)?;
        }
        let http = builder.build().map_err(client_error)?;

        let base_url = service.base_url().map_err(|e| {
            ConfigError::Validation(vec![ValidationError {
                field: format!("{}.service.hostname", service.name),
                message: format!("`{}` does not form a valid URL: {e}", service.hostname),
            }])
        })?;

        Ok(Self {
            name: Arc::from(service.name.as_str()),
            base_url,
            http,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, UpstreamError> {
        self.base_url.join(path).map_err(|e| UpstreamError::Request {
            service: self.name.to_string(),
            detail: format!("invalid path `{path}`: {e}"),
        })
    }

    /// POST a JSON body and decode a JSON response.
    pub async fn post_json<B, R>(
        &self,
        path: &str,
        headers: HeaderMap,
        body: &B,
    ) -> Result<R, UpstreamError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let result = self.send_json(path, headers, body).await;
        match &result {
            Ok(_) => metrics::record_upstream(&self.name, "success"),
            Err(e) => {
                tracing::warn!(service = %self.name, error = %e, "Upstream call failed");
                metrics::record_upstream(&self.name, e.outcome());
            }
        }
        result
    }

    async fn send_json<B, R>(&self, path: &str, headers: HeaderMap, body: &B) -> Result<R, UpstreamError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(path)?;
        tracing::debug!(service = %self.name, url = %url, "Calling upstream");

        let response = self
            .http
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(&self.name, e))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::from_reqwest(&self.name, e))?;

        if !status.is_success() {
            return Err(UpstreamError::Status {
                service: self.name.to_string(),
                status,
                message: error_message(status, &bytes),
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Decode {
            service: self.name.to_string(),
            message: e.to_string(),
        })
    }

    /// Probe `GET /health`.
    pub async fn health(&self, timeout: Duration) -> Result<StatusCode, UpstreamError> {
        let url = self.url("/health")?;
        self.http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map(|r| r.status())
            .map_err(|e| UpstreamError::from_reqwest(&self.name, e))
    }
}

/// Best-effort human message from an upstream error body.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        let candidates = [
            value.pointer("/error/message"),
            value.get("message"),
            value.get("details"),
            value.get("detail"),
        ];
        if let Some(message) = candidates.into_iter().flatten().find_map(|v| v.as_str()) {
            return message.to_string();
        }
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        status.canonical_reason().unwrap_or("upstream error").to_string()
    } else {
        text.chars().take(512).collect()
    }
}

/// Every upstream client for one configuration.
#[derive(Debug, Clone)]
pub struct UpstreamClients {
    primary: UpstreamClient,
    detectors: BTreeMap<String, UpstreamClient>,
}

impl UpstreamClients {
    /// Resolve each referenced TLS profile once and build a client per service.
    pub fn build(
        registry: &ServiceRegistry,
        profiles: &TlsProfileStore,
        timeouts: &TimeoutConfig,
    ) -> Result<Self, ConfigError> {
        let mut policies: HashMap<&str, TlsClientPolicy> = HashMap::new();
        for service in registry.services() {
            if let Some(name) = service.tls_profile.as_deref() {
                if !policies.contains_key(name) {
                    policies.insert(name, profiles.resolve(name)?);
                }
            }
        }
        for unused in profiles.names().filter(|n| !policies.contains_key(n)) {
            tracing::warn!(profile = %unused, "TLS profile is not referenced by any service");
        }

        let client_for = |service: &ServiceDescriptor| {
            let policy = service
                .tls_profile
                .as_deref()
                .and_then(|name| policies.get(name));
            UpstreamClient::new(service, policy, timeouts)
        };

        let primary = client_for(registry.primary())?;
        let mut detectors = BTreeMap::new();
        for entry in registry.detectors() {
            detectors.insert(entry.name().to_string(), client_for(&entry.service)?);
        }
        Ok(Self { primary, detectors })
    }

    pub fn primary(&self) -> &UpstreamClient {
        &self.primary
    }

    pub fn detector(&self, name: &str) -> Option<&UpstreamClient> {
        self.detectors.get(name)
    }

    /// Primary first, then detectors by name.
    pub fn all(&self) -> impl Iterator<Item = &UpstreamClient> {
        std::iter::once(&self.primary).chain(self.detectors.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn clients(yaml: &str) -> Result<UpstreamClients, ConfigError> {
        let config = parse_config(yaml).unwrap();
        let profiles = TlsProfileStore::from_config(&config.tls);
        let registry = ServiceRegistry::from_config(&config, &profiles)?;
        UpstreamClients::build(&registry, &profiles, &config.timeouts)
    }

    #[test]
    fn builds_insecure_and_plain_clients() {
        let clients = clients(
            r#"
openai:
  service: { hostname: api.openai.com, port: 443, tls: external_llm }
detectors:
  hap:
    service: { hostname: hap, port: 8000 }
    default_threshold: 0.5
tls:
  external_llm: { insecure: true, cert_path: /dev/null }
"#,
        )
        .unwrap();
        assert_eq!(clients.primary().base_url().scheme(), "https");
        assert_eq!(clients.detector("hap").unwrap().base_url().scheme(), "http");
        assert_eq!(clients.all().count(), 2);
    }

    #[test]
    fn unreadable_verified_profile_prevents_build() {
        let err = clients(
            r#"
openai:
  service: { hostname: llm, port: 8443, tls: strict }
tls:
  strict:
    cert_path: /missing/tls.crt
    key_path: /missing/tls.key
    client_ca_cert_path: /missing/ca.crt
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnreadableTlsFile { field: "cert_path", .. }));
    }

    #[test]
    fn unreferenced_profiles_are_not_resolved() {
        let result = clients(
            r#"
openai:
  service: { hostname: llm, port: 8080 }
tls:
  strict:
    cert_path: /missing/tls.crt
"#,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn extracts_error_messages() {
        let openai = br#"{"error":{"message":"Incorrect API key provided"}}"#;
        assert_eq!(
            error_message(StatusCode::UNAUTHORIZED, openai),
            "Incorrect API key provided"
        );
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, br#"{"code":400,"message":"bad"}"#),
            "bad"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, b"  "), "Bad Gateway");
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, b"oops"), "oops");
    }

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let service = ServiceDescriptor {
            name: "hap".into(),
            hostname: "127.0.0.1".into(),
            port,
            tls_profile: None,
        };
        let client = UpstreamClient::new(&service, None, &TimeoutConfig::default()).unwrap();
        let err = client
            .post_json::<_, serde_json::Value>("/api/v1/text/contents", HeaderMap::new(), &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Connect { ref service, .. } if service == "hap"), "{err}");
    }
}
