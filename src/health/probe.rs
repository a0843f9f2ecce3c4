//! Upstream health probing.
//!
//! # Responsibilities
//! - Probe `GET /health` on the primary and every detector
//! - Report each service's status for `/info`
//! - Record the per-service health gauge

use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;

use crate::observability::metrics;
use crate::upstream::{UpstreamClient, UpstreamClients, UpstreamError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    /// The service could not be reached at all.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfoReport {
    pub services: BTreeMap<String, ServiceHealth>,
}

/// Probe every upstream concurrently.
pub async fn probe_all(clients: &UpstreamClients, timeout: Duration) -> InfoReport {
    let probes = clients.all().map(|client| probe(client, timeout));
    let services = join_all(probes).await.into_iter().collect();
    InfoReport { services }
}

async fn probe(client: &UpstreamClient, timeout: Duration) -> (String, ServiceHealth) {
    let health = match client.health(timeout).await {
        Ok(status) if status.is_success() => ServiceHealth {
            status: HealthStatus::Healthy,
            code: Some(status.as_u16()),
            message: None,
        },
        Ok(status) => {
            tracing::warn!(service = %client.name(), status = %status, "Health check failed: non-success status");
            ServiceHealth {
                status: HealthStatus::Unhealthy,
                code: Some(status.as_u16()),
                message: None,
            }
        }
        Err(e) => {
            tracing::warn!(service = %client.name(), error = %e, "Health check failed");
            let status = match e {
                UpstreamError::Connect { .. } | UpstreamError::Timeout { .. } => HealthStatus::Unknown,
                _ => HealthStatus::Unhealthy,
            };
            ServiceHealth {
                status,
                code: None,
                message: Some(e.to_string()),
            }
        }
    };
    metrics::record_service_health(client.name(), health.status == HealthStatus::Healthy);
    (client.name().to_string(), health)
}
