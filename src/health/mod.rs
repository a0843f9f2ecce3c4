//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! GET /info
//!     → probe.rs probes GET /health on every upstream concurrently
//!     → per-service status + orchestrator_service_health gauge
//! ```
//!
//! # Design Decisions
//! - Probes run on demand, no background polling
//! - Each probe is bounded by the connect timeout
//! - An unreachable service is UNKNOWN; a non-2xx answer is UNHEALTHY

pub mod probe;

pub use probe::{probe_all, HealthStatus, InfoReport, ServiceHealth};
