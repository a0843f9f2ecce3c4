//! Upstream services subsystem.
//!
//! # Data Flow
//! ```text
//! OrchestratorConfig + TlsProfileStore
//!     → registry.rs (ServiceRegistry: primary + detector chain)
//!     → client.rs (one reqwest client per service, TLS policy applied)
//!     → detector.rs / openai.rs (wire formats)
//! ```
//!
//! # Design Decisions
//! - Registry and clients are read-only after load and shared across requests
//! - A missing TLS profile reference stops startup, never a request
//! - Plaintext unless the service names a TLS profile

pub mod client;
pub mod detector;
pub mod openai;
pub mod registry;

pub use client::{UpstreamClient, UpstreamClients, UpstreamError};
pub use registry::{DetectorEntry, ServiceDescriptor, ServiceRegistry, PRIMARY_SERVICE};
