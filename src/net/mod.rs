//! Transport security subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream side:
//!     tls: { name: profile } in config
//!     → profiles.rs (TlsProfileStore::resolve)
//!     → TlsClientPolicy (insecure | verified identity + CA roots)
//!     → upstream::client builds one reqwest client per service
//!
//! Client side:
//!     server.tls in config
//!     → tls.rs (RustlsConfig for the HTTPS listener)
//! ```
//!
//! # Design Decisions
//! - Profiles resolve once at startup; a broken profile prevents readiness
//! - No fallback between profiles: a failed handshake is an upstream error

pub mod profiles;
pub mod tls;

pub use profiles::{TlsClientPolicy, TlsProfile, TlsProfileStore};
