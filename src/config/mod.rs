//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (YAML, usually a mounted ConfigMap)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → OrchestratorConfig (validated, immutable)
//!     → lifecycle::startup builds the TLS store, registry and clients
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → HttpServer rebuilds state and swaps it atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - Ambient sections have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use error::ConfigError;
pub use loader::{load_config, parse_config, ConfigOverrides};
pub use schema::{
    DetectorConfig, DetectorType, ListenerTlsConfig, ObservabilityConfig, OrchestratorConfig,
    ServerConfig, ServiceConfig, TimeoutConfig, TlsProfileConfig,
};
