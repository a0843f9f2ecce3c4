//! Guardrails Orchestrator Library
//!
//! Screens chat-completion traffic through configured detector services
//! before and after forwarding it to a primary LLM service, dialing each
//! upstream with its own TLS policy.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod orchestrator;
pub mod upstream;

// Cross-cutting concerns
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::OrchestratorConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use orchestrator::Orchestrator;
