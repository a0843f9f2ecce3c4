//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, HTTPS when configured)
//!     → request.rs (request ID assigned and recorded on the span)
//!     → orchestrator (screen, forward, annotate)
//!     → response.rs (outcome → status + JSON body, metrics)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer, CHAT_DETECTION_PATH};
