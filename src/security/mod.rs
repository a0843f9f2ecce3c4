//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request headers
//!     → headers.rs (allow-list filter, computed once per request)
//!     → filtered map reused for every detector and primary dial
//! ```
//!
//! # Design Decisions
//! - Secure by default: an empty allow-list forwards nothing
//! - Credentials such as `Authorization` only travel when configured

pub mod headers;

pub use headers::{apply, PassthroughHeaders};
