//! Response building.
//!
//! # Responsibilities
//! - Turn orchestration results into HTTP responses
//! - Record the request outcome metric exactly once per request
//!
//! # Design Decisions
//! - Rejections are `200` with a body describing the detections
//! - Errors use the `{code, details}` body from `OrchestratorError`

use std::time::Instant;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::observability::metrics;
use crate::orchestrator::{Outcome, OrchestratorError};

pub fn orchestration(result: Result<Outcome, OrchestratorError>, start: Instant) -> Response {
    match result {
        Ok(outcome) => {
            metrics::record_request(outcome.label(), start);
            (StatusCode::OK, Json(outcome.into_body())).into_response()
        }
        Err(e) => {
            metrics::record_request(e.outcome(), start);
            e.into_response()
        }
    }
}

/// Liveness body for `GET /health`.
pub fn liveness() -> Value {
    json!({
        "status": "HEALTHY",
        "version": env!("CARGO_PKG_VERSION"),
    })
}
