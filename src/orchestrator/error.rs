//! Request-level errors and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::upstream::UpstreamError;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("expected `Content-Type: application/json`, got {0}")]
    UnsupportedMediaType(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("detector `{0}` is not configured")]
    DetectorNotFound(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub details: String,
}

impl OrchestratorError {
    pub fn status(&self) -> StatusCode {
        match self {
            OrchestratorError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            OrchestratorError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            OrchestratorError::DetectorNotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::Upstream(UpstreamError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            OrchestratorError::Upstream(_) => StatusCode::BAD_GATEWAY,
            OrchestratorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label for the `outcome` metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            OrchestratorError::UnsupportedMediaType(_)
            | OrchestratorError::InvalidRequest(_)
            | OrchestratorError::DetectorNotFound(_) => "client_error",
            OrchestratorError::Upstream(_) => "upstream_error",
            OrchestratorError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            code: status.as_u16(),
            details: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(
            OrchestratorError::UnsupportedMediaType("text/plain".into()).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            OrchestratorError::InvalidRequest("missing".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            OrchestratorError::DetectorNotFound("pii".into()).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn upstream_errors_name_the_service() {
        let refused = OrchestratorError::from(UpstreamError::Connect {
            service: "openai".into(),
            detail: "connection refused".into(),
        });
        assert_eq!(refused.status(), StatusCode::BAD_GATEWAY);
        assert!(refused.to_string().contains("openai"));

        let timeout = OrchestratorError::from(UpstreamError::Timeout {
            service: "hap".into(),
        });
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn upstream_status_becomes_bad_gateway() {
        // An upstream 4xx must not look like a malformed inbound request.
        let err = OrchestratorError::from(UpstreamError::Status {
            service: "hap".into(),
            status: StatusCode::NOT_FOUND,
            message: "model not loaded".into(),
        });
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.outcome(), "upstream_error");
        let details = err.to_string();
        assert!(details.contains("404"), "{details}");
        assert!(details.contains("model not loaded"), "{details}");
    }
}
