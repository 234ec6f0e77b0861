//! HTTP mapping for [`ExecutionError`].

use axum::extract::rejection::QueryRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::ExecutionError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

impl ExecutionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ExecutionError::NotFound(_) => StatusCode::NOT_FOUND,
            ExecutionError::DuplicateId(_) | ExecutionError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            ExecutionError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ExecutionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ExecutionError::NotFound(_) => "not_found",
            ExecutionError::DuplicateId(_) => "duplicate_id",
            ExecutionError::InvalidTransition { .. } => "invalid_transition",
            ExecutionError::InvalidRequest(_) => "invalid_argument",
            ExecutionError::Internal(_) => "internal",
        }
    }
}

impl From<QueryRejection> for ExecutionError {
    fn from(rejection: QueryRejection) -> Self {
        ExecutionError::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for ExecutionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = ErrorEnvelope {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionStatus;

    #[test]
    fn status_codes() {
        assert_eq!(
            ExecutionError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ExecutionError::DuplicateId("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ExecutionError::InvalidTransition {
                id: "x".into(),
                from: ExecutionStatus::Completed,
                to: ExecutionStatus::Queued,
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ExecutionError::InvalidRequest("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ExecutionError::Internal("oops".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
