//! Mapping of job errors onto admin API responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::kernel::jobs::JobError;

/// Wrapper so route handlers can use `?` on store operations.
pub struct ApiError(pub JobError);

impl From<JobError> for ApiError {
    fn from(error: JobError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            JobError::JobNotFound(_) | JobError::ScheduleNotFound(_) => StatusCode::NOT_FOUND,
            JobError::NotCancelable { .. }
            | JobError::NotRetryable { .. }
            | JobError::DuplicateIdempotencyKey(_)
            | JobError::DuplicateScheduleName(_) => StatusCode::CONFLICT,
            JobError::UnknownJobType(_)
            | JobError::Validation(_)
            | JobError::InvalidCron { .. } => StatusCode::BAD_REQUEST,
            JobError::Database(e) => {
                error!(error = %e, "admin API database error");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response();
            }
        };

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// 400 with a message, for request-shape problems caught before the store.
pub fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.into() })),
    )
        .into_response()
}
