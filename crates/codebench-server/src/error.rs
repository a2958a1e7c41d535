use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use codebench_scheduler::ClaimStoreError;
use serde::Serialize;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Conflict(String),
    NotFound(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        if status.is_server_error() {
            tracing::error!("{}", message);
        }
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ClaimStoreError> for AppError {
    fn from(e: ClaimStoreError) -> Self {
        AppError::Internal(e.to_string())
    }
}
