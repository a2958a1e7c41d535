use std::sync::Arc;

use axum::{extract::State, Json};

use crate::dto::{ClaimRequest, ClaimResponse, CleanupRequest, CleanupResponse};
use crate::error::AppError;
use crate::state::AppState;

pub async fn claim(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>, AppError> {
    if req.model_id.trim().is_empty() {
        return Err(AppError::BadRequest("modelId is required".into()));
    }
    let claimed = state.claims.claim(&req.model_id, req.scheduled_minute).await?;
    Ok(Json(ClaimResponse { claimed }))
}

pub async fn cleanup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CleanupRequest>,
) -> Result<Json<CleanupResponse>, AppError> {
    let removed = state.claims.cleanup(req.older_than_minute).await?;
    Ok(Json(CleanupResponse { status: "ok", removed }))
}
