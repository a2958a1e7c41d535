pub mod claims;
pub mod runs;

use axum::Json;

use crate::dto::HealthResponse;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
