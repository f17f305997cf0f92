use axum::{Json, extract::State};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub ok: bool,
    pub renderer: bool,
}

/// Liveness probe. Reports whether the renderer backend is reachable
/// without failing the endpoint itself.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let renderer = state.renderer.health_check().await;
    Json(HealthResponse { ok: true, renderer })
}
