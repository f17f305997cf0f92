use axum::{Json, extract::State};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;
use crate::error::PipelineError;
use crate::models::CommitManifest;

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    pub ok: bool,
    pub data: CommitData,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommitData {
    /// Final location of the promoted asset.
    pub key: String,
    /// Identifier of the dispatched thumbnail job, when one was queued.
    pub job_id: Option<String>,
}

/// Commit a staged asset: verify the client's claims against the stored
/// object, move it to its final location, and queue a thumbnail render.
///
/// Promotion and dispatch are deliberately decoupled. A dispatch failure
/// after a successful promotion is logged but does not fail the request,
/// since the asset itself is already in place.
#[utoipa::path(
    post,
    path = "/api/v1/assets/commit",
    request_body = CommitManifest,
    responses(
        (status = 200, description = "Asset promoted and thumbnail job queued", body = CommitResponse),
        (status = 404, description = "Staged object not found"),
        (status = 422, description = "Manifest does not match the stored object"),
        (status = 502, description = "Promotion copy failed")
    )
)]
pub async fn commit_asset(
    State(state): State<AppState>,
    Json(manifest): Json<CommitManifest>,
) -> Result<Json<CommitResponse>, PipelineError> {
    tracing::info!("📦 Commit requested for {}", manifest.key);

    state.promotion.validate(&manifest).await?;
    let promoted = state.promotion.promote(&manifest).await?;

    let job_id = match state.dispatcher.enqueue_thumbnail_job(&promoted) {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::error!("Failed to dispatch thumbnail job for {}: {}", promoted.key, e);
            None
        }
    };

    tracing::info!("✅ Promoted {} -> {}", manifest.key, promoted.key);

    Ok(Json(CommitResponse {
        ok: true,
        data: CommitData {
            key: promoted.key,
            job_id,
        },
    }))
}
