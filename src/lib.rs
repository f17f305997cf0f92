pub mod config;
pub mod error;
pub mod gltf;
pub mod handlers;
pub mod infrastructure;
pub mod models;
pub mod services;

use crate::config::PipelineConfig;
use crate::services::dispatch::JobDispatcher;
use crate::services::promotion::PromotionService;
use crate::services::queue::JobQueue;
use crate::services::renderer::SceneRenderer;
use crate::services::storage::ObjectStore;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::commit::commit_asset, handlers::health::health),
    components(
        schemas(
            models::CommitManifest,
            handlers::commit::CommitResponse,
            handlers::commit::CommitData,
            handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "assets", description = "Asset commit and thumbnail endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub promotion: Arc<PromotionService>,
    pub dispatcher: Arc<JobDispatcher>,
    pub queue: Arc<JobQueue>,
    pub renderer: Arc<dyn SceneRenderer>,
    pub config: PipelineConfig,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(handlers::health::health))
        .route("/api/v1/assets/commit", post(handlers::commit::commit_asset))
        .with_state(state)
}
