use dotenvy::dotenv;
use gltf_asset_backend::config::PipelineConfig;
use gltf_asset_backend::infrastructure::storage;
use gltf_asset_backend::services::dispatch::JobDispatcher;
use gltf_asset_backend::services::promotion::PromotionService;
use gltf_asset_backend::services::queue::{JobQueue, QueuePolicy};
use gltf_asset_backend::services::renderer::create_renderer;
use gltf_asset_backend::services::worker::RenderWorker;
use gltf_asset_backend::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing with EnvFilter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gltf_asset_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting glTF Asset Backend...");

    let config = PipelineConfig::from_env();
    info!(
        "⚙️  Pipeline Config: {}→{}, thumbs {}x{}, renderer={}, attempts={}",
        config.staging_prefix,
        config.final_prefix,
        config.thumb_width,
        config.thumb_height,
        config.renderer_type,
        config.max_attempts
    );

    // Setup Infrastructure
    let store = storage::setup_storage().await?;

    let renderer = create_renderer(&config);
    let queue = Arc::new(JobQueue::new(QueuePolicy::from_config(&config)));
    let promotion = Arc::new(PromotionService::new(store.clone(), &config));
    let dispatcher = Arc::new(JobDispatcher::new(queue.clone(), &config));
    let render_worker = Arc::new(RenderWorker::new(store.clone(), renderer.clone()));

    let state = AppState {
        store: store.clone(),
        promotion,
        dispatcher,
        queue: queue.clone(),
        renderer: renderer.clone(),
        config: config.clone(),
    };

    // Setup Shutdown Channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Start Queue Consumer
    tokio::spawn(queue.clone().run(render_worker, shutdown_rx));

    let app = create_app(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            })
            .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                info!("📥 {} {}", request.method(), request.uri());
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    info!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                },
            ),
    );

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    info!("✅ Server ready at http://{}", addr);
    info!("📖 Swagger UI: http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    renderer.shutdown().await;
    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
