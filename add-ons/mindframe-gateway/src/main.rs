//! Axum-based gateway for the Mindframe voice flow engine.
//!
//! Exposes turn processing, flow validation, the template catalog, and the
//! AI flow designer over HTTP. The telephony transport (speech-to-text in,
//! text-to-speech out) sits in front of `/api/v1/voice/turn`.

mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use mindframe_flow::{create_best_chat, EngineConfig, FlowDesigner, FlowEngine, TemplateCatalog};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
pub(crate) struct AppState {
    pub engine: Arc<FlowEngine>,
    pub catalog: Arc<TemplateCatalog>,
    pub designer: Arc<FlowDesigner>,
}

impl AppState {
    fn from_env() -> Self {
        let backend = create_best_chat();
        let config = EngineConfig::from_env();
        AppState {
            engine: Arc::new(FlowEngine::with_config(backend.clone(), config)),
            catalog: Arc::new(TemplateCatalog::new()),
            designer: Arc::new(FlowDesigner::new(backend)),
        }
    }
}

pub(crate) fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/voice/turn", post(handlers::process_turn))
        .route("/api/v1/flows/validate", post(handlers::validate_flow))
        .route("/api/v1/flows/generate", post(handlers::generate_flow))
        .route("/api/v1/flows/templates", get(handlers::list_templates))
        .route("/api/v1/flows/templates/:id", get(handlers::get_template))
        .route(
            "/api/v1/flows/templates/:id/export",
            get(handlers::export_template),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Periodically drop conversation contexts abandoned mid-call.
fn spawn_idle_sweeper(engine: Arc<FlowEngine>) {
    let max_idle = engine.config().max_idle;
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            let evicted = engine.store().evict_idle(max_idle);
            if evicted > 0 {
                info!("🧹 evicted {} idle conversation(s)", evicted);
            }
        }
    });
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let state = AppState::from_env();
    spawn_idle_sweeper(state.engine.clone());
    let app = build_app(state);

    let addr =
        std::env::var("MINDFRAME_GATEWAY_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    info!("📞 Mindframe gateway listening on {}", addr);
    axum::serve(listener, app).await.unwrap();
}
