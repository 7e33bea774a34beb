use axum::{response::Json, routing::get, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod assembly;
pub mod config;
pub mod db;
pub mod dialogue;
pub mod error;
pub mod importer;
pub mod jobs;
pub mod llm;
pub mod media;
pub mod session;
pub mod storage;

pub use api::AppState;

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// The full HTTP application: pages, chat endpoint, JSON API and health check.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false);

    Router::new()
        .route("/health", get(health))
        .merge(api::router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
