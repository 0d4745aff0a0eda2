use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::Level;

use crate::orchestrator::JobContext;

pub mod handlers;
pub mod responses;

pub use handlers::{health_check, ingest_all, ingest_provider, price_trends, providers};
pub use responses::{FanoutResponse, IngestResponse};

#[derive(Clone)]
pub struct AppState {
    pub ctx: JobContext,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/ingest/:slug", post(ingest_provider))
        .route("/api/v1/ingest-all", post(ingest_all))
        .route("/api/v1/providers", get(providers))
        .route("/api/v1/trends", get(price_trends))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .with_state(state)
}
