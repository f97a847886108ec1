//! HTTP API route definitions.

use axum::http::Method;
use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{chart, depth, health, metrics, ready, symbols, AppState};

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_origin(Any);

    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        // Data endpoints
        .route("/api/v1/symbols", get(symbols))
        .route("/api/v1/depth/:symbol", get(depth))
        .route("/api/v1/depth/:symbol/chart", get(chart))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
