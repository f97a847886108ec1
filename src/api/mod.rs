//! HTTP API module for health, metrics, depth data and chart endpoints.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;
