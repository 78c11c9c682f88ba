//! HTTP server for the listcast render orchestrator.
//!
//! Exposes the render, cancel and health endpoints.

pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// The router with request tracing and permissive CORS applied.
pub fn app(state: AppState) -> Router {
    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
