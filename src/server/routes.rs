//! Application routing
//!
//! This module defines all HTTP routes for the application.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::api::{ask, health};
use crate::server::state::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ask", post(ask::ask))
        .route("/history", get(ask::history))
        .route("/health", get(health::health_check))
        // Permissive CORS: the relay binds to localhost and serves
        // whichever local client captured the selection.
        .layer(create_cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
