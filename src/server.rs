//! HTTP application assembly for the session server

use crate::auth::{session_router, SessionApiState};
use crate::middleware::request_logging;
use axum::{middleware, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Health check - GET /health
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "nextspace-session",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Full application: health check, session endpoints, logging and CORS
pub fn build_app(state: SessionApiState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(session_router(state))
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
