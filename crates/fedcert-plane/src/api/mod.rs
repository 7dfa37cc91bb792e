//! Publication API for one hosted entity

pub mod error;
pub mod handlers;

use axum::{
    routing::get,
    Json, Router,
};
use fedcert_core::WELL_KNOWN_PATH;
use fedcert_trust::FETCH_PATH;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use handlers::AppState;

/// Content type of a compact entity statement
pub const ENTITY_STATEMENT_CONTENT_TYPE: &str = "application/entity-statement+jwt";

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Create the router serving one hosted entity
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        // Federation endpoints
        .route(WELL_KNOWN_PATH, get(handlers::entity_configuration))
        .route(FETCH_PATH, get(handlers::fetch_subordinate_statement))
        // Subordination management
        .route(
            "/subordinates",
            get(handlers::list_subordinates).post(handlers::add_subordinates),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
