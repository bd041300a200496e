use std::sync::Arc;

use axum::{
    extract::FromRef,
    http::StatusCode,
    middleware,
    routing::{delete, get},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    middleware::{make_span_with_request_id, request_id_middleware},
    services::{Catalog, StoreRegistry},
};

pub mod movies;
pub mod notifications;
pub mod session;
pub mod tracking;

/// Shared handles built once at startup
#[derive(Clone)]
pub struct AppState {
    pub catalog: Catalog,
    pub registry: Arc<StoreRegistry>,
}

impl FromRef<AppState> for Catalog {
    fn from_ref(state: &AppState) -> Self {
        state.catalog.clone()
    }
}

impl FromRef<AppState> for Arc<StoreRegistry> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.registry)
    }
}

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        // Catalog
        .route("/movies/search", get(movies::search))
        .route("/movies/popular", get(movies::popular))
        .route("/movies/:id", get(movies::details))
        // Tracking
        .route("/tracking", get(tracking::list))
        .route(
            "/tracking/:movie_id",
            get(tracking::status).put(tracking::track).delete(tracking::remove),
        )
        .route("/tracking/records/:record_id", delete(tracking::remove_record))
        // Notifications
        .route(
            "/notifications/current",
            get(notifications::current).delete(notifications::dismiss),
        )
        // Session
        .route("/session", delete(session::sign_out))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
