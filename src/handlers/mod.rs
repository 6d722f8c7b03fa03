//! HTTP surface
//!
//! Thin Axum layer over the engine. The chat transport, dashboard, and
//! generation host are separate services; they reach the memory engine
//! through these routes.

pub mod exchange;
pub mod health;
pub mod maintenance;
pub mod recall;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use health::AppState;

/// Build the full route table
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/v1/exchange", post(exchange::process_exchange))
        .route("/v1/recall", post(recall::recall))
        .route("/v1/coherence-input", post(recall::coherence_input))
        .route(
            "/v1/memories/:id",
            get(recall::get_memory).delete(recall::delete_memory),
        )
        .route(
            "/v1/context/:user_id/:session_id",
            get(exchange::get_context),
        )
        .route("/v1/maintenance/run", post(maintenance::run_maintenance))
        .route(
            "/v1/config",
            get(maintenance::get_config).put(maintenance::put_config),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
