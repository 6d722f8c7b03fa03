//! Shared application state and the health probe

use axum::extract::State;
use axum::response::Json;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::engine::Engine;
use crate::errors::Result;
use crate::scheduler::Scheduler;

/// State shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub scheduler: Arc<Scheduler>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            engine,
            scheduler,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: i64,
    pub memories: usize,
    pub pending_jobs: usize,
}

/// GET /health - liveness plus a store probe
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    let memories = state.engine.uptime_probe()?;

    Ok(Json(HealthResponse {
        status: "ok",
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        memories,
        pending_jobs: state.scheduler.queue().len(),
    }))
}
