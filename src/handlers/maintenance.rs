//! Maintenance and configuration handlers
//!
//! The dashboard drives these: trigger a maintenance cycle on demand, read
//! the live configuration snapshot, and hot-swap thresholds without a
//! restart.

use axum::extract::State;
use axum::response::Json;

use super::health::AppState;
use crate::config::EngineConfig;
use crate::errors::Result;
use crate::scheduler::MaintenanceOutcome;

/// POST /v1/maintenance/run - enqueue and drain a full cycle now
pub async fn run_maintenance(State(state): State<AppState>) -> Result<Json<MaintenanceOutcome>> {
    state.scheduler.schedule_cycle();
    let outcome = state.scheduler.run_pending().await;
    Ok(Json(outcome))
}

/// GET /v1/config - current snapshot (includes its version)
pub async fn get_config(State(state): State<AppState>) -> Result<Json<EngineConfig>> {
    Ok(Json((*state.engine.config().snapshot()).clone()))
}

#[derive(Debug, serde::Serialize)]
pub struct ConfigUpdateResponse {
    pub version: u64,
}

/// PUT /v1/config - replace the snapshot atomically
///
/// In-flight retrievals and sweeps keep the snapshot they started with;
/// the next call picks up the new one.
pub async fn put_config(
    State(state): State<AppState>,
    Json(body): Json<EngineConfig>,
) -> Result<Json<ConfigUpdateResponse>> {
    let version = state.engine.config().replace(body);
    Ok(Json(ConfigUpdateResponse { version }))
}
