//! Recall and memory CRUD handlers

use axum::extract::{Path, State};
use axum::response::Json;
use uuid::Uuid;

use super::health::AppState;
use crate::errors::{AppError, Result};
use crate::generation::CoherenceInput;
use crate::store::{MemoryId, MemoryStatus, MemoryType};

#[derive(Debug, serde::Deserialize)]
pub struct RecallBody {
    pub user_id: String,
    pub query: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, serde::Serialize)]
pub struct RecalledMemory {
    pub id: String,
    pub content: String,
    pub activation: f32,
    pub depth: u8,
    pub memory_type: String,
    pub emotional_weight: f32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, serde::Serialize)]
pub struct RecallResponse {
    pub memories: Vec<RecalledMemory>,
}

/// POST /v1/recall - ranked spreading-activation retrieval
pub async fn recall(
    State(state): State<AppState>,
    Json(body): Json<RecallBody>,
) -> Result<Json<RecallResponse>> {
    let activated = state
        .engine
        .recall(&body.user_id, &body.query, &body.embedding)?;

    let memories = activated
        .iter()
        .map(|m| RecalledMemory {
            id: m.node.id.to_string(),
            content: m.node.content.clone(),
            activation: m.activation,
            depth: m.depth,
            memory_type: match m.node.memory_type {
                MemoryType::Episodic => "episodic".to_string(),
                MemoryType::Semantic => "semantic".to_string(),
            },
            emotional_weight: m.node.emotional_weight,
            timestamp: m.node.timestamp,
        })
        .collect();

    Ok(Json(RecallResponse { memories }))
}

#[derive(Debug, serde::Deserialize)]
pub struct CoherenceBody {
    pub user_id: String,
    pub candidate_response: String,
    pub embedding: Vec<f32>,
}

/// POST /v1/coherence-input - related prior memories for the external
/// coherence-validation collaborator
pub async fn coherence_input(
    State(state): State<AppState>,
    Json(body): Json<CoherenceBody>,
) -> Result<Json<CoherenceInput>> {
    let input =
        state
            .engine
            .coherence_input(&body.user_id, &body.candidate_response, &body.embedding)?;
    Ok(Json(input))
}

#[derive(Debug, serde::Serialize)]
pub struct MemoryBody {
    pub id: String,
    pub owner_id: String,
    pub session_id: String,
    pub content: String,
    pub valence: f32,
    pub arousal: f32,
    pub dominance: f32,
    pub emotional_weight: f32,
    pub importance: f32,
    pub retention_strength: f32,
    pub access_count: u32,
    pub memory_type: String,
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub last_accessed: chrono::DateTime<chrono::Utc>,
}

fn parse_memory_id(raw: &str) -> Result<MemoryId> {
    Uuid::parse_str(raw)
        .map(MemoryId)
        .map_err(|_| AppError::InvalidInput {
            field: "id".to_string(),
            reason: "not a valid UUID".to_string(),
        })
}

/// GET /v1/memories/:id
pub async fn get_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MemoryBody>> {
    let memory_id = parse_memory_id(&id)?;
    let node = state.engine.store().get(&memory_id)?;

    Ok(Json(MemoryBody {
        id: node.id.to_string(),
        owner_id: node.owner_id.clone(),
        session_id: node.session_id.clone(),
        content: node.content.clone(),
        valence: node.valence,
        arousal: node.arousal,
        dominance: node.dominance,
        emotional_weight: node.emotional_weight,
        importance: node.importance,
        retention_strength: node.retention_strength,
        access_count: node.access_count,
        memory_type: match node.memory_type {
            MemoryType::Episodic => "episodic".to_string(),
            MemoryType::Semantic => "semantic".to_string(),
        },
        status: match node.status {
            MemoryStatus::Active => "active".to_string(),
            MemoryStatus::Consolidating => "consolidating".to_string(),
            MemoryStatus::Archived => "archived".to_string(),
        },
        timestamp: node.timestamp,
        last_accessed: node.last_accessed,
    }))
}

#[derive(Debug, serde::Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

/// DELETE /v1/memories/:id - hard delete with edge cascade
pub async fn delete_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let memory_id = parse_memory_id(&id)?;
    state.engine.store().delete(&memory_id)?;
    Ok(Json(DeleteResponse { deleted: true }))
}
