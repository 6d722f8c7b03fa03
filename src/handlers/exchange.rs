//! Exchange ingestion handlers

use axum::extract::{Path, State};
use axum::response::Json;

use super::health::AppState;
use crate::context::{ContextEntry, EntryRole};
use crate::emotion::EmotionalState;
use crate::engine::ExchangeRequest;
use crate::errors::Result;

/// Request body for one inbound exchange
#[derive(Debug, serde::Deserialize)]
pub struct ExchangeBody {
    pub user_id: String,
    pub session_id: String,
    pub message: String,
    /// Embedding produced by the caller's encoder; omitted embeddings skip
    /// the semantic cache and similarity seeding
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, serde::Serialize)]
pub struct EmotionBody {
    pub category: String,
    pub valence: f32,
    pub arousal: f32,
    pub dominance: f32,
    pub confidence: f32,
}

impl From<&EmotionalState> for EmotionBody {
    fn from(state: &EmotionalState) -> Self {
        Self {
            category: state.category.as_str().to_string(),
            valence: state.valence,
            arousal: state.arousal,
            dominance: state.dominance,
            confidence: state.confidence,
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ExchangeResponse {
    /// Absent when the message was folded into an in-flight batch
    pub response: Option<String>,
    pub memory_id: Option<String>,
    pub from_cache: bool,
    pub batched: bool,
    pub retrieved: usize,
    pub emotion: EmotionBody,
}

/// POST /v1/exchange
pub async fn process_exchange(
    State(state): State<AppState>,
    Json(body): Json<ExchangeBody>,
) -> Result<Json<ExchangeResponse>> {
    let outcome = state
        .engine
        .process_exchange(ExchangeRequest {
            owner_id: body.user_id,
            session_id: body.session_id,
            message: body.message,
            embedding: body.embedding,
        })
        .await?;

    Ok(Json(ExchangeResponse {
        response: outcome.response,
        memory_id: outcome.memory_id.map(|id| id.to_string()),
        from_cache: outcome.from_cache,
        batched: outcome.batched,
        retrieved: outcome.retrieved,
        emotion: EmotionBody::from(&outcome.emotional_state),
    }))
}

#[derive(Debug, serde::Serialize)]
pub struct ContextEntryBody {
    pub role: String,
    pub content: String,
    pub importance: f32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&ContextEntry> for ContextEntryBody {
    fn from(entry: &ContextEntry) -> Self {
        Self {
            role: match entry.role {
                EntryRole::User => "user".to_string(),
                EntryRole::Assistant => "assistant".to_string(),
                EntryRole::Summary => "summary".to_string(),
            },
            content: entry.content.clone(),
            importance: entry.importance,
            timestamp: entry.timestamp,
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ContextResponse {
    pub entries: Vec<ContextEntryBody>,
}

/// GET /v1/context/:user_id/:session_id - current sliding window
pub async fn get_context(
    State(state): State<AppState>,
    Path((user_id, session_id)): Path<(String, String)>,
) -> Result<Json<ContextResponse>> {
    crate::validation::validate_owner_id(&user_id)?;

    let entries = state
        .engine
        .context()
        .entries(&user_id, &session_id)
        .iter()
        .map(ContextEntryBody::from)
        .collect();

    Ok(Json(ContextResponse { entries }))
}
