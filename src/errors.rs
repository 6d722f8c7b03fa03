//! Structured error types for the memory engine
//!
//! One enum covers the whole taxonomy: validation, not-found, transient
//! store failures, background-maintenance conditions, and the generation
//! boundary. Each variant carries a machine-readable code and an HTTP status
//! so the Axum surface can answer clients without ad-hoc mapping.
//!
//! Propagation policy: the user-facing request path never surfaces raw store
//! errors - it degrades to reduced context or a fallback response. Background
//! maintenance isolates failures per node/cluster and keeps going.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{TRANSIENT_RETRY_ATTEMPTS, TRANSIENT_RETRY_BASE_MS};

/// Structured error response for API clients
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Additional error context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Application error types with proper categorization
#[derive(Debug)]
pub enum AppError {
    // Validation errors (400)
    InvalidInput { field: String, reason: String },
    InvalidOwnerId(String),
    InvalidEmbedding(String),
    ContentTooLarge { size: usize, max: usize },

    // Not found (404)
    MemoryNotFound(String),
    SessionNotFound(String),

    // Transient store failure (503) - safe to retry with backoff
    TransientStore(String),

    // A single persisted record violates the schema (422 at the surface;
    // batch jobs skip the offending record and continue)
    SchemaViolation(String),

    // Generation collaborator exceeded its deadline. The request path maps
    // this to a canned fallback before it ever reaches a client.
    GenerationTimeout,

    // A consolidation cluster could not complete this cycle; retried on the
    // next scheduled run.
    ConsolidationConflict(String),

    // Internal errors (500)
    Storage(String),
    Serialization(String),
    Internal(anyhow::Error),
}

impl AppError {
    /// Get error code for client identification
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::InvalidOwnerId(_) => "INVALID_OWNER_ID",
            Self::InvalidEmbedding(_) => "INVALID_EMBEDDING",
            Self::ContentTooLarge { .. } => "CONTENT_TOO_LARGE",
            Self::MemoryNotFound(_) => "MEMORY_NOT_FOUND",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::TransientStore(_) => "TRANSIENT_STORE_ERROR",
            Self::SchemaViolation(_) => "SCHEMA_VIOLATION",
            Self::GenerationTimeout => "GENERATION_TIMEOUT",
            Self::ConsolidationConflict(_) => "CONSOLIDATION_CONFLICT",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput { .. }
            | Self::InvalidOwnerId(_)
            | Self::InvalidEmbedding(_)
            | Self::ContentTooLarge { .. } => StatusCode::BAD_REQUEST,

            Self::MemoryNotFound(_) | Self::SessionNotFound(_) => StatusCode::NOT_FOUND,

            Self::SchemaViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,

            Self::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,

            Self::GenerationTimeout => StatusCode::GATEWAY_TIMEOUT,

            Self::ConsolidationConflict(_)
            | Self::Storage(_)
            | Self::Serialization(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }

    /// Get detailed error message
    pub fn message(&self) -> String {
        match self {
            Self::InvalidInput { field, reason } => {
                format!("Invalid input for field '{field}': {reason}")
            }
            Self::InvalidOwnerId(msg) => format!("Invalid owner ID: {msg}"),
            Self::InvalidEmbedding(msg) => format!("Invalid embedding: {msg}"),
            Self::ContentTooLarge { size, max } => {
                format!("Content too large: {size} bytes (max: {max} bytes)")
            }
            Self::MemoryNotFound(id) => format!("Memory not found: {id}"),
            Self::SessionNotFound(id) => format!("Session not found: {id}"),
            Self::TransientStore(msg) => format!("Transient store error: {msg}"),
            Self::SchemaViolation(msg) => format!("Schema violation: {msg}"),
            Self::GenerationTimeout => "Generation timed out".to_string(),
            Self::ConsolidationConflict(msg) => format!("Consolidation conflict: {msg}"),
            Self::Storage(msg) => format!("Storage error: {msg}"),
            Self::Serialization(msg) => format!("Serialization error: {msg}"),
            Self::Internal(err) => format!("Internal error: {err}"),
        }
    }

    /// Convert to structured error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.code().to_string(),
            message: self.message(),
            details: None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<rocksdb::Error> for AppError {
    fn from(err: rocksdb::Error) -> Self {
        // RocksDB surfaces both persistent corruption and transient I/O
        // pressure through the same error type; treat writes stalls and lock
        // contention as retryable, everything else as a storage fault.
        let msg = err.to_string();
        if msg.contains("Resource busy") || msg.contains("Try again") || msg.contains("TimedOut") {
            Self::TransientStore(msg)
        } else {
            Self::Storage(msg)
        }
    }
}

impl From<bincode::Error> for AppError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Axum IntoResponse implementation for proper HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = self.to_response();

        (status, Json(body)).into_response()
    }
}

/// Type alias for Results using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Retry a fallible operation with bounded exponential backoff.
///
/// Only `TransientStore` errors are retried; everything else propagates on
/// the first attempt. Backoff doubles per attempt from the base with a small
/// random jitter to avoid thundering retries across sessions.
pub fn with_backoff<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    use rand::Rng;

    let mut attempt = 0u32;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt + 1 < TRANSIENT_RETRY_ATTEMPTS => {
                let backoff = TRANSIENT_RETRY_BASE_MS << attempt;
                let jitter = rand::thread_rng().gen_range(0..TRANSIENT_RETRY_BASE_MS);
                tracing::warn!(
                    attempt = attempt + 1,
                    backoff_ms = backoff + jitter,
                    error = %e,
                    "transient store error, retrying"
                );
                std::thread::sleep(std::time::Duration::from_millis(backoff + jitter));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
