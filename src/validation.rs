//! Input validation for the API surface
//!
//! Validation failures are caller errors (400), never internal ones; they
//! are checked before anything touches the store.

use crate::constants::{MAX_CONTENT_BYTES, MAX_EMBEDDING_DIM};
use crate::errors::{AppError, Result};

/// Owner ids: 1-128 chars of alphanumerics plus `_ - . @`
pub fn validate_owner_id(owner_id: &str) -> Result<()> {
    if owner_id.is_empty() {
        return Err(AppError::InvalidOwnerId("must not be empty".to_string()));
    }
    if owner_id.len() > 128 {
        return Err(AppError::InvalidOwnerId(format!(
            "too long ({} chars, max 128)",
            owner_id.len()
        )));
    }
    if !owner_id
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'))
    {
        return Err(AppError::InvalidOwnerId(
            "only alphanumerics and _-.@ are allowed".to_string(),
        ));
    }
    Ok(())
}

/// Content must be non-empty and under the size cap
pub fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(AppError::InvalidInput {
            field: "message".to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    if content.len() > MAX_CONTENT_BYTES {
        return Err(AppError::ContentTooLarge {
            size: content.len(),
            max: MAX_CONTENT_BYTES,
        });
    }
    Ok(())
}

/// Embeddings must be non-empty, bounded, and finite
pub fn validate_embedding(embedding: &[f32]) -> Result<()> {
    if embedding.is_empty() {
        return Err(AppError::InvalidEmbedding("must not be empty".to_string()));
    }
    if embedding.len() > MAX_EMBEDDING_DIM {
        return Err(AppError::InvalidEmbedding(format!(
            "too long ({} components, max {MAX_EMBEDDING_DIM})",
            embedding.len()
        )));
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(AppError::InvalidEmbedding(
            "contains non-finite components".to_string(),
        ));
    }
    Ok(())
}
