//! Generation collaborator boundary
//!
//! The engine never produces text itself; it assembles context (personality,
//! selected memories, emotional state, user message) and hands it to an
//! external generator. Generation is long-latency I/O: every call runs under
//! a bounded timeout and any failure degrades to a canned fallback instead
//! of surfacing an error to the request path.

use async_trait::async_trait;
use std::time::Duration;

use crate::activation::ActivatedMemory;
use crate::constants::FALLBACK_RESPONSE;
use crate::emotion::EmotionalState;

/// Context assembled for one generation call
#[derive(Debug, Clone)]
pub struct GenerationContext {
    /// Personality description supplied by the hosting application
    pub personality: String,

    /// Recent window entries, oldest first
    pub recent_exchanges: Vec<String>,

    /// Memories selected by spreading activation, most relevant first
    pub memories: Vec<String>,

    /// Current emotional state of the conversation
    pub emotional_state: EmotionalState,

    /// The user message being answered
    pub user_message: String,
}

/// External text-generation collaborator
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce a candidate response for the assembled context
    async fn respond(&self, context: &GenerationContext) -> anyhow::Result<String>;

    /// Summarize a cluster of episodic contents into one semantic statement
    async fn summarize(&self, contents: &[String]) -> anyhow::Result<String>;
}

/// Run one generation call under a deadline
///
/// Timeout or collaborator failure both yield the canned fallback - the
/// caller always gets text back.
pub async fn respond_with_timeout(
    generator: &dyn Generator,
    context: &GenerationContext,
    timeout: Duration,
) -> String {
    match tokio::time::timeout(timeout, generator.respond(context)).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "generation failed, using fallback response");
            FALLBACK_RESPONSE.to_string()
        }
        Err(_) => {
            tracing::warn!(timeout_secs = timeout.as_secs(), "generation timed out");
            FALLBACK_RESPONSE.to_string()
        }
    }
}

/// Summarization under a deadline; `None` means the caller should skip the
/// cluster this cycle and retry on the next scheduled run
pub async fn summarize_with_timeout(
    generator: &dyn Generator,
    contents: &[String],
    timeout: Duration,
) -> Option<String> {
    match tokio::time::timeout(timeout, generator.summarize(contents)).await {
        Ok(Ok(text)) => Some(text),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "cluster summarization failed");
            None
        }
        Err(_) => {
            tracing::warn!("cluster summarization timed out");
            None
        }
    }
}

/// Input package for the external coherence-validation collaborator
///
/// The memory engine only supplies the related-prior-memories side; the
/// validation itself happens outside this crate.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CoherenceInput {
    pub candidate_response: String,
    pub related_memories: Vec<String>,
}

impl CoherenceInput {
    pub fn new(candidate: &str, retrieved: &[ActivatedMemory]) -> Self {
        Self {
            candidate_response: candidate.to_string(),
            related_memories: retrieved
                .iter()
                .map(|m| m.node.content.clone())
                .collect(),
        }
    }
}

/// Offline generator producing deterministic canned text
///
/// Stands in for the real model in tests and degraded deployments.
pub struct FallbackResponder;

#[async_trait]
impl Generator for FallbackResponder {
    async fn respond(&self, context: &GenerationContext) -> anyhow::Result<String> {
        Ok(format!(
            "Entiendo. Me quedo con lo que me cuentas: \"{}\"",
            context.user_message
        ))
    }

    async fn summarize(&self, contents: &[String]) -> anyhow::Result<String> {
        let first = contents.first().cloned().unwrap_or_default();
        Ok(format!(
            "Patrón recurrente ({} episodios): {}",
            contents.len(),
            first
        ))
    }
}
