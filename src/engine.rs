//! Request-path orchestration
//!
//! One inbound exchange flows: context window update → emotional scoring →
//! semantic-cache probe → spreading-activation retrieval → generation →
//! episodic write + relationship linking → response cache fill. Background
//! maintenance (consolidation, forgetting) never runs on this path.
//!
//! Per-session discipline: at most one retrieval+generation in flight per
//! session. Messages arriving while one is pending extend the pending batch
//! instead of spawning a concurrent generation; the in-flight worker drains
//! the extended batch before releasing the session.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::activation::{self, ActivatedMemory};
use crate::config::ConfigHandle;
use crate::constants::{
    EMOTIONAL_LINK_MAX_DISTANCE, IMPORTANCE_ASSISTANT_BONUS, IMPORTANCE_INTENSITY_WEIGHT,
    IMPORTANCE_MARKER_BONUS, LINK_CANDIDATES, SEMANTIC_LINK_MIN_SIMILARITY,
    TEMPORAL_LINK_HALF_LIFE_HOURS,
};
use crate::context::{ContextCache, ContextEntry, EntryRole};
use crate::emotion::{EmotionalAnalyzer, EmotionalState};
use crate::errors::Result;
use crate::generation::{
    respond_with_timeout, CoherenceInput, GenerationContext, Generator,
};
use crate::similarity::cosine_similarity;
use crate::store::{MemoryId, MemoryNode, MemoryStore, RelationKind};
use crate::validation;

/// Phrases that flag an exchange as explicitly worth remembering
const MEMORY_MARKERS: [&str; 8] = [
    "remember",
    "important",
    "never forget",
    "recuerda",
    "recuérdalo",
    "importante",
    "no olvides",
    "no lo olvides",
];

/// One inbound exchange
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub owner_id: String,
    pub session_id: String,
    pub message: String,
    /// Embedding of the message, produced by the caller's encoder
    pub embedding: Option<Vec<f32>>,
}

/// Result of processing an exchange
#[derive(Debug, Clone)]
pub struct ExchangeOutcome {
    /// Generated (or cached/fallback) response; `None` when the message was
    /// merged into a batch another in-flight call will answer
    pub response: Option<String>,
    /// Id of the episodic memory created, when importance cleared the bar
    pub memory_id: Option<MemoryId>,
    /// The response came from the semantic cache (retrieval and generation
    /// were skipped entirely)
    pub from_cache: bool,
    /// Memories supplied to the generator
    pub retrieved: usize,
    /// The message was folded into an already-pending batch
    pub batched: bool,
    pub emotional_state: EmotionalState,
}

/// Per-session serialization gate with a pending message batch
struct SessionGate {
    busy: tokio::sync::Mutex<()>,
    pending: parking_lot::Mutex<Vec<String>>,
}

impl SessionGate {
    fn new() -> Self {
        Self {
            busy: tokio::sync::Mutex::new(()),
            pending: parking_lot::Mutex::new(Vec::new()),
        }
    }
}

/// The memory engine facade
pub struct Engine {
    store: Arc<MemoryStore>,
    analyzer: EmotionalAnalyzer,
    context: ContextCache,
    generator: Arc<dyn Generator>,
    config: ConfigHandle,
    personality: String,
    sessions: DashMap<String, Arc<SessionGate>>,
}

impl Engine {
    pub fn new(
        store: Arc<MemoryStore>,
        generator: Arc<dyn Generator>,
        config: ConfigHandle,
        personality: &str,
    ) -> Self {
        Self {
            store,
            analyzer: EmotionalAnalyzer::new(),
            context: ContextCache::new(),
            generator,
            config,
            personality: personality.to_string(),
            sessions: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn context(&self) -> &ContextCache {
        &self.context
    }

    fn gate(&self, owner: &str, session: &str) -> Arc<SessionGate> {
        self.sessions
            .entry(format!("{owner}:{session}"))
            .or_insert_with(|| Arc::new(SessionGate::new()))
            .clone()
    }

    /// Process one inbound exchange
    ///
    /// If this session already has a retrieval+generation in flight, the
    /// message joins the pending batch and returns immediately; the in-flight
    /// worker drains the batch before releasing the session, so there is
    /// never a second concurrent generation for one session.
    pub async fn process_exchange(&self, request: ExchangeRequest) -> Result<ExchangeOutcome> {
        validation::validate_owner_id(&request.owner_id)?;
        validation::validate_content(&request.message)?;
        if let Some(embedding) = &request.embedding {
            validation::validate_embedding(embedding)?;
        }

        let gate = self.gate(&request.owner_id, &request.session_id);
        gate.pending.lock().push(request.message.clone());

        let batched = ExchangeOutcome {
            response: None,
            memory_id: None,
            from_cache: false,
            retrieved: 0,
            batched: true,
            emotional_state: EmotionalState::neutral(),
        };

        let mut outcome = None;
        loop {
            let guard = match gate.busy.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    // The in-flight worker for this session drains the
                    // extended batch before releasing; nothing to do here
                    tracing::debug!(
                        owner = %request.owner_id,
                        session = %request.session_id,
                        "generation in flight, extending pending batch"
                    );
                    return Ok(outcome.unwrap_or_else(|| batched.clone()));
                }
            };

            loop {
                let batch: Vec<String> = std::mem::take(&mut *gate.pending.lock());
                if batch.is_empty() {
                    break;
                }
                let text = batch.join("\n");
                outcome = Some(self.handle_batch(&request, &text).await?);
            }
            drop(guard);

            // A message may slip in between the final drain and the lock
            // release; loop back so it is not stranded until the next call
            if gate.pending.lock().is_empty() {
                break;
            }
        }

        // Another worker may have already drained this call's message into
        // its own batch; report it as batched in that case
        Ok(outcome.unwrap_or(batched))
    }

    /// Run the full pipeline for one (possibly merged) message batch
    async fn handle_batch(
        &self,
        request: &ExchangeRequest,
        text: &str,
    ) -> Result<ExchangeOutcome> {
        let config = self.config.snapshot();
        let owner = &request.owner_id;
        let session = &request.session_id;

        // 1. Emotional scoring; classification never blocks the pipeline
        let state = self.analyzer.analyze(text);
        let importance = score_importance(text, &state, EntryRole::User);

        self.context.push(
            owner,
            session,
            ContextEntry::new(EntryRole::User, text, importance, &state),
            &config,
        );

        // 2. Semantic cache probe: a near-duplicate query skips retrieval
        // and generation entirely
        if let Some(embedding) = &request.embedding {
            if let Some(cached) = self
                .context
                .lookup_response(owner, embedding, &state, &config)
            {
                self.context.push(
                    owner,
                    session,
                    ContextEntry::new(EntryRole::Assistant, &cached, 0.0, &state),
                    &config,
                );
                return Ok(ExchangeOutcome {
                    response: Some(cached),
                    memory_id: None,
                    from_cache: true,
                    retrieved: 0,
                    batched: false,
                    emotional_state: state,
                });
            }
        }

        // 3. Retrieval; store trouble degrades to reduced context rather
        // than failing the exchange
        let retrieved = match &request.embedding {
            Some(embedding) => {
                match activation::retrieve(&self.store, &config, owner, embedding, &state) {
                    Ok(memories) => memories,
                    Err(e) => {
                        tracing::warn!(owner = %owner, error = %e, "retrieval failed, degrading");
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };

        // 4. Generation under deadline, fallback on expiry
        let generation_context = self.assemble_context(owner, session, text, &state, &retrieved);
        let response = respond_with_timeout(
            self.generator.as_ref(),
            &generation_context,
            Duration::from_secs(config.generation_timeout_secs),
        )
        .await;

        // 5. Episodic write, gated on importance
        let memory_id = if importance >= config.store_importance_threshold {
            match self.store_exchange(request, text, &state, importance, &retrieved) {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::warn!(owner = %owner, error = %e, "failed to store exchange");
                    None
                }
            }
        } else {
            None
        };

        // 6. Fill the semantic cache and close the window turn
        if let Some(embedding) = &request.embedding {
            self.context
                .cache_response(owner, embedding, &state, &response);
        }
        let response_state = self.analyzer.analyze(&response);
        let response_importance = score_importance(&response, &response_state, EntryRole::Assistant);
        self.context.push(
            owner,
            session,
            ContextEntry::new(
                EntryRole::Assistant,
                &response,
                response_importance,
                &response_state,
            ),
            &config,
        );

        Ok(ExchangeOutcome {
            response: Some(response),
            memory_id,
            from_cache: false,
            retrieved: retrieved.len(),
            batched: false,
            emotional_state: state,
        })
    }

    fn assemble_context(
        &self,
        owner: &str,
        session: &str,
        text: &str,
        state: &EmotionalState,
        retrieved: &[ActivatedMemory],
    ) -> GenerationContext {
        let recent: Vec<String> = self
            .context
            .entries(owner, session)
            .iter()
            .map(|e| e.content.clone())
            .collect();

        GenerationContext {
            personality: self.personality.clone(),
            recent_exchanges: recent,
            memories: retrieved.iter().map(|m| m.node.content.clone()).collect(),
            emotional_state: state.clone(),
            user_message: text.to_string(),
        }
    }

    /// Persist the exchange as an episodic memory and wire it into the graph
    fn store_exchange(
        &self,
        request: &ExchangeRequest,
        text: &str,
        state: &EmotionalState,
        importance: f32,
        retrieved: &[ActivatedMemory],
    ) -> Result<MemoryId> {
        let node = MemoryNode::episodic(
            &request.owner_id,
            &request.session_id,
            text,
            request.embedding.clone(),
            state,
            importance,
        );
        let created_at = node.timestamp;
        // Transient store pressure is worth a bounded retry; everything else
        // propagates to the caller's degraded path
        let id = crate::errors::with_backoff(|| self.store.create(node.clone()))?;

        // Semantic and emotional edges against the retrieved neighborhood
        for activated in retrieved.iter().take(LINK_CANDIDATES) {
            let other = &activated.node;

            if let (Some(a), Some(b)) = (&request.embedding, &other.embedding) {
                let similarity = cosine_similarity(a, b);
                if similarity >= SEMANTIC_LINK_MIN_SIMILARITY {
                    if let Err(e) = self.store.link(
                        &id,
                        &other.id,
                        RelationKind::SemanticallyRelated,
                        similarity,
                        similarity,
                        0.0,
                    ) {
                        tracing::warn!(error = %e, "semantic link failed");
                    }
                }
            }

            let distance = state.vad_distance(&other.emotional_state());
            if distance <= EMOTIONAL_LINK_MAX_DISTANCE {
                let alignment = 1.0 - distance;
                if let Err(e) = self.store.link(
                    &id,
                    &other.id,
                    RelationKind::EmotionallySimilar,
                    alignment,
                    alignment,
                    0.0,
                ) {
                    tracing::warn!(error = %e, "emotional link failed");
                }
            }
        }

        // Temporal edge to the session's previous stored exchange
        if let Some(previous) =
            self.store
                .previous_in_session(&request.owner_id, &request.session_id, created_at)
        {
            let hours = (created_at - previous.timestamp).num_minutes() as f32 / 60.0;
            let weight = 0.5f32.powf(hours.max(0.0) / TEMPORAL_LINK_HALF_LIFE_HOURS);
            if let Err(e) = self.store.link(
                &id,
                &previous.id,
                RelationKind::TemporallyRelated,
                weight,
                0.0,
                hours,
            ) {
                tracing::warn!(error = %e, "temporal link failed");
            }
        }

        Ok(id)
    }

    /// Direct retrieval for the recall surface
    pub fn recall(
        &self,
        owner: &str,
        query_text: &str,
        embedding: &[f32],
    ) -> Result<Vec<ActivatedMemory>> {
        validation::validate_owner_id(owner)?;
        validation::validate_embedding(embedding)?;

        let config = self.config.snapshot();
        let state = self.analyzer.analyze(query_text);
        activation::retrieve(&self.store, &config, owner, embedding, &state)
    }

    /// Assemble the input package for the external coherence-validation
    /// collaborator: the candidate response plus its related prior memories
    pub fn coherence_input(
        &self,
        owner: &str,
        candidate: &str,
        embedding: &[f32],
    ) -> Result<CoherenceInput> {
        let config = self.config.snapshot();
        let state = self.analyzer.analyze(candidate);
        let related = activation::retrieve(&self.store, &config, owner, embedding, &state)?;
        Ok(CoherenceInput::new(candidate, &related))
    }

    /// Timestamp-aware helper for the health surface
    pub fn uptime_probe(&self) -> Result<usize> {
        Ok(self.store.total_count())
    }
}

/// Importance of one exchange for long-term storage gating
///
/// Emotional intensity carries most of the weight; length, explicit memory
/// markers, and assistant authorship add the rest. Mirrors the upstream
/// storage heuristics (high intensity, long content, assistant responses,
/// "remember this" phrasing all qualify).
pub fn score_importance(content: &str, state: &EmotionalState, role: EntryRole) -> f32 {
    let mut score = IMPORTANCE_INTENSITY_WEIGHT * state.intensity();

    let chars = content.chars().count();
    score += if chars >= 100 {
        0.2
    } else if chars >= 40 {
        0.1
    } else if chars >= 15 {
        0.05
    } else {
        0.0
    };

    let lowered = content.to_lowercase();
    if MEMORY_MARKERS.iter().any(|m| lowered.contains(m)) {
        score += IMPORTANCE_MARKER_BONUS;
    }

    if role == EntryRole::Assistant {
        score += IMPORTANCE_ASSISTANT_BONUS;
    }

    score.clamp(0.0, 1.0)
}
