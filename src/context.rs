//! Context cache: per-session sliding windows and the semantic response cache
//!
//! Short-term memory for the request path. Each session owns a sliding
//! window of recent exchanges; on overflow the window compacts by keeping
//! important and recent entries and folding the rest into one synthetic
//! summary entry at the head. The semantic cache short-circuits the whole
//! retrieval+generation pipeline when a near-duplicate query (by embedding
//! and emotional state) was answered recently.
//!
//! Concurrency: one mutex per session window (single-writer per session,
//! sessions fully parallel). The response cache is per owner behind its own
//! lock.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::constants::{
    CACHE_EMOTIONAL_SHARE, CACHE_MAX_ENTRIES, CACHE_SEMANTIC_SHARE, SESSION_TTL_SECS,
};
use crate::emotion::EmotionalState;
use crate::similarity::cosine_similarity;

/// Who produced a window entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryRole {
    User,
    Assistant,
    /// Synthetic compaction summary
    Summary,
}

/// One entry in a session window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub role: EntryRole,
    pub content: String,
    pub importance: f32,
    pub valence: f32,
    pub arousal: f32,
    pub timestamp: DateTime<Utc>,
}

impl ContextEntry {
    pub fn new(role: EntryRole, content: &str, importance: f32, state: &EmotionalState) -> Self {
        Self {
            role,
            content: content.to_string(),
            importance,
            valence: state.valence,
            arousal: state.arousal,
            timestamp: Utc::now(),
        }
    }
}

/// Sliding window for one session
struct SessionWindow {
    entries: VecDeque<ContextEntry>,
    last_active: DateTime<Utc>,
    /// Cumulative count of entries folded into summaries
    summarized_count: usize,
}

impl SessionWindow {
    fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            last_active: Utc::now(),
            summarized_count: 0,
        }
    }

    fn expired(&self, now: DateTime<Utc>) -> bool {
        now - self.last_active > Duration::seconds(SESSION_TTL_SECS)
    }

    /// Compact down to at most `window_size + 1` entries
    ///
    /// Keeps entries above the importance threshold plus the most recent
    /// `recent_keep`, folds everything else into one summary entry inserted
    /// at the head. If the kept set still overflows, the oldest kept entries
    /// are absorbed into the summary too.
    fn compact(&mut self, config: &EngineConfig) {
        if self.entries.len() <= config.window_size {
            return;
        }

        let recent_start = self.entries.len().saturating_sub(config.recent_keep);
        let mut kept: Vec<ContextEntry> = Vec::new();
        let mut dropped: Vec<ContextEntry> = Vec::new();

        for (idx, entry) in self.entries.drain(..).enumerate() {
            let important = entry.importance > config.importance_keep_threshold
                && entry.role != EntryRole::Summary;
            if important || idx >= recent_start {
                kept.push(entry);
            } else {
                dropped.push(entry);
            }
        }

        // Enforce the size bound by absorbing the oldest kept entries
        while kept.len() > config.window_size {
            dropped.push(kept.remove(0));
        }

        self.summarized_count += dropped.len();
        let summary = summarize_dropped(&dropped, self.summarized_count);

        self.entries.push_back(summary);
        for entry in kept {
            self.entries.push_back(entry);
        }

        tracing::debug!(
            folded = dropped.len(),
            retained = self.entries.len(),
            "context window compacted"
        );
    }
}

/// Build the synthetic head-of-window summary
fn summarize_dropped(dropped: &[ContextEntry], cumulative: usize) -> ContextEntry {
    let avg_valence = if dropped.is_empty() {
        0.5
    } else {
        dropped.iter().map(|e| e.valence).sum::<f32>() / dropped.len() as f32
    };
    let tone = if avg_valence > 0.6 {
        "positiva"
    } else if avg_valence < 0.4 {
        "negativa"
    } else {
        "neutra"
    };

    ContextEntry {
        role: EntryRole::Summary,
        content: format!(
            "[Resumen: {cumulative} intercambios anteriores, tono {tone}]"
        ),
        // Low importance: the next compaction absorbs this summary into the
        // fresh one instead of accumulating summary entries
        importance: 0.0,
        valence: avg_valence,
        arousal: 0.5,
        timestamp: dropped
            .last()
            .map(|e| e.timestamp)
            .unwrap_or_else(Utc::now),
    }
}

/// A cached generated response keyed by query embedding + emotional state
#[derive(Debug, Clone)]
struct CachedResponse {
    /// SHA256 over the embedding bytes, for exact-duplicate replacement
    /// (stable across restarts, unlike `DefaultHasher`)
    key: [u8; 32],
    embedding: Vec<f32>,
    valence: f32,
    arousal: f32,
    response: String,
    created_at: DateTime<Utc>,
}

fn embedding_key(embedding: &[f32]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    for component in embedding {
        hasher.update(component.to_le_bytes());
    }
    hasher.finalize().into()
}

/// Per-session windows plus the per-owner semantic response cache
pub struct ContextCache {
    windows: DashMap<String, Arc<Mutex<SessionWindow>>>,
    responses: DashMap<String, Arc<Mutex<VecDeque<CachedResponse>>>>,
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextCache {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
            responses: DashMap::new(),
        }
    }

    fn window_key(owner: &str, session: &str) -> String {
        format!("{owner}:{session}")
    }

    fn window(&self, owner: &str, session: &str) -> Arc<Mutex<SessionWindow>> {
        self.windows
            .entry(Self::window_key(owner, session))
            .or_insert_with(|| Arc::new(Mutex::new(SessionWindow::new())))
            .clone()
    }

    /// Append an entry to a session window, compacting on overflow
    pub fn push(&self, owner: &str, session: &str, entry: ContextEntry, config: &EngineConfig) {
        let window = self.window(owner, session);
        let mut guard = window.lock();

        let now = Utc::now();
        if guard.expired(now) {
            *guard = SessionWindow::new();
        }
        guard.last_active = now;
        guard.entries.push_back(entry);
        guard.compact(config);
    }

    /// Snapshot the current window, most recent last
    pub fn entries(&self, owner: &str, session: &str) -> Vec<ContextEntry> {
        let key = Self::window_key(owner, session);
        match self.windows.get(&key) {
            Some(window) => {
                let guard = window.lock();
                if guard.expired(Utc::now()) {
                    Vec::new()
                } else {
                    guard.entries.iter().cloned().collect()
                }
            }
            None => Vec::new(),
        }
    }

    /// Current window length
    pub fn window_len(&self, owner: &str, session: &str) -> usize {
        self.entries(owner, session).len()
    }

    /// Drop idle session windows past their TTL
    pub fn expire_idle(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self
            .windows
            .iter()
            .filter(|entry| entry.value().lock().expired(now))
            .map(|entry| entry.key().clone())
            .collect();
        for key in &expired {
            self.windows.remove(key);
        }
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "expired idle session windows");
        }
        expired.len()
    }

    // -------------------------------------------------------------------------
    // Semantic response cache
    // -------------------------------------------------------------------------

    /// Store a generated response for future near-duplicate queries
    pub fn cache_response(
        &self,
        owner: &str,
        embedding: &[f32],
        state: &EmotionalState,
        response: &str,
    ) {
        if embedding.is_empty() {
            return;
        }
        let entries = self
            .responses
            .entry(owner.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone();

        let key = embedding_key(embedding);
        let mut guard = entries.lock();

        // An exact repeat of the same query replaces its entry instead of
        // crowding out older distinct ones
        guard.retain(|entry| entry.key != key);
        guard.push_back(CachedResponse {
            key,
            embedding: embedding.to_vec(),
            valence: state.valence,
            arousal: state.arousal,
            response: response.to_string(),
            created_at: Utc::now(),
        });
        while guard.len() > CACHE_MAX_ENTRIES {
            guard.pop_front();
        }
    }

    /// Probe the semantic cache
    ///
    /// The score blends embedding similarity with emotional similarity; only
    /// a combined score at or above the configured hit threshold returns the
    /// cached response. Expired entries are pruned on the way through.
    pub fn lookup_response(
        &self,
        owner: &str,
        embedding: &[f32],
        state: &EmotionalState,
        config: &EngineConfig,
    ) -> Option<String> {
        if embedding.is_empty() {
            return None;
        }
        let entries = match self.responses.get(owner) {
            Some(slot) => slot.value().clone(),
            None => return None,
        };
        let mut guard = entries.lock();

        let now = Utc::now();
        let ttl = Duration::seconds(config.cache_ttl_secs);
        guard.retain(|entry| now - entry.created_at <= ttl);

        let mut best: Option<(f32, &CachedResponse)> = None;
        for entry in guard.iter() {
            let semantic = cosine_similarity(embedding, &entry.embedding);
            let emotional = 1.0
                - ((state.valence - entry.valence).abs() / 2.0
                    + (state.arousal - entry.arousal).abs())
                    / 2.0;
            let score = CACHE_SEMANTIC_SHARE * semantic + CACHE_EMOTIONAL_SHARE * emotional;

            if best.map(|(s, _)| score > s).unwrap_or(true) {
                best = Some((score, entry));
            }
        }

        match best {
            Some((score, entry)) if score >= config.cache_hit_threshold => {
                tracing::debug!(owner, score, "semantic cache hit");
                Some(entry.response.clone())
            }
            _ => None,
        }
    }
}
