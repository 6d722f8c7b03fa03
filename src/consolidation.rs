//! Consolidation engine: episodic → semantic
//!
//! An idempotent, re-runnable batch job. Recent episodic memories are
//! clustered by embedding similarity plus shared entities; once a cluster
//! reaches the consolidation threshold its members are generalized into one
//! semantic memory via the generation collaborator, linked back with
//! `ConsolidatedFrom` edges, and the contributors are archived (not
//! deleted - the forgetting sweep decides their final fate).
//!
//! Re-running over an already-consolidated batch creates nothing new: a
//! cluster containing any member with an existing `ConsolidatedFrom` edge is
//! skipped before synthesis. Failures are isolated per cluster - a cluster
//! that cannot summarize this cycle is released back to `Active` and retried
//! on the next scheduled run.

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::constants::{CLUSTER_SHARED_ENTITIES, CONSOLIDATION_RECENCY_HALF_LIFE_HOURS};
use crate::emotion::EmotionCategory;
use crate::generation::{summarize_with_timeout, Generator};
use crate::similarity::cosine_similarity;
use crate::store::{
    MemoryId, MemoryNode, MemoryStatus, MemoryStore, MemoryType, RelationKind, SharedNode,
};

/// Outcome of one consolidation run
#[derive(Debug, Default, Clone, Serialize)]
pub struct ConsolidationReport {
    pub candidates: usize,
    pub clusters_found: usize,
    pub semantic_created: usize,
    pub episodes_archived: usize,
    pub errors: Vec<String>,
}

/// Background consolidation over one owner's memory graph
pub struct ConsolidationEngine {
    store: Arc<MemoryStore>,
    generator: Arc<dyn Generator>,
}

impl ConsolidationEngine {
    pub fn new(store: Arc<MemoryStore>, generator: Arc<dyn Generator>) -> Self {
        Self { store, generator }
    }

    /// Run one consolidation cycle for an owner
    ///
    /// Never fails wholesale; per-cluster problems land in the report.
    pub async fn consolidate_owner(
        &self,
        owner: &str,
        config: &EngineConfig,
    ) -> ConsolidationReport {
        let mut report = ConsolidationReport::default();

        let cutoff = Utc::now() - ChronoDuration::hours(config.consolidation_lookback_hours);
        let candidates = self.store.active_episodic_since(owner, cutoff);
        report.candidates = candidates.len();

        if candidates.len() < config.consolidation_threshold {
            tracing::debug!(owner, candidates = candidates.len(), "too few candidates");
            return report;
        }

        let clusters = cluster_episodes(&candidates, config);
        report.clusters_found = clusters.len();

        for members in clusters {
            match self.consolidate_cluster(owner, &members, config).await {
                Ok(Some(archived)) => {
                    report.semantic_created += 1;
                    report.episodes_archived += archived;
                }
                Ok(None) => {
                    // Already consolidated or skipped this cycle
                }
                Err(e) => {
                    tracing::warn!(owner, error = %e, "cluster consolidation failed");
                    report.errors.push(e);
                }
            }
        }

        tracing::info!(
            owner,
            clusters = report.clusters_found,
            created = report.semantic_created,
            archived = report.episodes_archived,
            errors = report.errors.len(),
            "consolidation cycle finished"
        );
        report
    }

    /// Consolidate one qualifying cluster; `Ok(None)` means skipped
    async fn consolidate_cluster(
        &self,
        owner: &str,
        members: &[SharedNode],
        config: &EngineConfig,
    ) -> std::result::Result<Option<usize>, String> {
        // Idempotence: a member that already feeds a semantic node means
        // this pattern was consolidated in a previous cycle
        if members.iter().any(|m| self.store.is_consolidated(&m.id)) {
            tracing::debug!(owner, "cluster already consolidated, skipping");
            return Ok(None);
        }

        // Claim the members so a concurrent retrieval cycle sees a coherent
        // transitional state; released back to Active on any failure below
        let mut claimed: Vec<MemoryId> = Vec::new();
        for member in members {
            match self.store.mark_consolidating(&member.id) {
                Ok(()) => claimed.push(member.id.clone()),
                Err(e) => {
                    self.release(&claimed);
                    return Err(format!("failed to claim {}: {e}", member.id));
                }
            }
        }

        let contents: Vec<String> = members.iter().map(|m| m.content.clone()).collect();
        let summary = match summarize_with_timeout(
            self.generator.as_ref(),
            &contents,
            Duration::from_secs(config.generation_timeout_secs),
        )
        .await
        {
            Some(text) => text,
            None => {
                // Generation unavailable: skip this cluster for the cycle
                self.release(&claimed);
                return Err(format!(
                    "cluster of {} episodes skipped: summarization unavailable",
                    members.len()
                ));
            }
        };

        let semantic = build_semantic_node(owner, &summary, members);
        let semantic_id = match self.store.create(semantic) {
            Ok(id) => id,
            Err(e) => {
                self.release(&claimed);
                return Err(format!("failed to create semantic node: {e}"));
            }
        };

        let mut archived = 0usize;
        for member in members {
            if let Err(e) = self.store.link(
                &semantic_id,
                &member.id,
                RelationKind::ConsolidatedFrom,
                1.0,
                0.0,
                0.0,
            ) {
                tracing::warn!(memory_id = %member.id, error = %e, "failed to link contributor");
                continue;
            }
            match self.store.archive(&member.id) {
                Ok(()) => archived += 1,
                Err(e) => {
                    tracing::warn!(memory_id = %member.id, error = %e, "failed to archive contributor")
                }
            }
        }

        tracing::info!(
            owner,
            semantic_id = %semantic_id,
            contributors = members.len(),
            "semantic memory created"
        );
        Ok(Some(archived))
    }

    fn release(&self, claimed: &[MemoryId]) {
        for id in claimed {
            if let Err(e) = self.store.unmark_consolidating(id) {
                tracing::warn!(memory_id = %id, error = %e, "failed to release claimed memory");
            }
        }
    }
}

/// Cluster episodes by embedding similarity and shared entities
///
/// Greedy single-link grouping: each unassigned episode opens a cluster and
/// pulls in every later episode whose embedding similarity reaches the
/// configured threshold or which shares enough extracted entities with the
/// opener. Only clusters at or above the consolidation threshold qualify.
pub fn cluster_episodes(candidates: &[SharedNode], config: &EngineConfig) -> Vec<Vec<SharedNode>> {
    let mut assigned: HashSet<MemoryId> = HashSet::new();
    let mut clusters: Vec<Vec<SharedNode>> = Vec::new();

    for (i, opener) in candidates.iter().enumerate() {
        if assigned.contains(&opener.id) {
            continue;
        }

        let mut group: Vec<SharedNode> = vec![opener.clone()];
        for other in candidates.iter().skip(i + 1) {
            if assigned.contains(&other.id) {
                continue;
            }

            let similar = match (&opener.embedding, &other.embedding) {
                (Some(a), Some(b)) => cosine_similarity(a, b) >= config.cluster_similarity,
                _ => false,
            };
            let shared = shared_entity_count(opener, other) >= CLUSTER_SHARED_ENTITIES;

            if similar || shared {
                group.push(other.clone());
            }
        }

        if group.len() >= config.consolidation_threshold {
            for member in &group {
                assigned.insert(member.id.clone());
            }
            clusters.push(group);
        }
    }

    clusters
}

fn shared_entity_count(a: &MemoryNode, b: &MemoryNode) -> usize {
    if a.entities.is_empty() || b.entities.is_empty() {
        return 0;
    }
    let set: HashSet<&String> = a.entities.iter().collect();
    b.entities.iter().filter(|e| set.contains(e)).count()
}

/// Synthesize the semantic node from cluster members
///
/// Emotional weight and VAD are recency-weighted averages (half-life
/// weighting), so the generalized memory reflects the pattern's current
/// emotional tone. The embedding is the plain average of member embeddings,
/// keeping the semantic node seedable by future queries.
fn build_semantic_node(owner: &str, summary: &str, members: &[SharedNode]) -> MemoryNode {
    let now = Utc::now();

    let mut total_weight = 0.0f64;
    let mut valence = 0.0f64;
    let mut arousal = 0.0f64;
    let mut dominance = 0.0f64;
    let mut emotional_weight = 0.0f64;

    for member in members {
        let age_hours = (now - member.timestamp).num_minutes() as f64 / 60.0;
        let recency = 0.5f64.powf(age_hours.max(0.0) / CONSOLIDATION_RECENCY_HALF_LIFE_HOURS);
        total_weight += recency;
        valence += member.valence as f64 * recency;
        arousal += member.arousal as f64 * recency;
        dominance += member.dominance as f64 * recency;
        emotional_weight += member.emotional_weight as f64 * recency;
    }
    if total_weight <= 0.0 {
        total_weight = 1.0;
    }

    let embedding = average_embedding(members);
    let newest = members
        .iter()
        .max_by_key(|m| m.timestamp)
        .expect("clusters are never empty");

    let mut entities: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for member in members {
        for entity in &member.entities {
            if seen.insert(entity.clone()) {
                entities.push(entity.clone());
            }
        }
    }

    MemoryNode {
        id: MemoryId::generate(),
        owner_id: owner.to_string(),
        session_id: newest.session_id.clone(),
        content: summary.to_string(),
        embedding,
        valence: (valence / total_weight) as f32,
        arousal: (arousal / total_weight) as f32,
        dominance: (dominance / total_weight) as f32,
        emotional_weight: (emotional_weight / total_weight) as f32,
        category: dominant_category(members),
        importance: members
            .iter()
            .map(|m| m.importance)
            .fold(0.0, f32::max),
        timestamp: now,
        retention_strength: 1.0,
        access_count: 0,
        last_accessed: now,
        memory_type: MemoryType::Semantic,
        status: MemoryStatus::Active,
        entities,
    }
}

fn average_embedding(members: &[SharedNode]) -> Option<Vec<f32>> {
    let vectors: Vec<&Vec<f32>> = members.iter().filter_map(|m| m.embedding.as_ref()).collect();
    let first_len = vectors.first()?.len();
    let usable: Vec<&Vec<f32>> = vectors.into_iter().filter(|v| v.len() == first_len).collect();

    let mut avg = vec![0.0f32; first_len];
    for vector in &usable {
        for (slot, value) in avg.iter_mut().zip(vector.iter()) {
            *slot += value;
        }
    }
    let n = usable.len() as f32;
    for slot in &mut avg {
        *slot /= n;
    }
    Some(avg)
}

fn dominant_category(members: &[SharedNode]) -> EmotionCategory {
    use std::collections::HashMap;
    let mut counts: HashMap<EmotionCategory, usize> = HashMap::new();
    for member in members {
        *counts.entry(member.category).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(category, _)| category)
        .unwrap_or(EmotionCategory::Neutral)
}
