//! Spreading-activation retrieval
//!
//! Relevance propagates outward from similarity-selected seed nodes through
//! the relationship graph, decaying per hop and modulated by emotional
//! distance from the query. Traversal is bounded breadth-first iteration
//! over the adjacency lists - cycles are handled with a visited set, never
//! recursion.
//!
//! The emotional modifier `1 + |Δvalence| × sensitivity` amplifies
//! activation with emotional *distance*. That inverts the usual
//! more-similar-is-more-relevant intuition on purpose (contrasting memories
//! carry signal for the companion); see the constants module before
//! "fixing" it.

use std::collections::{HashMap, HashSet};

use crate::config::EngineConfig;
use crate::emotion::EmotionalState;
use crate::errors::Result;
use crate::store::{MemoryId, MemoryStatus, MemoryStore, SharedNode};

/// A memory with its final activation score
#[derive(Debug, Clone)]
pub struct ActivatedMemory {
    pub node: SharedNode,
    pub activation: f32,
    /// Hop distance from the seed set (0 = seeded directly)
    pub depth: u8,
}

/// Retrieve relevant memories for a query via spreading activation
///
/// Steps: seed by embedding similarity scoped to the owner, propagate up to
/// `max_hops`, filter below `activation_threshold`, rank by activation with
/// recency tie-break, truncate to `max_results`. An empty seed set returns
/// an empty list, not an error. Every returned memory is touched
/// (access count and last-accessed update).
pub fn retrieve(
    store: &MemoryStore,
    config: &EngineConfig,
    owner: &str,
    query_embedding: &[f32],
    query_state: &EmotionalState,
) -> Result<Vec<ActivatedMemory>> {
    // Step 1: seed by similarity; initial activation blends similarity with
    // emotional alignment to the query
    let seeds = store.nearest_by_embedding(query_embedding, owner, config.seed_k);
    if seeds.is_empty() {
        tracing::debug!(owner, "no seed nodes for query");
        return Ok(Vec::new());
    }

    let mut activation: HashMap<MemoryId, f32> = HashMap::new();
    let mut depth: HashMap<MemoryId, u8> = HashMap::new();
    let mut frontier: Vec<MemoryId> = Vec::new();

    for (node, similarity) in &seeds {
        let alignment = query_state.alignment(&node.emotional_state());
        let initial = similarity * alignment;
        if initial <= 0.0 {
            continue;
        }
        activation.insert(node.id.clone(), initial);
        depth.insert(node.id.clone(), 0);
        frontier.push(node.id.clone());
    }

    // Step 2: breadth-limited propagation. Each node spreads at most once;
    // a neighbor accumulates contributions from every parent that reaches it.
    let mut spread_from: HashSet<MemoryId> = HashSet::new();

    for hop in 1..=config.max_hops {
        let mut next_frontier: Vec<MemoryId> = Vec::new();

        for id in std::mem::take(&mut frontier) {
            if !spread_from.insert(id.clone()) {
                continue;
            }
            let parent_activation = match activation.get(&id) {
                Some(a) => *a,
                None => continue,
            };

            for (neighbor_id, edge) in store.neighbors(&id) {
                let neighbor = match store.get(&neighbor_id) {
                    Ok(n) => n,
                    // A neighbor deleted mid-traversal is simply unreachable
                    Err(_) => continue,
                };
                if neighbor.status == MemoryStatus::Archived {
                    continue;
                }

                let emotional_modifier = 1.0
                    + (query_state.valence - neighbor.valence).abs()
                        * config.emotional_sensitivity;
                let contribution =
                    parent_activation * edge.weight * config.decay_factor * emotional_modifier;
                if contribution <= 0.0 {
                    continue;
                }

                *activation.entry(neighbor_id.clone()).or_insert(0.0) += contribution;
                depth.entry(neighbor_id.clone()).or_insert(hop);
                if !spread_from.contains(&neighbor_id) {
                    next_frontier.push(neighbor_id);
                }
            }
        }

        if next_frontier.is_empty() {
            break;
        }
        next_frontier.sort();
        next_frontier.dedup();
        frontier = next_frontier;
    }

    // Step 3: threshold filter
    let mut results: Vec<ActivatedMemory> = activation
        .into_iter()
        .filter(|(_, act)| *act >= config.activation_threshold)
        .filter_map(|(id, act)| {
            let node = store.get(&id).ok()?;
            if node.status == MemoryStatus::Archived {
                return None;
            }
            Some(ActivatedMemory {
                depth: depth.get(&id).copied().unwrap_or(0),
                node,
                activation: act,
            })
        })
        .collect();

    // Step 4: rank by activation, most recent first among ties
    results.sort_by(|a, b| {
        b.activation
            .partial_cmp(&a.activation)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.node.timestamp.cmp(&a.node.timestamp))
    });
    results.truncate(config.max_results);

    // Retrieval access mutates the node (access count, last accessed);
    // failures here must not break the read path
    for activated in &results {
        if let Err(e) = store.touch(&activated.node.id) {
            tracing::warn!(memory_id = %activated.node.id, error = %e, "failed to record access");
        }
    }

    tracing::debug!(
        owner,
        seeds = seeds.len(),
        returned = results.len(),
        "spreading activation completed"
    );
    Ok(results)
}
