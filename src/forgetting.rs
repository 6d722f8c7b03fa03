//! Decay-based forgetting
//!
//! Periodic sweep over every stored memory (active and archived alike)
//! recomputing retention strength and hard-deleting what has decayed below
//! the delete threshold. Retention follows the documented curve:
//!
//! ```text
//! retention = exp(-decay_rate × hours_since_access)
//!           × (1 + emotional_weight × boost_factor)
//!           × (1 + 0.1 × access_count)
//! ```
//!
//! clamped to [0, 1]. Emotionally heavy and frequently recalled memories
//! persist; stale neutral ones disappear along with their incident edges.
//!
//! Failures are isolated per node: a malformed record is skipped with a log
//! line and the sweep carries on. Node updates replace the whole record
//! atomically, so concurrent readers never observe a half-updated memory.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::constants::ACCESS_RETENTION_BONUS;
use crate::store::{MemoryNode, MemoryStore};

/// Outcome of one sweep
#[derive(Debug, Default, Clone, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub updated: usize,
    pub deleted: usize,
    pub errors: usize,
}

/// Recompute retention for one node at the given instant
pub fn compute_retention(node: &MemoryNode, now: DateTime<Utc>, config: &EngineConfig) -> f32 {
    let hours_elapsed = (now - node.last_accessed).num_minutes() as f32 / 60.0;
    let hours_elapsed = hours_elapsed.max(0.0);

    let decay = (-config.decay_rate * hours_elapsed).exp();
    let emotional_boost = 1.0 + node.emotional_weight * config.boost_factor;
    let access_boost = 1.0 + ACCESS_RETENTION_BONUS * node.access_count as f32;

    (decay * emotional_boost * access_boost).clamp(0.0, 1.0)
}

/// Run one forgetting sweep over the whole store
///
/// Never fails wholesale; per-node problems are counted and logged.
pub fn run_sweep(store: &MemoryStore, config: &EngineConfig) -> SweepReport {
    let now = Utc::now();
    let mut report = SweepReport::default();

    for node in store.sweep_targets() {
        report.scanned += 1;

        // A node that no longer satisfies the schema must not abort the
        // sweep; it is deleted like any fully decayed memory would be
        if let Err(e) = node.validate() {
            tracing::warn!(memory_id = %node.id, error = %e, "deleting malformed node");
            match store.delete(&node.id) {
                Ok(()) => report.deleted += 1,
                Err(_) => report.errors += 1,
            }
            continue;
        }

        let retention = compute_retention(&node, now, config);

        if retention < config.delete_threshold {
            match store.delete(&node.id) {
                Ok(()) => {
                    tracing::debug!(
                        memory_id = %node.id,
                        retention,
                        "memory forgotten"
                    );
                    report.deleted += 1;
                }
                Err(e) => {
                    tracing::warn!(memory_id = %node.id, error = %e, "failed to delete");
                    report.errors += 1;
                }
            }
        } else {
            match store.update_retention(&node.id, retention) {
                Ok(()) => report.updated += 1,
                Err(e) => {
                    tracing::warn!(memory_id = %node.id, error = %e, "failed to update retention");
                    report.errors += 1;
                }
            }
        }
    }

    tracing::info!(
        scanned = report.scanned,
        updated = report.updated,
        deleted = report.deleted,
        errors = report.errors,
        "forgetting sweep finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::{EmotionCategory, EmotionalState};
    use crate::store::MemoryNode;
    use chrono::Duration;

    fn node_with(emotional_weight: f32, access_count: u32, hours_old: i64) -> MemoryNode {
        let state = EmotionalState::from_vad(EmotionCategory::Joy, 0.8, 0.6, 0.7);
        let mut node = MemoryNode::episodic("alice", "s1", "recuerdo", None, &state, 0.5);
        node.emotional_weight = emotional_weight;
        node.access_count = access_count;
        node.last_accessed = Utc::now() - Duration::hours(hours_old);
        node
    }

    #[test]
    fn test_retention_clamped_to_unit_interval() {
        let config = EngineConfig::default();
        let fresh = node_with(1.0, 50, 0);
        let retention = compute_retention(&fresh, Utc::now(), &config);
        assert!(retention <= 1.0);
        assert!(retention >= 0.0);
    }

    #[test]
    fn test_higher_emotional_weight_retains_more() {
        let config = EngineConfig::default();
        let now = Utc::now();
        let heavy = node_with(0.9, 0, 200);
        let light = node_with(0.1, 0, 200);

        let r_heavy = compute_retention(&heavy, now, &config);
        let r_light = compute_retention(&light, now, &config);
        assert!(r_heavy > r_light);
    }

    #[test]
    fn test_access_count_boosts_retention() {
        let config = EngineConfig::default();
        let now = Utc::now();
        let recalled = node_with(0.5, 10, 400);
        let untouched = node_with(0.5, 0, 400);

        assert!(compute_retention(&recalled, now, &config) > compute_retention(&untouched, now, &config));
    }

    #[test]
    fn test_retention_decays_with_time() {
        let config = EngineConfig::default();
        let now = Utc::now();
        let young = node_with(0.3, 0, 10);
        let old = node_with(0.3, 0, 500);

        assert!(compute_retention(&young, now, &config) > compute_retention(&old, now, &config));
    }
}
