//! Consolidation Engine Tests
//!
//! Tests for episodic → semantic consolidation:
//! - Cluster threshold gating
//! - Semantic node synthesis and CONSOLIDATED_FROM linking
//! - Contributor archival (not deletion)
//! - Idempotence across repeated runs
//! - Per-cluster failure isolation when summarization is unavailable

use async_trait::async_trait;
use memoria::config::EngineConfig;
use memoria::consolidation::ConsolidationEngine;
use memoria::emotion::{EmotionCategory, EmotionalState};
use memoria::generation::{FallbackResponder, GenerationContext, Generator};
use memoria::store::{MemoryNode, MemoryStatus, MemoryStore, MemoryType, RelationKind};
use std::sync::Arc;
use tempfile::TempDir;

fn setup() -> (Arc<MemoryStore>, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let store = Arc::new(MemoryStore::open(dir.path()).expect("open store"));
    (store, dir)
}

fn episode(owner: &str, content: &str, embedding: Vec<f32>) -> MemoryNode {
    let state = EmotionalState::from_vad(EmotionCategory::Joy, 0.8, 0.6, 0.7);
    MemoryNode::episodic(owner, "s1", content, Some(embedding), &state, 0.6)
}

fn engine_with(store: &Arc<MemoryStore>, generator: Arc<dyn Generator>) -> ConsolidationEngine {
    ConsolidationEngine::new(store.clone(), generator)
}

fn semantic_nodes(store: &MemoryStore, owner: &str) -> Vec<memoria::store::SharedNode> {
    store
        .sweep_targets()
        .into_iter()
        .filter(|n| n.owner_id == owner && n.memory_type == MemoryType::Semantic)
        .collect()
}

#[tokio::test]
async fn test_below_threshold_creates_nothing() {
    let (store, _dir) = setup();
    let config = EngineConfig::default();
    let engine = engine_with(&store, Arc::new(FallbackResponder));

    // Only two similar episodes: one short of the documented threshold
    store
        .create(episode("alice", "fui al gimnasio por la mañana", vec![1.0, 0.0]))
        .unwrap();
    store
        .create(episode("alice", "fui al gimnasio otra vez", vec![1.0, 0.0]))
        .unwrap();

    let report = engine.consolidate_owner("alice", &config).await;

    assert_eq!(report.clusters_found, 0);
    assert_eq!(report.semantic_created, 0);
    assert!(semantic_nodes(&store, "alice").is_empty());
}

#[tokio::test]
async fn test_qualifying_cluster_consolidates() {
    let (store, _dir) = setup();
    let config = EngineConfig::default();
    let engine = engine_with(&store, Arc::new(FallbackResponder));

    let ids = vec![
        store
            .create(episode("alice", "fui al gimnasio el lunes", vec![1.0, 0.0]))
            .unwrap(),
        store
            .create(episode("alice", "fui al gimnasio el miércoles", vec![1.0, 0.0]))
            .unwrap(),
        store
            .create(episode("alice", "fui al gimnasio el viernes", vec![1.0, 0.0]))
            .unwrap(),
    ];

    let report = engine.consolidate_owner("alice", &config).await;

    assert_eq!(report.clusters_found, 1);
    assert_eq!(report.semantic_created, 1);
    assert_eq!(report.episodes_archived, 3);
    assert!(report.errors.is_empty());

    // One semantic node exists, carrying the averaged emotion
    let semantics = semantic_nodes(&store, "alice");
    assert_eq!(semantics.len(), 1);
    let semantic = &semantics[0];
    assert_eq!(semantic.status, MemoryStatus::Active);
    assert!((semantic.valence - 0.8).abs() < 0.01);
    assert!(semantic.embedding.is_some());

    // Every contributor is archived and linked via CONSOLIDATED_FROM
    for id in &ids {
        let node = store.get(id).unwrap();
        assert_eq!(node.status, MemoryStatus::Archived);

        let consolidated_edges: Vec<_> = store
            .neighbors(id)
            .into_iter()
            .filter(|(_, e)| e.kind == RelationKind::ConsolidatedFrom)
            .collect();
        assert_eq!(consolidated_edges.len(), 1);
        assert_eq!(consolidated_edges[0].0, semantic.id);
    }
}

#[tokio::test]
async fn test_running_twice_is_idempotent() {
    let (store, _dir) = setup();
    let config = EngineConfig::default();
    let engine = engine_with(&store, Arc::new(FallbackResponder));

    for day in ["lunes", "miércoles", "viernes"] {
        store
            .create(episode(
                "alice",
                &format!("fui al gimnasio el {day}"),
                vec![1.0, 0.0],
            ))
            .unwrap();
    }

    let first = engine.consolidate_owner("alice", &config).await;
    let second = engine.consolidate_owner("alice", &config).await;

    assert_eq!(first.semantic_created, 1);
    assert_eq!(second.semantic_created, 0);
    assert_eq!(semantic_nodes(&store, "alice").len(), 1);
}

#[tokio::test]
async fn test_entity_overlap_clusters_without_embedding_agreement() {
    let (store, _dir) = setup();
    let config = EngineConfig::default();
    let engine = engine_with(&store, Arc::new(FallbackResponder));

    // Orthogonal embeddings, but every episode shares the same two entities
    store
        .create(episode(
            "alice",
            "estudiamos con Marta en la universidad",
            vec![1.0, 0.0, 0.0],
        ))
        .unwrap();
    store
        .create(episode(
            "alice",
            "vi a Marta saliendo de la universidad",
            vec![0.0, 1.0, 0.0],
        ))
        .unwrap();
    store
        .create(episode(
            "alice",
            "hablé con Marta sobre la universidad",
            vec![0.0, 0.0, 1.0],
        ))
        .unwrap();

    let report = engine.consolidate_owner("alice", &config).await;

    assert_eq!(report.clusters_found, 1);
    assert_eq!(report.semantic_created, 1);
}

#[tokio::test]
async fn test_unrelated_episodes_stay_unconsolidated() {
    let (store, _dir) = setup();
    let config = EngineConfig::default();
    let engine = engine_with(&store, Arc::new(FallbackResponder));

    store
        .create(episode("alice", "desayuné tostadas", vec![1.0, 0.0, 0.0]))
        .unwrap();
    store
        .create(episode("alice", "perdí el autobús", vec![0.0, 1.0, 0.0]))
        .unwrap();
    store
        .create(episode("alice", "llamé al médico", vec![0.0, 0.0, 1.0]))
        .unwrap();

    let report = engine.consolidate_owner("alice", &config).await;
    assert_eq!(report.clusters_found, 0);
    assert!(semantic_nodes(&store, "alice").is_empty());
}

struct UnavailableGenerator;

#[async_trait]
impl Generator for UnavailableGenerator {
    async fn respond(&self, _context: &GenerationContext) -> anyhow::Result<String> {
        anyhow::bail!("model offline")
    }

    async fn summarize(&self, _contents: &[String]) -> anyhow::Result<String> {
        anyhow::bail!("model offline")
    }
}

#[tokio::test]
async fn test_summarization_failure_skips_cluster_and_releases_members() {
    let (store, _dir) = setup();
    let config = EngineConfig::default();
    let engine = engine_with(&store, Arc::new(UnavailableGenerator));

    let ids = vec![
        store
            .create(episode("alice", "cena con la familia", vec![1.0, 0.0]))
            .unwrap(),
        store
            .create(episode("alice", "cena con la familia otra vez", vec![1.0, 0.0]))
            .unwrap(),
        store
            .create(episode("alice", "tercera cena con la familia", vec![1.0, 0.0]))
            .unwrap(),
    ];

    let report = engine.consolidate_owner("alice", &config).await;

    assert_eq!(report.semantic_created, 0);
    assert_eq!(report.errors.len(), 1);

    // Members released back to Active so the next cycle can retry
    for id in &ids {
        assert_eq!(store.get(id).unwrap().status, MemoryStatus::Active);
    }

    // The next cycle with a working generator succeeds
    let retry_engine = engine_with(&store, Arc::new(FallbackResponder));
    let retry = retry_engine.consolidate_owner("alice", &config).await;
    assert_eq!(retry.semantic_created, 1);
}

#[tokio::test]
async fn test_consolidation_scoped_per_owner() {
    let (store, _dir) = setup();
    let config = EngineConfig::default();
    let engine = engine_with(&store, Arc::new(FallbackResponder));

    for i in 0..3 {
        store
            .create(episode("alice", &format!("rutina {i}"), vec![1.0, 0.0]))
            .unwrap();
        store
            .create(episode("bob", &format!("rutina {i}"), vec![1.0, 0.0]))
            .unwrap();
    }

    engine.consolidate_owner("alice", &config).await;

    assert_eq!(semantic_nodes(&store, "alice").len(), 1);
    assert!(semantic_nodes(&store, "bob").is_empty());
}
