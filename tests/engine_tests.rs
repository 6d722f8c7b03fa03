//! End-to-end engine tests
//!
//! Exercise the full exchange pipeline: emotional scoring, semantic cache
//! short-circuiting (verified by generator call counts), importance-gated
//! storage, relationship linking, per-session debouncing, and the
//! graduation scenario from classification through ranked recall.

use async_trait::async_trait;
use memoria::config::{ConfigHandle, EngineConfig};
use memoria::engine::{Engine, ExchangeRequest};
use memoria::generation::{GenerationContext, Generator};
use memoria::store::{MemoryStore, RelationKind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Notify;

/// Generator that counts calls and tracks concurrency
struct CountingGenerator {
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    /// When set, the first respond() call blocks until released
    block_first: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl CountingGenerator {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            block_first: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    fn blocking_first() -> Self {
        let generator = Self::new();
        generator.block_first.store(true, Ordering::SeqCst);
        generator
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for CountingGenerator {
    async fn respond(&self, context: &GenerationContext) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        if self.block_first.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(format!("claro, hablemos de: {}", context.user_message))
    }

    async fn summarize(&self, contents: &[String]) -> anyhow::Result<String> {
        Ok(format!("patrón de {} episodios", contents.len()))
    }
}

fn setup(generator: Arc<CountingGenerator>) -> (Arc<Engine>, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let store = Arc::new(MemoryStore::open(dir.path()).expect("open store"));
    let config = ConfigHandle::new(EngineConfig::default());
    let engine = Arc::new(Engine::new(
        store,
        generator,
        config,
        "compañera cercana y cálida",
    ));
    (engine, dir)
}

fn request(message: &str, embedding: Option<Vec<f32>>) -> ExchangeRequest {
    ExchangeRequest {
        owner_id: "maria".to_string(),
        session_id: "s1".to_string(),
        message: message.to_string(),
        embedding,
    }
}

#[tokio::test]
async fn test_semantic_cache_short_circuits_generation() {
    let generator = Arc::new(CountingGenerator::new());
    let (engine, _dir) = setup(generator.clone());
    let embedding = vec![1.0, 0.0, 0.0];

    let first = engine
        .process_exchange(request("qué tal el día", Some(embedding.clone())))
        .await
        .unwrap();
    assert!(!first.from_cache);
    assert_eq!(generator.calls(), 1);

    // Near-duplicate query: cached response, no second generation
    let second = engine
        .process_exchange(request("qué tal el día", Some(embedding)))
        .await
        .unwrap();
    assert!(second.from_cache);
    assert_eq!(second.response, first.response);
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_cache_miss_always_invokes_full_pipeline() {
    let generator = Arc::new(CountingGenerator::new());
    let (engine, _dir) = setup(generator.clone());

    engine
        .process_exchange(request("qué tal el día", Some(vec![1.0, 0.0, 0.0])))
        .await
        .unwrap();
    assert_eq!(generator.calls(), 1);

    // Orthogonal embedding: blended score falls under the hit threshold
    let miss = engine
        .process_exchange(request("cuéntame de tu familia", Some(vec![0.0, 1.0, 0.0])))
        .await
        .unwrap();
    assert!(!miss.from_cache);
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn test_unimportant_exchange_not_stored() {
    let generator = Arc::new(CountingGenerator::new());
    let (engine, _dir) = setup(generator.clone());

    let outcome = engine
        .process_exchange(request("ok", Some(vec![1.0, 0.0])))
        .await
        .unwrap();

    assert!(outcome.response.is_some());
    assert!(outcome.memory_id.is_none());
    assert_eq!(engine.store().total_count(), 0);
}

#[tokio::test]
async fn test_emotional_exchange_stored_and_linked_temporally() {
    let generator = Arc::new(CountingGenerator::new());
    let (engine, _dir) = setup(generator.clone());

    let first = engine
        .process_exchange(request(
            "Estoy muy feliz, me gradué",
            Some(vec![1.0, 0.0, 0.0]),
        ))
        .await
        .unwrap();
    let first_id = first.memory_id.expect("emotional exchange stored");

    let second = engine
        .process_exchange(request(
            "Estoy muy feliz con mi nueva casa",
            Some(vec![0.0, 1.0, 0.0]),
        ))
        .await
        .unwrap();
    let second_id = second.memory_id.expect("second exchange stored");

    let temporal: Vec<_> = engine
        .store()
        .neighbors(&second_id)
        .into_iter()
        .filter(|(_, e)| e.kind == RelationKind::TemporallyRelated)
        .collect();

    assert_eq!(temporal.len(), 1);
    assert_eq!(temporal[0].0, first_id);
}

#[tokio::test]
async fn test_graduation_scenario_end_to_end() {
    let generator = Arc::new(CountingGenerator::new());
    let (engine, _dir) = setup(generator.clone());

    // High-valence exchange becomes a memory with the documented joy VAD
    let outcome = engine
        .process_exchange(request(
            "Estoy muy feliz, me gradué",
            Some(vec![1.0, 0.0, 0.0]),
        ))
        .await
        .unwrap();

    assert_eq!(outcome.emotional_state.category.as_str(), "joy");
    let memory_id = outcome.memory_id.expect("graduation stored");

    let node = engine.store().get(&memory_id).unwrap();
    assert!((node.valence - 0.8).abs() < 0.05);
    assert!((node.arousal - 0.6).abs() < 0.05);
    assert!((node.dominance - 0.7).abs() < 0.05);

    // A later related query seeds the node (similarity > 0) and its final
    // activation clears the inclusion threshold
    let results = engine
        .recall(
            "maria",
            "cómo te fue en la universidad",
            &[0.9, 0.43589, 0.0],
        )
        .unwrap();

    let hit = results
        .iter()
        .find(|r| r.node.id == memory_id)
        .expect("graduation memory recalled");
    assert!(hit.activation > 0.3);
}

#[tokio::test]
async fn test_concurrent_messages_extend_pending_batch() {
    let generator = Arc::new(CountingGenerator::blocking_first());
    let (engine, _dir) = setup(generator.clone());

    // First message blocks inside generation
    let engine_a = engine.clone();
    let in_flight = tokio::spawn(async move {
        engine_a
            .process_exchange(request("primer mensaje de una historia larga", None))
            .await
    });
    generator.entered.notified().await;

    // Second message for the same session while one is in flight: folded
    // into the pending batch, no concurrent generation
    let batched = engine
        .process_exchange(request("segundo mensaje que llega enseguida", None))
        .await
        .unwrap();
    assert!(batched.batched);
    assert!(batched.response.is_none());

    generator.release.notify_one();
    let first = in_flight.await.unwrap().unwrap();
    assert!(first.response.is_some());

    // The in-flight worker drained the second message as its own batch:
    // two generations total, never more than one at a time
    assert_eq!(generator.calls(), 2);
    assert_eq!(generator.max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_sessions_process_in_parallel() {
    let generator = Arc::new(CountingGenerator::new());
    let (engine, _dir) = setup(generator.clone());

    let mut handles = Vec::new();
    for session in ["s1", "s2", "s3"] {
        let engine = engine.clone();
        let session = session.to_string();
        handles.push(tokio::spawn(async move {
            engine
                .process_exchange(ExchangeRequest {
                    owner_id: "maria".to_string(),
                    session_id: session,
                    message: "hola, cuéntame algo".to_string(),
                    embedding: None,
                })
                .await
        }));
    }

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert!(outcome.response.is_some());
    }
    assert_eq!(generator.calls(), 3);
}

#[tokio::test]
async fn test_invalid_input_rejected_before_pipeline() {
    let generator = Arc::new(CountingGenerator::new());
    let (engine, _dir) = setup(generator.clone());

    let bad_owner = engine
        .process_exchange(ExchangeRequest {
            owner_id: "has spaces".to_string(),
            session_id: "s1".to_string(),
            message: "hola".to_string(),
            embedding: None,
        })
        .await;
    assert!(bad_owner.is_err());

    let empty_message = engine.process_exchange(request("   ", None)).await;
    assert!(empty_message.is_err());

    let bad_embedding = engine
        .process_exchange(request("hola", Some(vec![f32::NAN])))
        .await;
    assert!(bad_embedding.is_err());

    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_coherence_input_supplies_related_memories() {
    let generator = Arc::new(CountingGenerator::new());
    let (engine, _dir) = setup(generator.clone());

    engine
        .process_exchange(request(
            "Estoy muy feliz, me gradué de la universidad",
            Some(vec![1.0, 0.0, 0.0]),
        ))
        .await
        .unwrap();

    let input = engine
        .coherence_input(
            "maria",
            "¡Enhorabuena por tu graduación!",
            &[0.95, 0.3122, 0.0],
        )
        .unwrap();

    assert_eq!(input.candidate_response, "¡Enhorabuena por tu graduación!");
    assert!(!input.related_memories.is_empty());
}
