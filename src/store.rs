//! Graph-structured persistent memory store
//!
//! Memories are nodes in a cyclic graph connected by typed, weighted
//! relationships. The graph is held as an arena keyed by opaque ids with
//! explicit adjacency lists - never native recursive object cycles - and
//! persisted to RocksDB (one database for nodes, one for edges) with the
//! in-memory indexes rebuilt on startup.
//!
//! Concurrency model: reads go straight to the concurrent maps without
//! locking. Structural mutations (create, link, archive, delete, field
//! updates) take a short-lived per-owner lock, never a global one, so
//! different owners always proceed in parallel. Node records are replaced
//! wholesale behind `Arc`, so a reader holding a node never observes a
//! partial update.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rocksdb::{IteratorMode, Options, DB};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::emotion::{EmotionCategory, EmotionalState};
use crate::errors::{AppError, Result};
use crate::similarity::cosine_similarity;

/// Unique identifier for memories
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)] // Serialize as plain UUID string, not array
pub struct MemoryId(pub Uuid);

impl MemoryId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared memory reference for zero-copy retrieval
///
/// `Arc<MemoryNode>` instead of `MemoryNode` avoids cloning the embedding
/// vector (384 floats ≈ 1.5KB) on every retrieval hop.
pub type SharedNode = Arc<MemoryNode>;

/// Memory kind: one concrete exchange vs. consolidated general knowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryType {
    Episodic,
    Semantic,
}

/// Lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryStatus {
    Active,
    Consolidating,
    /// Excluded from retrieval but retained for audit until the forgetting
    /// sweep hard-deletes it
    Archived,
}

/// One memory node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryNode {
    pub id: MemoryId,
    pub owner_id: String,
    pub session_id: String,
    pub content: String,

    /// Fixed-dimension embedding; absent nodes cannot seed retrieval but
    /// remain reachable through graph traversal
    pub embedding: Option<Vec<f32>>,

    pub valence: f32,
    pub arousal: f32,
    pub dominance: f32,

    /// Derived emotional intensity, boosts retention
    pub emotional_weight: f32,

    /// Dominant emotion at creation time
    pub category: EmotionCategory,

    /// Storage-gating importance score
    pub importance: f32,

    pub timestamp: DateTime<Utc>,
    pub retention_strength: f32,
    pub access_count: u32,
    pub last_accessed: DateTime<Utc>,
    pub memory_type: MemoryType,
    pub status: MemoryStatus,

    /// Entities extracted from the content (feeds consolidation clustering)
    #[serde(default)]
    pub entities: Vec<String>,
}

impl MemoryNode {
    /// Build a fresh episodic node from one exchange
    pub fn episodic(
        owner_id: &str,
        session_id: &str,
        content: &str,
        embedding: Option<Vec<f32>>,
        state: &EmotionalState,
        importance: f32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: MemoryId::generate(),
            owner_id: owner_id.to_string(),
            session_id: session_id.to_string(),
            content: content.to_string(),
            embedding,
            valence: state.valence,
            arousal: state.arousal,
            dominance: state.dominance,
            emotional_weight: state.intensity(),
            category: state.category,
            importance: importance.clamp(0.0, 1.0),
            timestamp: now,
            retention_strength: 1.0,
            access_count: 0,
            last_accessed: now,
            memory_type: MemoryType::Episodic,
            status: MemoryStatus::Active,
            entities: extract_entities(content),
        }
    }

    /// Reconstruct the emotional state carried by this node
    pub fn emotional_state(&self) -> EmotionalState {
        EmotionalState::from_vad(self.category, self.valence, self.arousal, self.dominance)
    }

    /// Check field invariants; violations make the node a schema violation
    /// that batch jobs skip rather than abort on
    pub fn validate(&self) -> Result<()> {
        if !(-1.0..=1.0).contains(&self.valence)
            || !(0.0..=1.0).contains(&self.arousal)
            || !(0.0..=1.0).contains(&self.dominance)
        {
            return Err(AppError::SchemaViolation(format!(
                "memory {} has VAD out of range",
                self.id
            )));
        }
        if !(0.0..=1.0).contains(&self.retention_strength) {
            return Err(AppError::SchemaViolation(format!(
                "memory {} has retention {} out of range",
                self.id, self.retention_strength
            )));
        }
        if self.owner_id.is_empty() {
            return Err(AppError::SchemaViolation(format!(
                "memory {} has empty owner",
                self.id
            )));
        }
        Ok(())
    }
}

/// Relationship kinds between memories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    EmotionallySimilar,
    TemporallyRelated,
    SemanticallyRelated,
    /// Semantic node → contributing episodic node; the only directed kind
    ConsolidatedFrom,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmotionallySimilar => "EMOTIONALLY_SIMILAR",
            Self::TemporallyRelated => "TEMPORALLY_RELATED",
            Self::SemanticallyRelated => "SEMANTICALLY_RELATED",
            Self::ConsolidatedFrom => "CONSOLIDATED_FROM",
        }
    }

    /// Symmetric kinds are canonicalized on storage so (a,b) and (b,a)
    /// merge into one edge
    pub fn is_symmetric(&self) -> bool {
        !matches!(self, Self::ConsolidatedFrom)
    }
}

/// Typed weighted edge between two memories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub from: MemoryId,
    pub to: MemoryId,
    pub kind: RelationKind,

    /// Traversal weight, [0,1]
    pub weight: f32,

    /// Embedding or emotional similarity where applicable, [0,1]
    pub similarity: f32,

    /// Temporal distance for TemporallyRelated edges, hours
    pub time_distance_hours: f32,

    pub created_at: DateTime<Utc>,
}

impl Relation {
    /// The opposite endpoint, for undirected traversal
    pub fn other(&self, id: &MemoryId) -> &MemoryId {
        if &self.from == id {
            &self.to
        } else {
            &self.from
        }
    }
}

/// Graph store: arena of nodes plus adjacency lists per node
pub struct MemoryStore {
    nodes_db: DB,
    edges_db: DB,

    /// In-memory arena; authoritative for reads, mirrored to RocksDB
    nodes: DashMap<MemoryId, SharedNode>,

    /// Adjacency: every edge appears under both endpoints
    adjacency: DashMap<MemoryId, Vec<Arc<Relation>>>,

    /// Owner → node ids, for scoped similarity lookup and sweeps
    owner_nodes: DashMap<String, HashSet<MemoryId>>,

    /// Short-lived structural locks, scoped per owner
    owner_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MemoryStore {
    /// Open (or create) the store under the given directory
    pub fn open(path: &Path) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let nodes_db = DB::open(&opts, path.join("nodes"))?;
        let edges_db = DB::open(&opts, path.join("edges"))?;

        let store = Self {
            nodes_db,
            edges_db,
            nodes: DashMap::new(),
            adjacency: DashMap::new(),
            owner_nodes: DashMap::new(),
            owner_locks: DashMap::new(),
        };

        store.load_nodes();
        store.load_edges();

        tracing::info!(
            nodes = store.nodes.len(),
            owners = store.owner_nodes.len(),
            "memory store opened"
        );
        Ok(store)
    }

    /// Rebuild the node arena from disk, skipping malformed records
    fn load_nodes(&self) {
        let mut skipped = 0usize;
        for item in self.nodes_db.iterator(IteratorMode::Start) {
            let (key, value) = match item {
                Ok(kv) => kv,
                Err(e) => {
                    tracing::warn!("node iterator error (continuing): {e}");
                    continue;
                }
            };
            match bincode::deserialize::<MemoryNode>(&value) {
                Ok(node) if node.validate().is_ok() => {
                    self.owner_nodes
                        .entry(node.owner_id.clone())
                        .or_default()
                        .insert(node.id.clone());
                    self.nodes.insert(node.id.clone(), Arc::new(node));
                }
                Ok(node) => {
                    tracing::warn!(memory_id = %node.id, "skipping node with invalid fields");
                    skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(key = ?key, "skipping undecodable node record: {e}");
                    skipped += 1;
                }
            }
        }
        if skipped > 0 {
            tracing::warn!(skipped, "some persisted nodes were skipped on load");
        }
    }

    /// Rebuild adjacency from disk; edges to missing nodes are dropped
    fn load_edges(&self) {
        for item in self.edges_db.iterator(IteratorMode::Start) {
            let (key, value) = match item {
                Ok(kv) => kv,
                Err(e) => {
                    tracing::warn!("edge iterator error (continuing): {e}");
                    continue;
                }
            };
            match bincode::deserialize::<Relation>(&value) {
                Ok(edge) => {
                    if !self.nodes.contains_key(&edge.from) || !self.nodes.contains_key(&edge.to) {
                        tracing::debug!(key = ?key, "dropping edge with missing endpoint");
                        let _ = self.edges_db.delete(&key);
                        continue;
                    }
                    self.index_edge(Arc::new(edge));
                }
                Err(e) => {
                    tracing::warn!(key = ?key, "skipping undecodable edge record: {e}");
                }
            }
        }
    }

    fn owner_lock(&self, owner: &str) -> Arc<Mutex<()>> {
        self.owner_locks
            .entry(owner.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn persist_node(&self, node: &MemoryNode) -> Result<()> {
        let bytes = bincode::serialize(node)?;
        self.nodes_db.put(node.id.0.as_bytes(), bytes)?;
        Ok(())
    }

    fn edge_key(a: &MemoryId, b: &MemoryId, kind: RelationKind) -> Vec<u8> {
        let mut key = Vec::with_capacity(34 + kind.as_str().len());
        key.extend_from_slice(a.0.as_bytes());
        key.push(b':');
        key.extend_from_slice(b.0.as_bytes());
        key.push(b':');
        key.extend_from_slice(kind.as_str().as_bytes());
        key
    }

    fn index_edge(&self, edge: Arc<Relation>) {
        for endpoint in [&edge.from, &edge.to] {
            let mut adj = self.adjacency.entry(endpoint.clone()).or_default();
            // Replace an existing edge of the same (from, to, kind) triple
            if let Some(slot) = adj
                .iter_mut()
                .find(|e| e.from == edge.from && e.to == edge.to && e.kind == edge.kind)
            {
                *slot = edge.clone();
            } else {
                adj.push(edge.clone());
            }
        }
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Store a new memory node
    pub fn create(&self, node: MemoryNode) -> Result<MemoryId> {
        node.validate()?;
        if self.nodes.contains_key(&node.id) {
            return Err(AppError::SchemaViolation(format!(
                "memory id {} already exists",
                node.id
            )));
        }

        let lock = self.owner_lock(&node.owner_id);
        let _guard = lock.lock();

        self.persist_node(&node)?;
        self.owner_nodes
            .entry(node.owner_id.clone())
            .or_default()
            .insert(node.id.clone());
        let id = node.id.clone();
        self.nodes.insert(id.clone(), Arc::new(node));

        tracing::debug!(memory_id = %id, "memory created");
        Ok(id)
    }

    /// Fetch a node; unknown ids are a caller-local NotFound, never fatal
    pub fn get(&self, id: &MemoryId) -> Result<SharedNode> {
        self.nodes
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::MemoryNotFound(id.to_string()))
    }

    /// Apply a mutation to one node atomically (readers see old or new,
    /// never a half-written record)
    fn with_node_mut(&self, id: &MemoryId, f: impl FnOnce(&mut MemoryNode)) -> Result<()> {
        let current = self.get(id)?;
        let lock = self.owner_lock(&current.owner_id);
        let _guard = lock.lock();

        // Re-read under the lock in case of a concurrent update
        let current = self.get(id)?;
        let mut updated = (*current).clone();
        f(&mut updated);
        self.persist_node(&updated)?;
        self.nodes.insert(id.clone(), Arc::new(updated));
        Ok(())
    }

    /// Persist a recomputed retention strength
    pub fn update_retention(&self, id: &MemoryId, value: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&value) {
            return Err(AppError::SchemaViolation(format!(
                "retention {value} out of range for memory {id}"
            )));
        }
        self.with_node_mut(id, |node| node.retention_strength = value)
    }

    /// Record a retrieval access
    pub fn touch(&self, id: &MemoryId) -> Result<()> {
        self.with_node_mut(id, |node| {
            node.access_count = node.access_count.saturating_add(1);
            node.last_accessed = Utc::now();
        })
    }

    /// Create or merge a typed edge between two memories of the same owner
    ///
    /// Idempotent: re-linking an existing (a, b, kind) edge merges by taking
    /// the stronger weight/similarity instead of duplicating. Symmetric kinds
    /// are canonicalized so the argument order never matters.
    pub fn link(
        &self,
        a: &MemoryId,
        b: &MemoryId,
        kind: RelationKind,
        weight: f32,
        similarity: f32,
        time_distance_hours: f32,
    ) -> Result<()> {
        if a == b {
            return Err(AppError::SchemaViolation(
                "self-referential edges are not allowed".to_string(),
            ));
        }
        let node_a = self.get(a)?;
        let node_b = self.get(b)?;
        if node_a.owner_id != node_b.owner_id {
            return Err(AppError::SchemaViolation(format!(
                "cannot link memories across owners ({} vs {})",
                node_a.owner_id, node_b.owner_id
            )));
        }

        let (from, to) = if kind.is_symmetric() && a.0 > b.0 {
            (b.clone(), a.clone())
        } else {
            (a.clone(), b.clone())
        };

        let lock = self.owner_lock(&node_a.owner_id);
        let _guard = lock.lock();

        let key = Self::edge_key(&from, &to, kind);
        let merged = match self.edges_db.get(&key)? {
            Some(bytes) => {
                let existing: Relation = bincode::deserialize(&bytes)?;
                Relation {
                    weight: existing.weight.max(weight.clamp(0.0, 1.0)),
                    similarity: existing.similarity.max(similarity.clamp(0.0, 1.0)),
                    time_distance_hours,
                    ..existing
                }
            }
            None => Relation {
                from,
                to,
                kind,
                weight: weight.clamp(0.0, 1.0),
                similarity: similarity.clamp(0.0, 1.0),
                time_distance_hours,
                created_at: Utc::now(),
            },
        };

        self.edges_db.put(&key, bincode::serialize(&merged)?)?;
        self.index_edge(Arc::new(merged));
        Ok(())
    }

    /// Adjacency for traversal: (neighbor id, edge) pairs
    pub fn neighbors(&self, id: &MemoryId) -> Vec<(MemoryId, Arc<Relation>)> {
        match self.adjacency.get(id) {
            Some(edges) => edges
                .iter()
                .map(|e| (e.other(id).clone(), e.clone()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Owner-scoped vector similarity lookup over active nodes
    ///
    /// Nodes without embeddings and archived/consolidating nodes never seed;
    /// they stay reachable only through graph traversal.
    pub fn nearest_by_embedding(
        &self,
        query: &[f32],
        owner: &str,
        k: usize,
    ) -> Vec<(SharedNode, f32)> {
        let ids = match self.owner_nodes.get(owner) {
            Some(set) => set.value().clone(),
            None => return Vec::new(),
        };

        let mut scored: Vec<(SharedNode, f32)> = ids
            .iter()
            .filter_map(|id| self.nodes.get(id).map(|e| e.value().clone()))
            .filter(|node| node.status == MemoryStatus::Active)
            .filter_map(|node| {
                let embedding = node.embedding.as_ref()?;
                let score = cosine_similarity(query, embedding);
                if score > 0.0 {
                    Some((node.clone(), score))
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    /// Move a node out of retrieval while keeping it for audit
    pub fn archive(&self, id: &MemoryId) -> Result<()> {
        self.with_node_mut(id, |node| node.status = MemoryStatus::Archived)
    }

    /// Mark a node as participating in an in-flight consolidation
    pub fn mark_consolidating(&self, id: &MemoryId) -> Result<()> {
        self.with_node_mut(id, |node| node.status = MemoryStatus::Consolidating)
    }

    /// Release a claimed node back to active (consolidation was abandoned)
    pub fn unmark_consolidating(&self, id: &MemoryId) -> Result<()> {
        self.with_node_mut(id, |node| {
            if node.status == MemoryStatus::Consolidating {
                node.status = MemoryStatus::Active;
            }
        })
    }

    /// Hard-delete a node, cascading to its incident edges
    pub fn delete(&self, id: &MemoryId) -> Result<()> {
        let node = self.get(id)?;
        let lock = self.owner_lock(&node.owner_id);
        let _guard = lock.lock();

        // Remove incident edges first so no traversal can reach a ghost
        let incident = self
            .adjacency
            .remove(id)
            .map(|(_, edges)| edges)
            .unwrap_or_default();
        for edge in &incident {
            let key = Self::edge_key(&edge.from, &edge.to, edge.kind);
            self.edges_db.delete(&key)?;
            let other = edge.other(id).clone();
            if let Some(mut adj) = self.adjacency.get_mut(&other) {
                adj.retain(|e| !(e.from == edge.from && e.to == edge.to && e.kind == edge.kind));
            }
        }

        self.nodes_db.delete(id.0.as_bytes())?;
        self.nodes.remove(id);
        if let Some(mut set) = self.owner_nodes.get_mut(&node.owner_id) {
            set.remove(id);
        }

        tracing::debug!(memory_id = %id, edges = incident.len(), "memory deleted");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Maintenance queries
    // -------------------------------------------------------------------------

    /// Active episodic memories for an owner newer than the cutoff
    pub fn active_episodic_since(&self, owner: &str, cutoff: DateTime<Utc>) -> Vec<SharedNode> {
        let ids = match self.owner_nodes.get(owner) {
            Some(set) => set.value().clone(),
            None => return Vec::new(),
        };
        let mut nodes: Vec<SharedNode> = ids
            .iter()
            .filter_map(|id| self.nodes.get(id).map(|e| e.value().clone()))
            .filter(|n| {
                n.memory_type == MemoryType::Episodic
                    && n.status == MemoryStatus::Active
                    && n.timestamp >= cutoff
            })
            .collect();
        nodes.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        nodes
    }

    /// True when a node already contributed to a semantic memory
    pub fn is_consolidated(&self, id: &MemoryId) -> bool {
        self.adjacency
            .get(id)
            .map(|edges| {
                edges
                    .iter()
                    .any(|e| e.kind == RelationKind::ConsolidatedFrom && &e.to == id)
            })
            .unwrap_or(false)
    }

    /// All nodes (active and archived) for the forgetting sweep
    pub fn sweep_targets(&self) -> Vec<SharedNode> {
        self.nodes.iter().map(|e| e.value().clone()).collect()
    }

    /// The most recent stored exchange in a session before a timestamp
    pub fn previous_in_session(
        &self,
        owner: &str,
        session: &str,
        before: DateTime<Utc>,
    ) -> Option<SharedNode> {
        let ids = self.owner_nodes.get(owner)?;
        ids.iter()
            .filter_map(|id| self.nodes.get(id).map(|e| e.value().clone()))
            .filter(|n| {
                n.session_id == session
                    && n.timestamp < before
                    && n.status == MemoryStatus::Active
            })
            .max_by_key(|n| n.timestamp)
    }

    /// Owners with any stored memory
    pub fn all_owners(&self) -> Vec<String> {
        self.owner_nodes
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| e.key().clone())
            .collect()
    }

    /// Node count for an owner
    pub fn count(&self, owner: &str) -> usize {
        self.owner_nodes
            .get(owner)
            .map(|set| set.len())
            .unwrap_or(0)
    }

    /// Total node count
    pub fn total_count(&self) -> usize {
        self.nodes.len()
    }

    /// Flush RocksDB write buffers (graceful shutdown)
    pub fn flush(&self) -> Result<()> {
        self.nodes_db.flush()?;
        self.edges_db.flush()?;
        Ok(())
    }
}

/// Extract candidate entities from content
///
/// Capitalized words plus long content words. Good enough to detect shared
/// topics across episodes ("universidad", "Marta"); a real NER model sits
/// outside this crate's boundary.
pub fn extract_entities(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut entities = Vec::new();

    for (idx, token) in content.split_whitespace().enumerate() {
        let word: String = token
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>();
        if word.chars().count() < 4 {
            continue;
        }

        let capitalized = word.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);
        // Sentence-initial capitalization is not a signal
        let is_entity = (capitalized && idx > 0) || word.chars().count() >= 6;
        if !is_entity {
            continue;
        }

        let normalized = word.to_lowercase();
        if seen.insert(normalized.clone()) {
            entities.push(normalized);
        }
    }

    entities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::EmotionalAnalyzer;
    use tempfile::TempDir;

    fn open_store() -> (MemoryStore, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let store = MemoryStore::open(dir.path()).expect("open store");
        (store, dir)
    }

    fn node_for(owner: &str, content: &str, embedding: Option<Vec<f32>>) -> MemoryNode {
        let analyzer = EmotionalAnalyzer::new();
        let state = analyzer.analyze(content);
        MemoryNode::episodic(owner, "s1", content, embedding, &state, 0.5)
    }

    #[test]
    fn test_create_and_get() {
        let (store, _dir) = open_store();
        let node = node_for("alice", "estoy feliz con mi trabajo", None);
        let id = store.create(node).unwrap();

        let fetched = store.get(&id).unwrap();
        assert_eq!(fetched.owner_id, "alice");
        assert_eq!(fetched.status, MemoryStatus::Active);
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let (store, _dir) = open_store();
        let err = store.get(&MemoryId::generate()).unwrap_err();
        assert_eq!(err.code(), "MEMORY_NOT_FOUND");
    }

    #[test]
    fn test_link_merges_instead_of_duplicating() {
        let (store, _dir) = open_store();
        let a = store.create(node_for("alice", "primer recuerdo", None)).unwrap();
        let b = store.create(node_for("alice", "segundo recuerdo", None)).unwrap();

        store
            .link(&a, &b, RelationKind::SemanticallyRelated, 0.4, 0.4, 0.0)
            .unwrap();
        // Reversed order, same kind: must merge into the same edge
        store
            .link(&b, &a, RelationKind::SemanticallyRelated, 0.9, 0.9, 0.0)
            .unwrap();

        let neighbors = store.neighbors(&a);
        assert_eq!(neighbors.len(), 1);
        assert!((neighbors[0].1.weight - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_link_across_owners_rejected() {
        let (store, _dir) = open_store();
        let a = store.create(node_for("alice", "recuerdo de alice", None)).unwrap();
        let b = store.create(node_for("bob", "recuerdo de bob", None)).unwrap();

        let err = store
            .link(&a, &b, RelationKind::SemanticallyRelated, 0.5, 0.5, 0.0)
            .unwrap_err();
        assert_eq!(err.code(), "SCHEMA_VIOLATION");
    }

    #[test]
    fn test_delete_cascades_edges() {
        let (store, _dir) = open_store();
        let a = store.create(node_for("alice", "uno", None)).unwrap();
        let b = store.create(node_for("alice", "dos", None)).unwrap();
        store
            .link(&a, &b, RelationKind::TemporallyRelated, 0.8, 0.0, 1.0)
            .unwrap();

        store.delete(&a).unwrap();

        assert!(store.get(&a).is_err());
        assert!(store.neighbors(&b).is_empty());
    }

    #[test]
    fn test_archived_nodes_excluded_from_nearest() {
        let (store, _dir) = open_store();
        let embedding = vec![1.0, 0.0, 0.0];
        let a = store
            .create(node_for("alice", "uno", Some(embedding.clone())))
            .unwrap();
        let b = store
            .create(node_for("alice", "dos", Some(embedding.clone())))
            .unwrap();

        store.archive(&a).unwrap();

        let hits = store.nearest_by_embedding(&embedding, "alice", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, b);
    }

    #[test]
    fn test_nearest_scoped_to_owner() {
        let (store, _dir) = open_store();
        let embedding = vec![0.0, 1.0, 0.0];
        store
            .create(node_for("alice", "de alice", Some(embedding.clone())))
            .unwrap();
        store
            .create(node_for("bob", "de bob", Some(embedding.clone())))
            .unwrap();

        let hits = store.nearest_by_embedding(&embedding, "alice", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.owner_id, "alice");
    }

    #[test]
    fn test_update_retention_validates_range() {
        let (store, _dir) = open_store();
        let id = store.create(node_for("alice", "recuerdo", None)).unwrap();

        store.update_retention(&id, 0.42).unwrap();
        assert!((store.get(&id).unwrap().retention_strength - 0.42).abs() < f32::EPSILON);

        let err = store.update_retention(&id, 1.5).unwrap_err();
        assert_eq!(err.code(), "SCHEMA_VIOLATION");
    }

    #[test]
    fn test_touch_updates_access_metadata() {
        let (store, _dir) = open_store();
        let id = store.create(node_for("alice", "recuerdo", None)).unwrap();
        let before = store.get(&id).unwrap();

        store.touch(&id).unwrap();
        let after = store.get(&id).unwrap();

        assert_eq!(after.access_count, before.access_count + 1);
        assert!(after.last_accessed >= before.last_accessed);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = TempDir::new().expect("temp dir");
        let id = {
            let store = MemoryStore::open(dir.path()).unwrap();
            let a = store
                .create(node_for("alice", "uno", Some(vec![1.0, 0.0])))
                .unwrap();
            let b = store.create(node_for("alice", "dos", None)).unwrap();
            store
                .link(&a, &b, RelationKind::EmotionallySimilar, 0.7, 0.7, 0.0)
                .unwrap();
            store.flush().unwrap();
            a
        };

        let reopened = MemoryStore::open(dir.path()).unwrap();
        assert_eq!(reopened.total_count(), 2);
        assert_eq!(reopened.neighbors(&id).len(), 1);
    }

    #[test]
    fn test_extract_entities() {
        let entities = extract_entities("Hoy vi a Marta en la universidad de Madrid");
        assert!(entities.contains(&"marta".to_string()));
        assert!(entities.contains(&"universidad".to_string()));
        assert!(entities.contains(&"madrid".to_string()));
        // Short function words never qualify
        assert!(!entities.contains(&"en".to_string()));
    }
}
