//! Documented constants for the memory engine
//!
//! All tunable parameters live here with justification for their values.
//! Centralizing constants prevents magic numbers and makes tuning easier.
//! Runtime overrides go through `config::EngineConfig`, which seeds itself
//! from these defaults.

// =============================================================================
// EMBEDDING CONVENTIONS
// =============================================================================

/// Expected embedding dimensionality
///
/// Callers supply embeddings at the boundary (the engine does not run an
/// embedding model). 384 matches the MiniLM-class sentence encoders the
/// surrounding system uses; vectors of other lengths are accepted but only
/// compared against vectors of the same length.
pub const EMBEDDING_DIM: usize = 384;

/// Hard cap on accepted embedding length
///
/// Protects the store from pathological payloads. 4096 covers every common
/// sentence-embedding model with a wide margin.
pub const MAX_EMBEDDING_DIM: usize = 4096;

// =============================================================================
// SPREADING ACTIVATION
// Defaults follow the documented retrieval design: similarity-seeded
// breadth-limited traversal with per-hop decay and emotional modulation.
// =============================================================================

/// Number of seed nodes selected by embedding similarity
pub const DEFAULT_SEED_K: usize = 10;

/// Maximum traversal depth from the seed set
///
/// Three hops keeps latency bounded while still reaching memories connected
/// only transitively (A relates to B relates to C). Beyond three hops the
/// per-hop decay factor pushes almost everything under the activation
/// threshold anyway.
pub const DEFAULT_MAX_HOPS: u8 = 3;

/// Per-hop activation decay
///
/// Each hop multiplies the propagated activation by this factor, so a
/// three-hop path retains at most 0.6^3 ≈ 22% of its source activation.
pub const DEFAULT_DECAY_FACTOR: f32 = 0.6;

/// Emotional sensitivity for the traversal modifier
///
/// The modifier is `1 + |query_valence - node_valence| * sensitivity`:
/// activation is amplified with emotional *distance* from the query. This is
/// deliberate and documented upstream; it surfaces emotionally contrasting
/// memories rather than reinforcing the current mood. Do not flip the sign
/// without revisiting that decision.
pub const DEFAULT_EMOTIONAL_SENSITIVITY: f32 = 0.5;

/// Minimum final activation for a node to appear in results
pub const DEFAULT_ACTIVATION_THRESHOLD: f32 = 0.3;

/// Maximum memories returned by one retrieval
pub const DEFAULT_MAX_RESULTS: usize = 10;

// =============================================================================
// CONSOLIDATION
// =============================================================================

/// Cluster size at which episodic memories consolidate into a semantic one
///
/// Three repetitions is the documented "pattern" threshold: one occurrence is
/// an event, two a coincidence, three a habit worth generalizing.
pub const DEFAULT_CONSOLIDATION_THRESHOLD: usize = 3;

/// Embedding similarity for two episodes to share a cluster
pub const DEFAULT_CLUSTER_SIMILARITY: f32 = 0.7;

/// Shared-entity count that joins a cluster without embedding agreement
///
/// Two overlapping named entities ("universidad", "Marta") is a strong
/// lexical signal even when embeddings disagree or are missing.
pub const CLUSTER_SHARED_ENTITIES: usize = 2;

/// Lookback window for consolidation candidates (hours)
///
/// One week: the consolidation job only considers recent episodes, older
/// ones either already consolidated or on their way out via forgetting.
pub const DEFAULT_CONSOLIDATION_LOOKBACK_HOURS: i64 = 168;

/// Recency half-life used when averaging cluster emotion (hours)
///
/// Member contributions to the consolidated emotional weight decay with
/// this half-life so the semantic memory reflects how the pattern feels
/// *now*, not how it felt a week ago.
pub const CONSOLIDATION_RECENCY_HALF_LIFE_HOURS: f64 = 72.0;

// =============================================================================
// FORGETTING
// =============================================================================

/// Exponential decay rate per hour for retention
///
/// 0.005/hour puts the unboosted half-life at ~139 hours (just under six
/// days), matching the observed cadence of conversational topics going
/// stale within a week unless reinforced.
pub const DEFAULT_DECAY_RATE: f32 = 0.005;

/// Multiplier applied to emotional weight in the retention formula
///
/// `retention *= 1 + emotional_weight * boost`. At 2.0 a maximally emotional
/// memory retains 3x as long as a neutral one, mirroring the strong
/// emotional-salience effect in human retention curves.
pub const DEFAULT_EMOTIONAL_BOOST_FACTOR: f32 = 2.0;

/// Per-access retention bonus
///
/// Each retrieval adds 10% to retention (`1 + 0.1 * access_count`), so
/// frequently recalled memories effectively never decay out.
pub const ACCESS_RETENTION_BONUS: f32 = 0.1;

/// Retention below which a memory is hard-deleted
pub const DEFAULT_DELETE_THRESHOLD: f32 = 0.1;

/// Default sweep cadence (seconds)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Default consolidation cadence (seconds)
///
/// Every six hours: frequent enough that patterns consolidate the same day
/// they form, rare enough to stay invisible to the request path.
pub const DEFAULT_CONSOLIDATION_INTERVAL_SECS: u64 = 6 * 3600;

// =============================================================================
// CONTEXT CACHE
// =============================================================================

/// Default sliding-window size (entries per session)
pub const DEFAULT_WINDOW_SIZE: usize = 50;

/// Permitted window-size range
///
/// Below 20 the companion loses the thread of a conversation; above 100 the
/// generation context overflows downstream token budgets.
pub const WINDOW_SIZE_MIN: usize = 20;
pub const WINDOW_SIZE_MAX: usize = 100;

/// Importance above which a window entry survives compaction
pub const DEFAULT_IMPORTANCE_KEEP_THRESHOLD: f32 = 0.7;

/// Most-recent entries always kept through compaction
pub const DEFAULT_RECENT_KEEP: usize = 10;

/// Session window idle expiry (seconds)
///
/// 24 hours, after which a session's window is dropped on next access.
pub const SESSION_TTL_SECS: i64 = 86_400;

/// Combined score at or above which the semantic cache answers directly
pub const DEFAULT_CACHE_HIT_THRESHOLD: f32 = 0.85;

/// Share of the cache score from embedding similarity
pub const CACHE_SEMANTIC_SHARE: f32 = 0.7;

/// Share of the cache score from emotional similarity
pub const CACHE_EMOTIONAL_SHARE: f32 = 0.3;

/// Semantic cache entry TTL (seconds)
pub const DEFAULT_CACHE_TTL_SECS: i64 = 3600;

/// Semantic cache entries retained per owner
pub const CACHE_MAX_ENTRIES: usize = 256;

// =============================================================================
// IMPORTANCE & STORAGE GATING
// =============================================================================

/// Importance above which an exchange becomes a long-term memory
pub const DEFAULT_STORE_IMPORTANCE_THRESHOLD: f32 = 0.3;

/// Weight of emotional intensity in the importance score
pub const IMPORTANCE_INTENSITY_WEIGHT: f32 = 0.6;

/// Bonus for explicit memory markers ("remember", "recuérdalo", ...)
pub const IMPORTANCE_MARKER_BONUS: f32 = 0.3;

/// Bonus for assistant-authored entries
///
/// The companion's own responses anchor later coherence checks, so they are
/// slightly favored for storage.
pub const IMPORTANCE_ASSISTANT_BONUS: f32 = 0.15;

// =============================================================================
// GENERATION BOUNDARY
// =============================================================================

/// Timeout on one generation call (seconds)
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 8;

/// Canned response used when generation times out or fails
pub const FALLBACK_RESPONSE: &str =
    "Perdona, me quedé pensando en otra cosa. ¿Me lo cuentas otra vez?";

// =============================================================================
// RELATIONSHIP LINKING
// =============================================================================

/// VAD distance under which two memories get an EmotionallySimilar edge
pub const EMOTIONAL_LINK_MAX_DISTANCE: f32 = 0.25;

/// Embedding similarity above which a SemanticallyRelated edge is created
pub const SEMANTIC_LINK_MIN_SIMILARITY: f32 = 0.5;

/// Temporal edge weight half-life (hours)
///
/// TemporallyRelated edge weight is `0.5^(Δt / half_life)`: exchanges an
/// hour apart are strongly related, a day apart barely.
pub const TEMPORAL_LINK_HALF_LIFE_HOURS: f32 = 6.0;

/// Retrieved memories the new exchange links against
pub const LINK_CANDIDATES: usize = 5;

// =============================================================================
// RESOURCE LIMITS
// =============================================================================

/// Maximum content size accepted per exchange (bytes)
pub const MAX_CONTENT_BYTES: usize = 64 * 1024;

/// Maximum retries for transient store failures
pub const TRANSIENT_RETRY_ATTEMPTS: u32 = 3;

/// Base backoff between transient retries (milliseconds)
pub const TRANSIENT_RETRY_BASE_MS: u64 = 50;
