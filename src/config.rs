//! Configuration management for the memory engine
//!
//! All tunable parameters in one place with environment variable overrides.
//! Follows the principle: sensible defaults, configurable in production.
//!
//! Retrieval and maintenance parameters are hot-reloadable from the
//! dashboard: `ConfigHandle` hands out immutable `Arc<EngineConfig>`
//! snapshots and swaps the current one atomically between requests. A call
//! captures one snapshot for its entire run, so a mid-flight update never
//! mixes old and new thresholds inside a single traversal or sweep.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::constants::{
    DEFAULT_ACTIVATION_THRESHOLD, DEFAULT_CACHE_HIT_THRESHOLD, DEFAULT_CACHE_TTL_SECS,
    DEFAULT_CLUSTER_SIMILARITY, DEFAULT_CONSOLIDATION_INTERVAL_SECS,
    DEFAULT_CONSOLIDATION_LOOKBACK_HOURS, DEFAULT_CONSOLIDATION_THRESHOLD, DEFAULT_DECAY_FACTOR,
    DEFAULT_DECAY_RATE, DEFAULT_DELETE_THRESHOLD, DEFAULT_EMOTIONAL_BOOST_FACTOR,
    DEFAULT_EMOTIONAL_SENSITIVITY, DEFAULT_GENERATION_TIMEOUT_SECS,
    DEFAULT_IMPORTANCE_KEEP_THRESHOLD, DEFAULT_MAX_HOPS, DEFAULT_MAX_RESULTS, DEFAULT_RECENT_KEEP,
    DEFAULT_SEED_K, DEFAULT_STORE_IMPORTANCE_THRESHOLD, DEFAULT_SWEEP_INTERVAL_SECS,
    DEFAULT_WINDOW_SIZE, WINDOW_SIZE_MAX, WINDOW_SIZE_MIN,
};

/// Tunable engine parameters, snapshotted per call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Snapshot version, bumped on every update
    pub version: u64,

    // --- Spreading activation ---
    /// Seed nodes taken by embedding similarity
    pub seed_k: usize,
    /// Maximum traversal depth
    pub max_hops: u8,
    /// Per-hop activation decay factor
    pub decay_factor: f32,
    /// Emotional distance amplification in the traversal modifier
    pub emotional_sensitivity: f32,
    /// Minimum final activation for inclusion
    pub activation_threshold: f32,
    /// Maximum results per retrieval
    pub max_results: usize,

    // --- Consolidation ---
    /// Cluster size that triggers consolidation
    pub consolidation_threshold: usize,
    /// Embedding similarity for cluster membership
    pub cluster_similarity: f32,
    /// Candidate lookback window (hours)
    pub consolidation_lookback_hours: i64,
    /// Scheduler cadence for consolidation (seconds)
    pub consolidation_interval_secs: u64,

    // --- Forgetting ---
    /// Exponential retention decay rate per hour
    pub decay_rate: f32,
    /// Emotional weight multiplier in the retention formula
    pub boost_factor: f32,
    /// Retention below which memories are hard-deleted
    pub delete_threshold: f32,
    /// Scheduler cadence for the sweep (seconds)
    pub sweep_interval_secs: u64,

    // --- Context cache ---
    /// Sliding window size per session (clamped to 20-100)
    pub window_size: usize,
    /// Importance above which a window entry survives compaction
    pub importance_keep_threshold: f32,
    /// Most-recent entries always kept through compaction
    pub recent_keep: usize,
    /// Combined score at which the semantic cache answers directly
    pub cache_hit_threshold: f32,
    /// Semantic cache entry TTL (seconds)
    pub cache_ttl_secs: i64,

    // --- Storage gating & generation ---
    /// Importance above which an exchange is stored long-term
    pub store_importance_threshold: f32,
    /// Generation call deadline (seconds)
    pub generation_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: 0,
            seed_k: DEFAULT_SEED_K,
            max_hops: DEFAULT_MAX_HOPS,
            decay_factor: DEFAULT_DECAY_FACTOR,
            emotional_sensitivity: DEFAULT_EMOTIONAL_SENSITIVITY,
            activation_threshold: DEFAULT_ACTIVATION_THRESHOLD,
            max_results: DEFAULT_MAX_RESULTS,
            consolidation_threshold: DEFAULT_CONSOLIDATION_THRESHOLD,
            cluster_similarity: DEFAULT_CLUSTER_SIMILARITY,
            consolidation_lookback_hours: DEFAULT_CONSOLIDATION_LOOKBACK_HOURS,
            consolidation_interval_secs: DEFAULT_CONSOLIDATION_INTERVAL_SECS,
            decay_rate: DEFAULT_DECAY_RATE,
            boost_factor: DEFAULT_EMOTIONAL_BOOST_FACTOR,
            delete_threshold: DEFAULT_DELETE_THRESHOLD,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            window_size: DEFAULT_WINDOW_SIZE,
            importance_keep_threshold: DEFAULT_IMPORTANCE_KEEP_THRESHOLD,
            recent_keep: DEFAULT_RECENT_KEEP,
            cache_hit_threshold: DEFAULT_CACHE_HIT_THRESHOLD,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            store_importance_threshold: DEFAULT_STORE_IMPORTANCE_THRESHOLD,
            generation_timeout_secs: DEFAULT_GENERATION_TIMEOUT_SECS,
        }
    }
}

impl EngineConfig {
    /// Load defaults with environment variable overrides (`MEMORIA_*`)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        read_env("MEMORIA_SEED_K", &mut config.seed_k);
        read_env("MEMORIA_MAX_HOPS", &mut config.max_hops);
        read_env("MEMORIA_DECAY_FACTOR", &mut config.decay_factor);
        read_env(
            "MEMORIA_EMOTIONAL_SENSITIVITY",
            &mut config.emotional_sensitivity,
        );
        read_env(
            "MEMORIA_ACTIVATION_THRESHOLD",
            &mut config.activation_threshold,
        );
        read_env("MEMORIA_MAX_RESULTS", &mut config.max_results);
        read_env(
            "MEMORIA_CONSOLIDATION_THRESHOLD",
            &mut config.consolidation_threshold,
        );
        read_env("MEMORIA_CLUSTER_SIMILARITY", &mut config.cluster_similarity);
        read_env(
            "MEMORIA_CONSOLIDATION_LOOKBACK_HOURS",
            &mut config.consolidation_lookback_hours,
        );
        read_env(
            "MEMORIA_CONSOLIDATION_INTERVAL_SECS",
            &mut config.consolidation_interval_secs,
        );
        read_env("MEMORIA_DECAY_RATE", &mut config.decay_rate);
        read_env("MEMORIA_BOOST_FACTOR", &mut config.boost_factor);
        read_env("MEMORIA_DELETE_THRESHOLD", &mut config.delete_threshold);
        read_env(
            "MEMORIA_SWEEP_INTERVAL_SECS",
            &mut config.sweep_interval_secs,
        );
        read_env("MEMORIA_WINDOW_SIZE", &mut config.window_size);
        read_env(
            "MEMORIA_IMPORTANCE_KEEP_THRESHOLD",
            &mut config.importance_keep_threshold,
        );
        read_env("MEMORIA_RECENT_KEEP", &mut config.recent_keep);
        read_env(
            "MEMORIA_CACHE_HIT_THRESHOLD",
            &mut config.cache_hit_threshold,
        );
        read_env("MEMORIA_CACHE_TTL_SECS", &mut config.cache_ttl_secs);
        read_env(
            "MEMORIA_STORE_IMPORTANCE_THRESHOLD",
            &mut config.store_importance_threshold,
        );
        read_env(
            "MEMORIA_GENERATION_TIMEOUT_SECS",
            &mut config.generation_timeout_secs,
        );

        config.normalize();
        config
    }

    /// Clamp parameters into their documented ranges
    pub fn normalize(&mut self) {
        self.window_size = self.window_size.clamp(WINDOW_SIZE_MIN, WINDOW_SIZE_MAX);
        self.decay_factor = self.decay_factor.clamp(0.0, 1.0);
        self.activation_threshold = self.activation_threshold.clamp(0.0, 1.0);
        self.cluster_similarity = self.cluster_similarity.clamp(0.0, 1.0);
        self.delete_threshold = self.delete_threshold.clamp(0.0, 1.0);
        self.cache_hit_threshold = self.cache_hit_threshold.clamp(0.0, 1.0);
        self.store_importance_threshold = self.store_importance_threshold.clamp(0.0, 1.0);
        self.consolidation_threshold = self.consolidation_threshold.max(2);
        self.seed_k = self.seed_k.max(1);
        self.max_results = self.max_results.max(1);
    }
}

fn read_env<T: std::str::FromStr>(var: &str, target: &mut T) {
    if let Ok(raw) = env::var(var) {
        match raw.parse() {
            Ok(v) => *target = v,
            Err(_) => tracing::warn!(var, value = %raw, "ignoring unparseable config override"),
        }
    }
}

/// Shared handle to the current configuration snapshot
///
/// Cloning the handle is cheap; `snapshot()` is a single lock-read returning
/// an `Arc` the caller holds for the duration of its operation.
#[derive(Clone)]
pub struct ConfigHandle {
    current: Arc<RwLock<Arc<EngineConfig>>>,
}

impl ConfigHandle {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Capture the current snapshot
    pub fn snapshot(&self) -> Arc<EngineConfig> {
        self.current.read().clone()
    }

    /// Replace the snapshot atomically, bumping the version
    pub fn replace(&self, mut config: EngineConfig) -> u64 {
        config.normalize();
        let mut guard = self.current.write();
        config.version = guard.version + 1;
        let version = config.version;
        *guard = Arc::new(config);
        info!(version, "configuration snapshot replaced");
        version
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Server-level settings (not hot-reloadable)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Root directory for the persistent store
    pub storage_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8700,
            storage_path: PathBuf::from("./memoria_data"),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = env::var("MEMORIA_HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("MEMORIA_PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }
        if let Ok(path) = env::var("MEMORIA_STORAGE_PATH") {
            config.storage_path = PathBuf::from(path);
        }

        info!(
            host = %config.host,
            port = config.port,
            storage = %config.storage_path.display(),
            "server configuration loaded"
        );
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.seed_k, 10);
        assert_eq!(config.max_hops, 3);
        assert!((config.decay_factor - 0.6).abs() < f32::EPSILON);
        assert!((config.activation_threshold - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.consolidation_threshold, 3);
        assert!((config.delete_threshold - 0.1).abs() < f32::EPSILON);
        assert!((config.boost_factor - 2.0).abs() < f32::EPSILON);
        assert!((config.cache_hit_threshold - 0.85).abs() < f32::EPSILON);
    }

    #[test]
    fn test_window_size_clamped() {
        let mut config = EngineConfig {
            window_size: 5,
            ..Default::default()
        };
        config.normalize();
        assert_eq!(config.window_size, WINDOW_SIZE_MIN);

        config.window_size = 500;
        config.normalize();
        assert_eq!(config.window_size, WINDOW_SIZE_MAX);
    }

    #[test]
    fn test_env_override() {
        env::set_var("MEMORIA_SEED_K", "17");
        env::set_var("MEMORIA_DECAY_FACTOR", "0.4");
        let config = EngineConfig::from_env();
        env::remove_var("MEMORIA_SEED_K");
        env::remove_var("MEMORIA_DECAY_FACTOR");

        assert_eq!(config.seed_k, 17);
        assert!((config.decay_factor - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn test_handle_swap_bumps_version() {
        let handle = ConfigHandle::new(EngineConfig::default());
        let before = handle.snapshot();
        assert_eq!(before.version, 0);

        let held = handle.snapshot();
        handle.replace(EngineConfig {
            seed_k: 20,
            ..EngineConfig::default()
        });

        let after = handle.snapshot();
        assert_eq!(after.version, 1);
        assert_eq!(after.seed_k, 20);
        // A snapshot captured before the swap is unaffected.
        assert_eq!(held.seed_k, 10);
    }
}
