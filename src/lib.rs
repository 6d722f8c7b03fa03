//! Memoria - emotional-spatial-temporal memory engine
//!
//! Persistent, weighted knowledge graph of past conversational exchanges
//! with similarity-and-emotion-weighted retrieval, automatic consolidation
//! of repeated episodes into general knowledge, and decay-based forgetting.
//!
//! # Architecture
//! - Graph store over RocksDB: memory nodes + typed weighted relationships
//! - Spreading-activation retrieval with per-hop decay and emotional
//!   modulation
//! - Background consolidation (episodic → semantic) and forgetting sweeps
//!   driven by an explicit work queue
//! - Per-session context windows with importance-aware compaction and a
//!   semantic response cache
//!
//! The text-generation model, embedding encoder, chat transport, and
//! coherence validator are external collaborators; this crate models them
//! only at the boundary.

pub mod activation;
pub mod config;
pub mod consolidation;
pub mod constants;
pub mod context;
pub mod emotion;
pub mod engine;
pub mod errors;
pub mod forgetting;
pub mod generation;
pub mod handlers;
pub mod scheduler;
pub mod similarity;
pub mod store;
pub mod tracing_setup;
pub mod validation;

// Re-export dependencies to ensure tests use the same versions
pub use chrono;
pub use parking_lot;
pub use uuid;
