//! Logging initialization
//!
//! Structured logs via `tracing` with an env-filter. The filter reads
//! `MEMORIA_LOG` first (service-specific override), then the conventional
//! `RUST_LOG`, defaulting to `info`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global subscriber; idempotent for tests
pub fn init_tracing() {
    let filter = std::env::var("MEMORIA_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();

    if result.is_err() {
        // A subscriber was already installed (repeat init in tests)
        tracing::debug!("tracing subscriber already initialized");
    }
}
