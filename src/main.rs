//! Memoria server - standalone memory engine with a REST surface
//!
//! The chat transport and dashboard talk to this process; generation runs
//! through the configured collaborator (the offline fallback responder when
//! no external generator is wired in).

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

use memoria::config::{ConfigHandle, EngineConfig, ServerConfig};
use memoria::consolidation::ConsolidationEngine;
use memoria::engine::Engine;
use memoria::generation::FallbackResponder;
use memoria::handlers::{self, AppState};
use memoria::scheduler::Scheduler;
use memoria::store::MemoryStore;
use memoria::tracing_setup;

/// Personality description injected into every generation context; the
/// hosting application overrides this through the environment.
const DEFAULT_PERSONALITY: &str =
    "Compañera cercana, cálida y curiosa; recuerda lo que importa y responde en el idioma del usuario.";

/// In-flight request ceiling for the whole surface
const MAX_CONCURRENT_REQUESTS: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_setup::init_tracing();

    let server_config = ServerConfig::from_env();
    let engine_config = EngineConfig::from_env();
    let config = ConfigHandle::new(engine_config);

    std::fs::create_dir_all(&server_config.storage_path)
        .context("failed to create storage directory")?;
    let store = Arc::new(
        MemoryStore::open(&server_config.storage_path).context("failed to open memory store")?,
    );

    let personality =
        std::env::var("MEMORIA_PERSONALITY").unwrap_or_else(|_| DEFAULT_PERSONALITY.to_string());

    // The generation collaborator is an external service in production; the
    // fallback responder keeps the engine serving deterministic text when
    // none is configured.
    let generator = Arc::new(FallbackResponder);

    let engine = Arc::new(Engine::new(
        store.clone(),
        generator.clone(),
        config.clone(),
        &personality,
    ));

    let consolidation = Arc::new(ConsolidationEngine::new(store.clone(), generator));
    let scheduler = Arc::new(Scheduler::new(store.clone(), consolidation, config.clone()));
    let background = scheduler.spawn();

    let state = AppState::new(engine, scheduler);
    let app = handlers::router(state)
        .layer(tower::limit::ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS));

    let addr: SocketAddr = format!("{}:{}", server_config.host, server_config.port)
        .parse()
        .context("invalid bind address")?;
    info!(%addr, "memoria server listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Stop maintenance and flush write buffers before exit
    for handle in background {
        handle.abort();
    }
    store.flush().context("failed to flush store on shutdown")?;
    info!("memoria server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
