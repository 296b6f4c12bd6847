use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use deliberation::{
    DeliberationOrchestrator, FileHistoryStore, InMemoryHistoryStore, SharedHistoryStore,
};
use deliberation_server::{serve, AppState, Args, OpenAiCompatibleEngine, ServerConfig};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = ServerConfig::load(&args)?;

    let engine = OpenAiCompatibleEngine::new(&config.llm)
        .context("Failed to build reasoning engine client")?;
    info!(
        endpoint = engine.endpoint(),
        model = %config.llm.model,
        "Reasoning engine configured"
    );

    let history: SharedHistoryStore = if config.in_memory_history {
        warn!("History is kept in memory and will not survive a restart");
        Arc::new(InMemoryHistoryStore::new())
    } else {
        info!(path = %config.history_path.display(), "History file");
        Arc::new(FileHistoryStore::new(&config.history_path))
    };

    let orchestrator =
        DeliberationOrchestrator::new(Arc::new(engine), config.deliberation.clone())
            .with_history(history.clone());
    let state = AppState::new(orchestrator, history)
        .with_pending_ttl(config.session_ttl())
        .shared();

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Deliberation server listening");

    serve(listener, state, shutdown_signal())
        .await
        .context("Server error")?;
    info!("Deliberation server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
