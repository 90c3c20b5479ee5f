//! Service composition root.
//!
//! Builds the pipeline from configuration, serves the health endpoint,
//! and drains the pipeline when the process is told to stop. Transport
//! ports are passed in by the caller; only the engine is constructed
//! here.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;

use vidferry_core::OrchestratorConfig;
use vidferry_core::ports::{SessionEventEmitter, TransferChannel};
use vidferry_pipeline::Orchestrator;
use vidferry_ytdlp::YtDlpEngine;

use crate::routes::create_router;
use crate::state::AppState;

/// Configuration for the service process.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Port for the health endpoint.
    pub port: u16,
    /// Root directory for in-flight session scopes.
    pub workspace_root: PathBuf,
    /// Netscape cookies file handed to yt-dlp when it exists.
    pub cookies_file: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            workspace_root: PathBuf::from("temp"),
            cookies_file: None,
        }
    }
}

/// Build the orchestrator the binary runs: the yt-dlp engine plus the
/// caller's transport ports.
///
/// Creates the workspace root and sweeps scopes left behind by a
/// previous run.
pub async fn build_orchestrator(
    config: &ServiceConfig,
    channel: Arc<dyn TransferChannel>,
    emitter: Arc<dyn SessionEventEmitter>,
) -> anyhow::Result<Arc<Orchestrator>> {
    let mut engine = YtDlpEngine::locate()?;
    match &config.cookies_file {
        Some(path) if path.is_file() => {
            tracing::info!(path = %path.display(), "Using cookies file");
            engine = engine.with_cookies_file(path);
        }
        Some(path) => {
            tracing::warn!(path = %path.display(), "Cookies file not found, continuing without");
        }
        None => {}
    }

    tokio::fs::create_dir_all(&config.workspace_root).await?;

    let orchestrator = Arc::new(Orchestrator::new(
        OrchestratorConfig::new(&config.workspace_root),
        Arc::new(engine),
        channel,
        emitter,
    ));

    let swept = orchestrator.sweep_workspace().await;
    if swept > 0 {
        tracing::info!(swept, "Removed stale scopes from a previous run");
    }

    Ok(orchestrator)
}

/// Run the service until ctrl-c, then drain active sessions.
pub async fn run(
    config: ServiceConfig,
    channel: Arc<dyn TransferChannel>,
    emitter: Arc<dyn SessionEventEmitter>,
) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(&config, channel, emitter).await?;

    let app = create_router(AppState {
        orchestrator: Arc::clone(&orchestrator),
    });

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Health server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down, draining active sessions");
    orchestrator.shutdown().await;
    Ok(())
}

/// Resolves when the process receives ctrl-c.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for shutdown signal");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_production_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.workspace_root, PathBuf::from("temp"));
        assert!(config.cookies_file.is_none());
    }
}
