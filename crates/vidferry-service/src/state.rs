//! Shared application state for the HTTP handlers.

use std::sync::Arc;

use vidferry_pipeline::Orchestrator;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Entry point for the session pipeline.
    pub orchestrator: Arc<Orchestrator>,
}
