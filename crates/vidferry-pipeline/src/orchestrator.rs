//! Orchestrator: the public face of the pipeline.
//!
//! Adapters (chat bots, HTTP handlers) talk to this type and nothing else.
//! It validates URLs, drives resolution, and hands everything stateful to
//! the [`SessionRegistry`].

use std::sync::Arc;

use vidferry_core::ports::{MediaEngine, SessionEventEmitter, TransferChannel};
use vidferry_core::{
    OrchestratorConfig, ResolvedSource, SessionError, SessionResult, SessionSnapshot, SourceUrl,
    UserId, VariantDescriptor,
};

use crate::arena::TempFileArena;
use crate::catalog::QualityCatalog;
use crate::registry::SessionRegistry;
use crate::session::{self, SessionDeps};

/// Entry point for the download/transfer pipeline.
pub struct Orchestrator {
    registry: Arc<SessionRegistry>,
    catalog: QualityCatalog,
}

impl Orchestrator {
    /// Wire up an orchestrator from its configuration and ports.
    #[must_use]
    pub fn new(
        config: OrchestratorConfig,
        engine: Arc<dyn MediaEngine>,
        channel: Arc<dyn TransferChannel>,
        emitter: Arc<dyn SessionEventEmitter>,
    ) -> Self {
        let catalog = QualityCatalog::from_config(&config);
        let arena = TempFileArena::new(config.workspace_root.clone());
        let deps = SessionDeps {
            config,
            engine,
            channel,
            emitter,
            arena,
        };

        Self {
            registry: Arc::new(SessionRegistry::new(deps)),
            catalog,
        }
    }

    /// Remove temp scopes left behind by a previous run.
    ///
    /// Call once at startup, before the first submission. Returns the
    /// number of scopes removed.
    pub async fn sweep_workspace(&self) -> usize {
        let deps = self.registry.deps();
        deps.arena.sweep_stale(deps.config.sweep_grace).await
    }

    /// Accept a URL, resolve it, and offer the selectable variant menu.
    ///
    /// Validation, admission, and resolution failures all surface here;
    /// once this returns `Ok` the session sits in `AwaitingSelection`
    /// until [`Self::select_variant`] or the selection window expires.
    pub async fn submit_url(
        &self,
        user_id: UserId,
        raw_url: &str,
    ) -> SessionResult<ResolvedSource> {
        let url = SourceUrl::parse(raw_url)?;
        let begun = self.registry.begin(user_id, url.clone()).await?;
        let deps = self.registry.deps();

        let resolved = tokio::select! {
            biased;

            () = begun.cancel.cancelled() => Err(SessionError::Cancelled),

            result = session::resolve_source(
                &url,
                deps.engine.as_ref(),
                self.catalog,
                &deps.config,
            ) => result,
        };

        match resolved {
            Ok((details, variants)) => {
                let source = ResolvedSource {
                    request_id: begun.request_id,
                    title: details.title.clone(),
                    duration_secs: details.duration_secs,
                    channel: details.channel.clone(),
                    thumbnail_url: details.thumbnail_url.clone(),
                    variants: variants.clone(),
                };
                self.registry
                    .offer_variants(begun.request_id, details, variants)
                    .await?;
                Ok(source)
            }
            Err(e) => {
                self.registry.finish(begun.request_id, Err(e.clone())).await;
                Err(e)
            }
        }
    }

    /// Resolve the user's selection token and start the transfer.
    pub async fn select_variant(
        &self,
        user_id: UserId,
        token: &str,
    ) -> SessionResult<VariantDescriptor> {
        self.registry.select_variant(user_id, token).await
    }

    /// Cancel the user's live session. Returns whether one existed.
    pub async fn cancel(&self, user_id: UserId) -> bool {
        self.registry.cancel(user_id).await
    }

    /// Snapshot the user's live session, if any.
    pub async fn status(&self, user_id: UserId) -> Option<SessionSnapshot> {
        self.registry.status(user_id).await
    }

    /// Number of live sessions.
    pub async fn active_count(&self) -> usize {
        self.registry.active_count().await
    }

    /// Whether a new submission would currently be admitted.
    pub async fn is_accepting(&self) -> bool {
        self.registry.is_accepting().await
    }

    /// Stop admitting, cancel everything, and wait out the drivers.
    pub async fn shutdown(&self) {
        tracing::info!("Orchestrator shutting down");
        self.registry.shutdown().await;
    }
}
