//! Session registry: single-flight bookkeeping for active sessions.
//!
//! One entry per user lives in a map behind a single mutex; every lifecycle
//! decision (admission, selection, cancellation, terminal wrap-up) happens
//! under that lock so there is exactly one serialization point. Driver tasks
//! never touch the map; they report back through [`SessionRegistry::finish`].
//!
//! Entries hold watch senders for state and progress. A per-session bridge
//! task subscribes to the progress channel and turns raw counters into
//! throttled [`SessionEvent::Progress`] emissions with a smoothed speed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;

use vidferry_core::{
    FailureKind, ProgressSnapshot, RequestId, SessionError, SessionEvent, SessionResult,
    SessionSnapshot, SessionState, SourceUrl, TransferPhase, UserId, VariantDescriptor,
};

use crate::session::{self, ProgressUpdate, SessionDeps, SourceDetails, TransferJob};
use crate::throttle::ProgressThrottle;

/// EWA smoothing factor for speed calculation (2% of instant speed, 98% of
/// previous).
const EWA_SMOOTHING: f64 = 0.02;

/// Sampling cadence of the progress bridge.
const BRIDGE_TICK: Duration = Duration::from_millis(250);

/// State for one live session.
struct ActiveSession {
    /// Session identity.
    request_id: RequestId,
    /// Owning user.
    user_id: UserId,
    /// Validated source URL.
    source_url: SourceUrl,
    /// Admission timestamp.
    created_at: DateTime<Utc>,
    /// Cancellation token shared with whichever future is driving.
    cancel: CancellationToken,
    /// Mirrored lifecycle state for snapshots.
    state_tx: watch::Sender<SessionState>,
    /// Progress sender (the bridge subscribes to this).
    progress_tx: watch::Sender<ProgressUpdate>,
    /// Source metadata, present once resolution succeeded.
    details: Option<SourceDetails>,
    /// Offered menu, present once resolution succeeded.
    variants: Vec<VariantDescriptor>,
    /// The variant the user picked, set at most once.
    selected: Option<VariantDescriptor>,
    /// Progress bridge task.
    bridge: Option<JoinHandle<()>>,
    /// Driver task, present once a variant was selected.
    driver: Option<JoinHandle<()>>,
}

/// Handle returned by [`SessionRegistry::begin`] for the resolution phase.
#[derive(Debug)]
pub struct BegunSession {
    /// Identity of the admitted session.
    pub request_id: RequestId,
    /// Token the resolution future races against.
    pub cancel: CancellationToken,
}

/// Registry of live sessions, keyed by user.
pub struct SessionRegistry {
    deps: SessionDeps,
    active: Mutex<IndexMap<UserId, ActiveSession>>,
    accepting: AtomicBool,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            deps,
            active: Mutex::new(IndexMap::new()),
            accepting: AtomicBool::new(true),
        }
    }

    /// Shared collaborators for driver and resolution futures.
    #[must_use]
    pub const fn deps(&self) -> &SessionDeps {
        &self.deps
    }

    /// Admit a new session for `user_id`.
    ///
    /// Rejects with [`SessionError::AlreadyActive`] while the user has a
    /// live session and with [`SessionError::CapacityExceeded`] at the
    /// global cap or after shutdown began. On admission the session is in
    /// `Created`, its progress bridge is running, and a `SessionStarted`
    /// event has been emitted.
    pub async fn begin(&self, user_id: UserId, url: SourceUrl) -> SessionResult<BegunSession> {
        let max_sessions = self.deps.config.max_active_sessions;
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(SessionError::capacity_exceeded(max_sessions));
        }

        let request_id = RequestId::new();
        let cancel = CancellationToken::new();

        {
            let mut active = self.active.lock().await;
            if active.contains_key(&user_id) {
                return Err(SessionError::AlreadyActive);
            }
            if active.len() >= max_sessions {
                return Err(SessionError::capacity_exceeded(max_sessions));
            }

            let (state_tx, _) = watch::channel(SessionState::Created);
            let (progress_tx, _) = watch::channel(ProgressUpdate::default());
            let bridge =
                self.spawn_progress_bridge(request_id, progress_tx.subscribe(), cancel.clone());

            active.insert(
                user_id,
                ActiveSession {
                    request_id,
                    user_id,
                    source_url: url.clone(),
                    created_at: Utc::now(),
                    cancel: cancel.clone(),
                    state_tx,
                    progress_tx,
                    details: None,
                    variants: Vec::new(),
                    selected: None,
                    bridge: Some(bridge),
                    driver: None,
                },
            );
        }

        tracing::info!(request_id = %request_id, user_id = %user_id, url = %url, "Session started");
        self.deps.emitter.emit(SessionEvent::started(request_id, user_id));

        Ok(BegunSession { request_id, cancel })
    }

    /// Attach the resolved menu to a session and open its selection window.
    ///
    /// Fails with [`SessionError::Cancelled`] when the session was cancelled
    /// or released while resolution was in flight.
    pub async fn offer_variants(
        self: &Arc<Self>,
        request_id: RequestId,
        details: SourceDetails,
        variants: Vec<VariantDescriptor>,
    ) -> SessionResult<()> {
        let ready = SessionEvent::variants_ready(
            request_id,
            details.title.clone(),
            details.channel.clone(),
            variants.clone(),
        );
        let offered = variants.len();

        let cancelled = {
            let mut active = self.active.lock().await;
            let Some(entry) = active.values_mut().find(|s| s.request_id == request_id) else {
                return Err(SessionError::Cancelled);
            };
            if entry.cancel.is_cancelled() {
                true
            } else {
                let current = *entry.state_tx.borrow();
                if !current.can_advance_to(SessionState::AwaitingSelection) {
                    return Err(SessionError::internal(format!(
                        "illegal session transition {current} -> {}",
                        SessionState::AwaitingSelection
                    )));
                }
                entry.details = Some(details);
                entry.variants = variants;
                entry.state_tx.send_replace(SessionState::AwaitingSelection);
                false
            }
        };

        if cancelled {
            self.finish(request_id, Err(SessionError::Cancelled)).await;
            return Err(SessionError::Cancelled);
        }

        self.deps.emitter.emit(SessionEvent::state_changed(
            request_id,
            SessionState::AwaitingSelection,
        ));
        self.deps.emitter.emit(ready);
        tracing::info!(request_id = %request_id, offered, "Variant menu offered");

        // Unselected menus time out instead of pinning their slot forever.
        let registry = Arc::clone(self);
        let window = self.deps.config.selection_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            registry.expire_if_unselected(request_id).await;
        });

        Ok(())
    }

    /// Resolve a selection token and launch the transfer driver.
    ///
    /// An unknown token is rejected without touching session state, so the
    /// user can pick again. A session that is not awaiting selection (or
    /// already has a pick) rejects with [`SessionError::SelectionClosed`].
    pub async fn select_variant(
        self: &Arc<Self>,
        user_id: UserId,
        token: &str,
    ) -> SessionResult<VariantDescriptor> {
        let (request_id, variant) = {
            let mut active = self.active.lock().await;
            let Some(entry) = active.get_mut(&user_id) else {
                return Err(SessionError::SelectionClosed);
            };
            if !entry.state_tx.borrow().accepts_selection() || entry.selected.is_some() {
                return Err(SessionError::SelectionClosed);
            }
            let Some(variant) = entry.variants.iter().find(|v| v.id == token).cloned() else {
                return Err(SessionError::unknown_variant(token));
            };
            let Some(details) = entry.details.clone() else {
                return Err(SessionError::internal("session has no source details"));
            };

            entry.selected = Some(variant.clone());

            let job = TransferJob {
                request_id: entry.request_id,
                user_id,
                url: entry.source_url.clone(),
                variant: variant.clone(),
                details,
                cancel: entry.cancel.clone(),
                state_tx: entry.state_tx.clone(),
                progress_tx: entry.progress_tx.clone(),
            };

            let registry = Arc::clone(self);
            let deps = self.deps.clone();
            let request_id = entry.request_id;
            entry.driver = Some(tokio::spawn(async move {
                let result = session::run_transfer(job, &deps).await;
                registry.finish(request_id, result).await;
            }));

            (request_id, variant)
        };

        tracing::info!(
            request_id = %request_id,
            user_id = %user_id,
            variant = %variant.id,
            "Variant selected"
        );
        Ok(variant)
    }

    /// Cancel the user's live session, if any.
    ///
    /// Returns whether a session was there to cancel. A session with a
    /// running future is cancelled through its token and wrapped up by
    /// whoever owns that future; an idle one (waiting for selection) is
    /// wrapped up here directly.
    pub async fn cancel(&self, user_id: UserId) -> bool {
        let (request_id, idle_entry) = {
            let mut active = self.active.lock().await;
            let Some(entry) = active.get(&user_id) else {
                return false;
            };
            let request_id = entry.request_id;
            entry.cancel.cancel();

            let idle = entry.driver.is_none()
                && entry.selected.is_none()
                && entry.state_tx.borrow().accepts_selection();
            if idle {
                (request_id, active.shift_remove(&user_id))
            } else {
                (request_id, None)
            }
        };

        if let Some(entry) = idle_entry {
            tracing::info!(request_id = %request_id, user_id = %user_id, "Cancelled idle session");
            self.finish_entry(entry, Err(SessionError::Cancelled)).await;
        } else {
            tracing::info!(request_id = %request_id, user_id = %user_id, "Cancelled active session");
        }
        true
    }

    /// Snapshot the user's live session.
    pub async fn status(&self, user_id: UserId) -> Option<SessionSnapshot> {
        let active = self.active.lock().await;
        active.get(&user_id).map(build_snapshot)
    }

    /// Number of live sessions.
    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }

    /// Whether a new submission would currently be admitted.
    pub async fn is_accepting(&self) -> bool {
        if !self.accepting.load(Ordering::SeqCst) {
            return false;
        }
        self.active.lock().await.len() < self.deps.config.max_active_sessions
    }

    /// Stop admitting new sessions.
    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    /// Remove a session without the terminal ceremony and dispose its scope.
    ///
    /// The disposal runs whether or not the session still exists, so a
    /// release after a crash still reclaims disk.
    pub async fn release(&self, request_id: RequestId) {
        if let Some(entry) = self.take_by_request(request_id).await {
            entry.cancel.cancel();
            if let Some(bridge) = entry.bridge {
                bridge.abort();
            }
            if let Some(driver) = entry.driver {
                driver.abort();
            }
            tracing::debug!(request_id = %request_id, "Session released");
        }
        self.deps.arena.dispose(request_id).await;
    }

    /// Wrap up a session with the outcome its driving future reported.
    ///
    /// Idempotent: the entry leaves the map exactly once, so a second
    /// finisher (late driver vs. shutdown) becomes a no-op.
    pub(crate) async fn finish(&self, request_id: RequestId, result: SessionResult<()>) {
        let Some(entry) = self.take_by_request(request_id).await else {
            tracing::debug!(request_id = %request_id, "Ignoring finish for released session");
            return;
        };
        self.finish_entry(entry, result).await;
    }

    /// Stop admitting, cancel every live session, and wait out the drivers.
    ///
    /// Drivers that ignore their token past the abort grace are aborted;
    /// whatever is left in the map afterwards is wrapped up as cancelled.
    pub async fn shutdown(&self) {
        self.stop_accepting();

        let (tokens, drivers) = {
            let mut active = self.active.lock().await;
            let mut tokens = Vec::with_capacity(active.len());
            let mut drivers = Vec::new();
            for entry in active.values_mut() {
                tokens.push(entry.cancel.clone());
                if let Some(driver) = entry.driver.take() {
                    drivers.push(driver);
                }
            }
            (tokens, drivers)
        };

        if !tokens.is_empty() {
            tracing::info!(count = tokens.len(), "Shutdown: cancelling active sessions");
        }
        for token in tokens {
            token.cancel();
        }

        let deadline = Instant::now() + self.deps.config.abort_grace;
        for driver in drivers {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let abort = driver.abort_handle();
            if timeout(remaining, driver).await.is_err() {
                abort.abort();
            }
        }

        let leftovers: Vec<ActiveSession> = {
            let mut active = self.active.lock().await;
            active.drain(..).map(|(_, entry)| entry).collect()
        };
        for entry in leftovers {
            tracing::warn!(request_id = %entry.request_id, "Releasing session at shutdown");
            self.finish_entry(entry, Err(SessionError::Cancelled)).await;
        }
    }

    /// Cancel a session whose selection window ran out.
    async fn expire_if_unselected(&self, request_id: RequestId) {
        let entry = {
            let mut active = self.active.lock().await;
            let user_id = active.iter().find_map(|(user_id, entry)| {
                let unselected = entry.request_id == request_id
                    && entry.selected.is_none()
                    && entry.state_tx.borrow().accepts_selection();
                unselected.then_some(*user_id)
            });
            user_id.and_then(|user_id| active.shift_remove(&user_id))
        };

        if let Some(entry) = entry {
            tracing::info!(request_id = %request_id, "Selection window expired");
            entry.cancel.cancel();
            self.finish_entry(entry, Err(SessionError::Cancelled)).await;
        }
    }

    async fn take_by_request(&self, request_id: RequestId) -> Option<ActiveSession> {
        let mut active = self.active.lock().await;
        let user_id = active
            .iter()
            .find_map(|(user_id, entry)| (entry.request_id == request_id).then_some(*user_id))?;
        active.shift_remove(&user_id)
    }

    /// Terminal wrap-up for an entry already removed from the map.
    ///
    /// Order matters: the progress bridge drains its final snapshot before
    /// the terminal state is recorded and the closing event goes out, so no
    /// progress ever trails a terminal notification.
    async fn finish_entry(&self, entry: ActiveSession, result: SessionResult<()>) {
        let request_id = entry.request_id;

        drop(entry.progress_tx);
        if let Some(bridge) = entry.bridge {
            let _ = bridge.await;
        }

        let terminal = match &result {
            Ok(()) => SessionState::Completed,
            Err(e) if e.is_cancelled() => SessionState::Cancelled,
            Err(e) => SessionState::Failed {
                kind: e.failure_kind().unwrap_or(FailureKind::Internal),
            },
        };
        let current = *entry.state_tx.borrow();
        if current.can_advance_to(terminal) {
            entry.state_tx.send_replace(terminal);
        }

        match result {
            Ok(()) => {
                tracing::info!(request_id = %request_id, user_id = %entry.user_id, "Session completed");
                self.deps.emitter.emit(SessionEvent::completed(request_id));
            }
            Err(e) if e.is_cancelled() => {
                tracing::info!(request_id = %request_id, user_id = %entry.user_id, "Session cancelled");
                self.deps.emitter.emit(SessionEvent::cancelled(request_id));
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    user_id = %entry.user_id,
                    error = %e,
                    "Session failed"
                );
                let kind = e.failure_kind().unwrap_or(FailureKind::Internal);
                self.deps
                    .emitter
                    .emit(SessionEvent::failed(request_id, kind, e.user_message()));
            }
        }

        self.deps.arena.dispose(request_id).await;
    }

    /// Spawn the task that turns raw progress counters into events.
    ///
    /// Samples the watch channel every [`BRIDGE_TICK`], smooths the speed
    /// with an exponentially weighted average, and lets the throttle decide
    /// which samples become events. When the senders drop it pushes the
    /// last unseen snapshot out unconditionally; on cancellation it emits
    /// nothing further.
    fn spawn_progress_bridge(
        &self,
        request_id: RequestId,
        mut rx: watch::Receiver<ProgressUpdate>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let emitter = Arc::clone(&self.deps.emitter);
        let mut throttle = ProgressThrottle::from_config(&self.deps.config);

        tokio::spawn(async move {
            let mut tick = interval(BRIDGE_TICK);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut last_emitted_seq = 0u64;
            let mut last_phase = TransferPhase::Download;
            let mut last_bytes = 0u64;
            let mut last_time = Instant::now();
            let mut ewa_speed = 0.0f64;
            let mut first_update = true;

            loop {
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => {
                        // No progress on cancel; the cancelled event is final.
                        break;
                    }

                    result = rx.changed() => {
                        if result.is_err() {
                            // Senders dropped: the session is wrapping up.
                            // Push the last snapshot out, throttle or not.
                            let last = *rx.borrow();
                            if last.seq > last_emitted_seq {
                                emitter.emit(SessionEvent::progress(
                                    request_id,
                                    last.phase,
                                    last.transferred,
                                    last.total,
                                    ewa_speed,
                                ));
                            }
                            break;
                        }
                        // New counters land on the next tick.
                    }

                    _ = tick.tick() => {
                        let current = *rx.borrow();
                        if current.seq == 0 {
                            continue;
                        }

                        let now = Instant::now();
                        if current.phase == last_phase {
                            let elapsed = now.duration_since(last_time).as_secs_f64();
                            if elapsed > 0.0 {
                                let delta = current.transferred.saturating_sub(last_bytes);
                                #[allow(clippy::cast_precision_loss)]
                                let instant_speed = delta as f64 / elapsed;

                                if first_update {
                                    ewa_speed = instant_speed;
                                    first_update = false;
                                } else {
                                    ewa_speed = EWA_SMOOTHING.mul_add(
                                        instant_speed,
                                        (1.0 - EWA_SMOOTHING) * ewa_speed,
                                    );
                                }

                                last_bytes = current.transferred;
                                last_time = now;
                            }
                        } else {
                            // Phase flipped: byte counters restart, so does
                            // the speed estimate.
                            last_phase = current.phase;
                            last_bytes = current.transferred;
                            last_time = now;
                            ewa_speed = 0.0;
                            first_update = true;
                        }

                        if current.seq > last_emitted_seq {
                            let snapshot = ProgressSnapshot::new(
                                current.phase,
                                current.transferred,
                                current.total,
                            );
                            if throttle.should_emit(snapshot) {
                                emitter.emit(SessionEvent::progress(
                                    request_id,
                                    current.phase,
                                    current.transferred,
                                    current.total,
                                    ewa_speed,
                                ));
                                last_emitted_seq = current.seq;
                            }
                        }
                    }
                }
            }
        })
    }
}

fn build_snapshot(entry: &ActiveSession) -> SessionSnapshot {
    let progress = *entry.progress_tx.borrow();
    SessionSnapshot {
        request_id: entry.request_id,
        user_id: entry.user_id,
        state: *entry.state_tx.borrow(),
        source_url: entry.source_url.to_string(),
        selected_variant: entry.selected.as_ref().map(|v| v.id.clone()),
        bytes_transferred: progress.transferred,
        bytes_expected: (progress.total > 0).then_some(progress.total),
        created_at: entry.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vidferry_core::OrchestratorConfig;
    use vidferry_core::ports::{
        DeliveryRequest, EngineError, EngineResult, FetchRequest, FetchedArtifact, MediaEngine,
        NoopSessionEmitter, SourceMeta, TransferChannel, TransferResult,
    };

    use crate::arena::TempFileArena;

    struct StubEngine;

    #[async_trait]
    impl MediaEngine for StubEngine {
        async fn probe(&self, _url: &SourceUrl) -> EngineResult<SourceMeta> {
            Err(EngineError::unavailable("stub"))
        }

        async fn fetch(&self, _request: FetchRequest<'_>) -> EngineResult<FetchedArtifact> {
            Err(EngineError::unavailable("stub"))
        }
    }

    struct StubChannel;

    #[async_trait]
    impl TransferChannel for StubChannel {
        async fn deliver(&self, _request: DeliveryRequest<'_>) -> TransferResult<()> {
            Ok(())
        }
    }

    fn test_registry(root: &std::path::Path, max_sessions: usize) -> Arc<SessionRegistry> {
        let config = OrchestratorConfig::new(root).with_max_active_sessions(max_sessions);
        let deps = SessionDeps {
            config,
            engine: Arc::new(StubEngine),
            channel: Arc::new(StubChannel),
            emitter: Arc::new(NoopSessionEmitter::new()),
            arena: TempFileArena::new(root),
        };
        Arc::new(SessionRegistry::new(deps))
    }

    fn test_url() -> SourceUrl {
        SourceUrl::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap()
    }

    #[tokio::test]
    async fn test_begin_rejects_duplicate_user() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(dir.path(), 4);
        let user = UserId::new(7);

        registry.begin(user, test_url()).await.unwrap();
        let err = registry.begin(user, test_url()).await.unwrap_err();

        assert_eq!(err, SessionError::AlreadyActive);
    }

    #[tokio::test]
    async fn test_begin_rejects_at_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(dir.path(), 1);

        registry.begin(UserId::new(1), test_url()).await.unwrap();
        let err = registry
            .begin(UserId::new(2), test_url())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::CapacityExceeded { max_sessions: 1 }
        ));
        assert!(!registry.is_accepting().await);
    }

    #[tokio::test]
    async fn test_begin_rejects_after_stop_accepting() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(dir.path(), 4);

        registry.stop_accepting();
        let err = registry
            .begin(UserId::new(1), test_url())
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::CapacityExceeded { .. }));
    }

    #[tokio::test]
    async fn test_status_reflects_created_session() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(dir.path(), 4);
        let user = UserId::new(3);

        assert!(registry.status(user).await.is_none());

        let begun = registry.begin(user, test_url()).await.unwrap();
        let snapshot = registry.status(user).await.unwrap();

        assert_eq!(snapshot.request_id, begun.request_id);
        assert_eq!(snapshot.state, SessionState::Created);
        assert_eq!(snapshot.bytes_transferred, 0);
        assert!(snapshot.selected_variant.is_none());
    }

    #[tokio::test]
    async fn test_cancel_unknown_user_is_false() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(dir.path(), 4);

        assert!(!registry.cancel(UserId::new(99)).await);
    }

    #[tokio::test]
    async fn test_cancel_frees_the_slot() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(dir.path(), 4);
        let user = UserId::new(5);

        let begun = registry.begin(user, test_url()).await.unwrap();
        assert!(registry.cancel(user).await);
        assert!(begun.cancel.is_cancelled());

        // Created-state sessions are wrapped up by the resolution future;
        // simulate it observing the token.
        registry
            .finish(begun.request_id, Err(SessionError::Cancelled))
            .await;

        assert!(registry.status(user).await.is_none());
        registry.begin(user, test_url()).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_awaiting_selection_wraps_up_directly() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(dir.path(), 4);
        let user = UserId::new(6);

        let begun = registry.begin(user, test_url()).await.unwrap();
        let details = SourceDetails {
            title: "Test Video".to_string(),
            duration_secs: Some(60),
            channel: None,
            thumbnail_url: None,
        };
        let variants = vec![VariantDescriptor::video("137+140", "1080p", "mp4", 1080)];
        registry
            .offer_variants(begun.request_id, details, variants)
            .await
            .unwrap();

        assert!(registry.cancel(user).await);
        assert!(registry.status(user).await.is_none());
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_select_variant_rejects_unknown_token_without_closing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(dir.path(), 4);
        let user = UserId::new(8);

        let begun = registry.begin(user, test_url()).await.unwrap();
        let details = SourceDetails {
            title: "Test Video".to_string(),
            duration_secs: None,
            channel: None,
            thumbnail_url: None,
        };
        let variants = vec![VariantDescriptor::video("22", "720p", "mp4", 720)];
        registry
            .offer_variants(begun.request_id, details, variants)
            .await
            .unwrap();

        let err = registry.select_variant(user, "nope").await.unwrap_err();
        assert!(matches!(err, SessionError::UnknownVariant { .. }));

        // The menu stays open for a corrected pick.
        let snapshot = registry.status(user).await.unwrap();
        assert_eq!(snapshot.state, SessionState::AwaitingSelection);
    }

    #[tokio::test]
    async fn test_select_variant_without_menu_is_closed() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(dir.path(), 4);
        let user = UserId::new(9);

        let err = registry.select_variant(user, "22").await.unwrap_err();
        assert_eq!(err, SessionError::SelectionClosed);

        registry.begin(user, test_url()).await.unwrap();
        let err = registry.select_variant(user, "22").await.unwrap_err();
        assert_eq!(err, SessionError::SelectionClosed);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(dir.path(), 4);
        let user = UserId::new(10);

        let begun = registry.begin(user, test_url()).await.unwrap();
        registry.release(begun.request_id).await;
        registry.release(begun.request_id).await;

        assert!(registry.status(user).await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_drains_idle_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let registry = test_registry(dir.path(), 4);

        registry.begin(UserId::new(11), test_url()).await.unwrap();
        registry.begin(UserId::new(12), test_url()).await.unwrap();

        registry.shutdown().await;

        assert_eq!(registry.active_count().await, 0);
        assert!(!registry.is_accepting().await);
    }
}
