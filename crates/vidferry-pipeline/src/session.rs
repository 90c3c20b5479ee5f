//! Session driver: the transfer pipeline for one accepted request.
//!
//! After the user picks a variant, a driver task walks the session through
//! `Downloading -> Verifying -> Transferring`, writing byte counters into a
//! watch channel. The registry's bridge task turns those counters into
//! throttled events, and a monitor future running alongside each phase
//! enforces the stall timeout and the artifact size ceiling. The driver only
//! reports its outcome; terminal bookkeeping belongs to the registry.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use vidferry_core::ports::{
    DeliveryRequest, EngineError, FetchRequest, FetchedArtifact, MediaEngine, ProgressFn,
    SessionEventEmitter, SourceMeta, TransferChannel, TransferError,
};
use vidferry_core::{
    OrchestratorConfig, RequestId, SessionError, SessionEvent, SessionResult, SessionState,
    SourceUrl, TransferPhase, UserId, VariantDescriptor,
};

use crate::arena::TempFileArena;
use crate::catalog::QualityCatalog;

/// Progress counters for one session.
///
/// Written by the driver's progress callbacks, read by the registry's bridge
/// and the in-flight monitor. `seq` increments on every write so readers can
/// tell fresh samples from ones they have already consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Which leg of the transfer the counters describe.
    pub phase: TransferPhase,
    /// Bytes moved so far in this phase.
    pub transferred: u64,
    /// Total bytes expected for this phase, 0 when unknown.
    pub total: u64,
    /// Monotonic write counter.
    pub seq: u64,
}

impl ProgressUpdate {
    /// Create a new progress update.
    pub const fn new(phase: TransferPhase, transferred: u64, total: u64, seq: u64) -> Self {
        Self {
            phase,
            transferred,
            total,
            seq,
        }
    }
}

/// Shared collaborators handed to every driver task.
#[derive(Clone)]
pub struct SessionDeps {
    /// Orchestrator configuration.
    pub config: OrchestratorConfig,
    /// Engine that probes sources and fetches artifacts.
    pub engine: Arc<dyn MediaEngine>,
    /// Channel that delivers finished artifacts back to the user.
    pub channel: Arc<dyn TransferChannel>,
    /// Event sink for session lifecycle notifications.
    pub emitter: Arc<dyn SessionEventEmitter>,
    /// Scoped temp-file allocator.
    pub arena: TempFileArena,
}

/// Descriptive source fields kept after resolution for the delivery step.
#[derive(Debug, Clone)]
pub struct SourceDetails {
    /// Source title, never empty.
    pub title: String,
    /// Duration in seconds when the source reports one.
    pub duration_secs: Option<u64>,
    /// Channel or uploader name when the source reports one.
    pub channel: Option<String>,
    /// Thumbnail URL when the source reports one.
    pub thumbnail_url: Option<String>,
}

/// Everything a driver task needs to move one selected variant.
pub struct TransferJob {
    /// Session identity.
    pub request_id: RequestId,
    /// Owner of the session.
    pub user_id: UserId,
    /// Validated source URL.
    pub url: SourceUrl,
    /// The variant the user picked.
    pub variant: VariantDescriptor,
    /// Source metadata captured at resolution.
    pub details: SourceDetails,
    /// Cancellation token (shared with the registry entry).
    pub cancel: CancellationToken,
    /// State mirror for the registry's snapshots.
    pub state_tx: watch::Sender<SessionState>,
    /// Progress sink (the bridge subscribes to this).
    pub progress_tx: watch::Sender<ProgressUpdate>,
}

/// Probe the source and build the selectable variant menu.
///
/// Engine-side failures that look transient are retried with exponential
/// backoff; anything permanent maps to [`SessionError::Unresolvable`].
pub async fn resolve_source(
    url: &SourceUrl,
    engine: &dyn MediaEngine,
    catalog: QualityCatalog,
    config: &OrchestratorConfig,
) -> SessionResult<(SourceDetails, Vec<VariantDescriptor>)> {
    let meta = probe_with_retries(url, engine, config).await?;
    let variants = catalog.build(&meta)?;

    let title = if meta.title.trim().is_empty() {
        "Unknown".to_string()
    } else {
        meta.title
    };
    let details = SourceDetails {
        title,
        duration_secs: meta.duration_secs,
        channel: meta.channel,
        thumbnail_url: meta.thumbnail_url,
    };

    Ok((details, variants))
}

async fn probe_with_retries(
    url: &SourceUrl,
    engine: &dyn MediaEngine,
    config: &OrchestratorConfig,
) -> SessionResult<SourceMeta> {
    let attempts = config.download_attempts.max(1);
    let mut last: Option<EngineError> = None;

    for attempt in 1..=attempts {
        if attempt > 1 {
            let delay = backoff_delay(config.retry_base_delay, attempt);
            tracing::debug!(url = %url, attempt, delay_secs = delay.as_secs(), "Retrying probe");
            sleep(delay).await;
        }

        match engine.probe(url).await {
            Ok(meta) => return Ok(meta),
            Err(e) if e.is_cancelled() => return Err(SessionError::Cancelled),
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::warn!(url = %url, attempt, error = %e, "Probe attempt failed");
                last = Some(e);
            }
            Err(e) => return Err(map_probe_error(&e)),
        }
    }

    Err(last.map_or_else(
        || SessionError::internal("probe retry loop exhausted without an error"),
        |e| map_probe_error(&e),
    ))
}

fn map_probe_error(e: &EngineError) -> SessionError {
    match e {
        EngineError::Cancelled => SessionError::Cancelled,
        EngineError::MissingBinary { .. } => {
            SessionError::internal(format!("media engine unavailable: {e}"))
        }
        _ => SessionError::unresolvable(e.to_string()),
    }
}

/// Drive one selected variant end to end.
///
/// Returns the session outcome; the registry translates it into the terminal
/// state, the closing events, and the scope disposal.
pub async fn run_transfer(job: TransferJob, deps: &SessionDeps) -> SessionResult<()> {
    advance_state(&job, deps, SessionState::Downloading)?;

    let scope = deps.arena.allocate(job.request_id).await?;
    let seq = Arc::new(AtomicU64::new(0));

    let artifact = fetch_phase(&job, deps, &scope, &seq).await?;

    advance_state(&job, deps, SessionState::Verifying)?;
    verify_artifact(job.request_id, &artifact, deps.config.max_artifact_bytes).await?;

    advance_state(&job, deps, SessionState::Transferring)?;
    deliver_phase(&job, deps, &artifact, &seq).await?;

    // Land the last snapshot on 100% so the bridge's closing emit is exact.
    let final_seq = seq.fetch_add(1, Ordering::Relaxed) + 1;
    let artifact_bytes = artifact.bytes;
    job.progress_tx.send_modify(|state| {
        state.phase = TransferPhase::Upload;
        if state.total == 0 {
            state.total = artifact_bytes;
        }
        state.transferred = state.total;
        state.seq = final_seq;
    });

    Ok(())
}

/// Race the download attempts against cancellation and the transfer monitor.
async fn fetch_phase(
    job: &TransferJob,
    deps: &SessionDeps,
    scope: &Path,
    seq: &Arc<AtomicU64>,
) -> SessionResult<FetchedArtifact> {
    let progress_rx = job.progress_tx.subscribe();
    let ceiling = deps.config.max_artifact_bytes;

    tokio::select! {
        biased;

        () = job.cancel.cancelled() => {
            tracing::info!(request_id = %job.request_id, "Download cancelled");
            Err(SessionError::Cancelled)
        }

        violation = watch_transfer(progress_rx, Some(ceiling), deps.config.stall_timeout) => {
            tracing::warn!(
                request_id = %job.request_id,
                error = %violation,
                "Download aborted by transfer monitor"
            );
            Err(violation)
        }

        result = fetch_attempts(job, deps, scope, seq) => result,
    }
}

async fn fetch_attempts(
    job: &TransferJob,
    deps: &SessionDeps,
    scope: &Path,
    seq: &Arc<AtomicU64>,
) -> SessionResult<FetchedArtifact> {
    let attempts = deps.config.download_attempts.max(1);
    let mut last: Option<EngineError> = None;

    for attempt in 1..=attempts {
        if attempt > 1 {
            let delay = backoff_delay(deps.config.retry_base_delay, attempt);
            tracing::info!(
                request_id = %job.request_id,
                attempt,
                delay_secs = delay.as_secs(),
                "Retrying download"
            );
            sleep(delay).await;
        }

        let progress = progress_callback(
            job.progress_tx.clone(),
            TransferPhase::Download,
            Arc::clone(seq),
        );
        let request = FetchRequest {
            url: &job.url,
            selector: &job.variant.id,
            dest_dir: scope,
            max_bytes: Some(deps.config.max_artifact_bytes),
            progress: Some(&progress),
            cancel: job.cancel.clone(),
        };

        match deps.engine.fetch(request).await {
            Ok(artifact) => {
                tracing::info!(
                    request_id = %job.request_id,
                    bytes = artifact.bytes,
                    path = %artifact.path.display(),
                    "Download finished"
                );
                return Ok(artifact);
            }
            Err(e) if e.is_cancelled() => return Err(SessionError::Cancelled),
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::warn!(
                    request_id = %job.request_id,
                    attempt,
                    error = %e,
                    "Download attempt failed"
                );
                last = Some(e);
            }
            Err(e) => return Err(SessionError::download_failed_after(e.to_string(), attempt)),
        }
    }

    let message = last.map_or_else(|| "download failed".to_string(), |e| e.to_string());
    Err(SessionError::download_failed_after(message, attempts))
}

/// Race the upload attempts against cancellation and the stall monitor.
async fn deliver_phase(
    job: &TransferJob,
    deps: &SessionDeps,
    artifact: &FetchedArtifact,
    seq: &Arc<AtomicU64>,
) -> SessionResult<()> {
    let progress_rx = job.progress_tx.subscribe();

    tokio::select! {
        biased;

        () = job.cancel.cancelled() => {
            tracing::info!(request_id = %job.request_id, "Upload cancelled");
            Err(SessionError::Cancelled)
        }

        violation = watch_transfer(progress_rx, None, deps.config.stall_timeout) => {
            tracing::warn!(
                request_id = %job.request_id,
                error = %violation,
                "Upload aborted by transfer monitor"
            );
            Err(violation)
        }

        result = deliver_attempts(job, deps, artifact, seq) => result,
    }
}

async fn deliver_attempts(
    job: &TransferJob,
    deps: &SessionDeps,
    artifact: &FetchedArtifact,
    seq: &Arc<AtomicU64>,
) -> SessionResult<()> {
    let attempts = deps.config.upload_attempts.max(1);
    let mut last: Option<TransferError> = None;

    for attempt in 1..=attempts {
        if attempt > 1 {
            let delay = backoff_delay(deps.config.retry_base_delay, attempt);
            tracing::info!(
                request_id = %job.request_id,
                attempt,
                delay_secs = delay.as_secs(),
                "Retrying upload"
            );
            sleep(delay).await;
        }

        let progress = progress_callback(
            job.progress_tx.clone(),
            TransferPhase::Upload,
            Arc::clone(seq),
        );
        let request = DeliveryRequest {
            request_id: job.request_id,
            user_id: job.user_id,
            artifact: &artifact.path,
            title: &job.details.title,
            channel: job.details.channel.as_deref(),
            duration_secs: job.details.duration_secs,
            height: job.variant.height,
            thumbnail_url: job.details.thumbnail_url.as_deref(),
            progress: Some(&progress),
            cancel: job.cancel.clone(),
        };

        match deps.channel.deliver(request).await {
            Ok(()) => {
                tracing::info!(request_id = %job.request_id, "Upload finished");
                return Ok(());
            }
            Err(e) if e.is_cancelled() => return Err(SessionError::Cancelled),
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::warn!(
                    request_id = %job.request_id,
                    attempt,
                    error = %e,
                    "Upload attempt failed"
                );
                last = Some(e);
            }
            Err(e) => return Err(SessionError::upload_failed_after(e.to_string(), attempt)),
        }
    }

    let message = last.map_or_else(|| "upload failed".to_string(), |e| e.to_string());
    Err(SessionError::upload_failed_after(message, attempts))
}

/// Check the downloaded artifact before handing it to the transfer channel.
///
/// A missing, empty, or truncated file fails the session rather than pushing
/// a broken artifact at the user. The ceiling is re-checked here because
/// engines without mid-flight size reporting only reveal the real size now.
async fn verify_artifact(
    request_id: RequestId,
    artifact: &FetchedArtifact,
    limit: u64,
) -> SessionResult<()> {
    let meta = tokio::fs::metadata(&artifact.path)
        .await
        .map_err(|e| SessionError::integrity(format!("artifact missing after download: {e}")))?;

    if !meta.is_file() {
        return Err(SessionError::integrity("artifact is not a regular file"));
    }

    let on_disk = meta.len();
    if on_disk == 0 {
        return Err(SessionError::integrity("artifact is empty"));
    }
    if artifact.bytes > 0 && on_disk != artifact.bytes {
        return Err(SessionError::integrity(format!(
            "artifact size mismatch: engine reported {} bytes, found {on_disk}",
            artifact.bytes
        )));
    }
    if on_disk > limit {
        return Err(SessionError::size_exceeded(limit, on_disk));
    }

    tracing::debug!(request_id = %request_id, bytes = on_disk, "Artifact verified");
    Ok(())
}

/// Watch the progress channel for stall and size-ceiling violations.
///
/// Resolves with the violation; pends forever once all senders are gone.
async fn watch_transfer(
    mut rx: watch::Receiver<ProgressUpdate>,
    ceiling: Option<u64>,
    stall: Duration,
) -> SessionError {
    loop {
        match timeout(stall, rx.changed()).await {
            Err(_) => return SessionError::stalled(stall.as_secs()),
            Ok(Err(_)) => {
                // Senders gone, the phase is over. Nothing left to police.
                std::future::pending::<()>().await;
            }
            Ok(Ok(())) => {
                let update = *rx.borrow_and_update();
                if let Some(limit) = ceiling {
                    if update.transferred > limit {
                        return SessionError::size_exceeded(limit, update.transferred);
                    }
                    if update.total > limit {
                        return SessionError::size_exceeded(limit, update.total);
                    }
                }
            }
        }
    }
}

/// Build the progress callback handed to an engine or channel.
fn progress_callback(
    progress_tx: watch::Sender<ProgressUpdate>,
    phase: TransferPhase,
    seq: Arc<AtomicU64>,
) -> ProgressFn {
    Box::new(move |transferred, total| {
        let current_seq = seq.fetch_add(1, Ordering::Relaxed) + 1;
        progress_tx.send_modify(|state| {
            state.phase = phase;
            state.transferred = transferred;
            state.total = total;
            state.seq = current_seq;
        });
    })
}

/// Advance the session's mirrored state, rejecting illegal transitions.
fn advance_state(job: &TransferJob, deps: &SessionDeps, next: SessionState) -> SessionResult<()> {
    let current = *job.state_tx.borrow();
    if !current.can_advance_to(next) {
        return Err(SessionError::internal(format!(
            "illegal session transition {current} -> {next}"
        )));
    }
    job.state_tx.send_replace(next);
    deps.emitter.emit(SessionEvent::state_changed(job.request_id, next));
    tracing::debug!(request_id = %job.request_id, state = %next, "Session advanced");
    Ok(())
}

/// Delay before retry `attempt` (numbered from 1): the second attempt waits
/// the base delay, doubling from there, capped at 64x.
const fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(2);
    let exponent = if exponent > 6 { 6 } else { exponent };
    base.saturating_mul(1 << exponent)
}
