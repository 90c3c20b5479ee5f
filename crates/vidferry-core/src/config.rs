//! Orchestrator configuration.
//!
//! Plain values consumed by the pipeline; reading them from the
//! environment is the service binary's job.

use std::path::PathBuf;
use std::time::Duration;

/// Tunable limits and timings for the orchestration core.
///
/// The defaults match a small single-host deployment; adapters override
/// individual fields with the builder methods.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Global cap on concurrently live sessions.
    pub max_active_sessions: usize,
    /// Hard ceiling on artifact size in bytes. Checked against estimates
    /// before any bytes move and re-checked while they do.
    pub max_artifact_bytes: u64,
    /// Minimum wall-clock gap between progress emissions.
    pub progress_interval: Duration,
    /// Percentage step that forces an emission before the interval is up.
    pub progress_step: f64,
    /// A phase with no byte movement for this long is failed as stalled.
    pub stall_timeout: Duration,
    /// Download attempts before the session fails (first try included).
    pub download_attempts: u32,
    /// Base delay for exponential retry backoff.
    pub retry_base_delay: Duration,
    /// Upload attempts before the session fails (first try included).
    pub upload_attempts: u32,
    /// Directory that holds per-request temp scopes.
    pub workspace_root: PathBuf,
    /// Scopes older than this are removed by the startup sweep.
    pub sweep_grace: Duration,
    /// Most variants ever offered in one selection menu.
    pub max_variants: usize,
    /// A session left in `AwaitingSelection` this long is cancelled.
    pub selection_timeout: Duration,
    /// How long a cancelled engine call may take to wind down before the
    /// session stops waiting for it.
    pub abort_grace: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_active_sessions: 4,
            max_artifact_bytes: 850 * 1024 * 1024,
            progress_interval: Duration::from_secs(3),
            progress_step: 5.0,
            stall_timeout: Duration::from_secs(120),
            download_attempts: 3,
            retry_base_delay: Duration::from_secs(2),
            upload_attempts: 2,
            workspace_root: PathBuf::from("temp"),
            sweep_grace: Duration::from_secs(600),
            max_variants: 8,
            selection_timeout: Duration::from_secs(300),
            abort_grace: Duration::from_secs(5),
        }
    }
}

impl OrchestratorConfig {
    /// Create a config rooted at the given temp directory.
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            ..Default::default()
        }
    }

    /// Set the global session cap.
    #[must_use]
    pub const fn with_max_active_sessions(mut self, max: usize) -> Self {
        self.max_active_sessions = max;
        self
    }

    /// Set the artifact byte ceiling.
    #[must_use]
    pub const fn with_max_artifact_bytes(mut self, bytes: u64) -> Self {
        self.max_artifact_bytes = bytes;
        self
    }

    /// Set the progress emission interval.
    #[must_use]
    pub const fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Set the percentage step that forces an emission.
    #[must_use]
    pub const fn with_progress_step(mut self, step: f64) -> Self {
        self.progress_step = step;
        self
    }

    /// Set the stall timeout.
    #[must_use]
    pub const fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Set the download attempt bound.
    #[must_use]
    pub const fn with_download_attempts(mut self, attempts: u32) -> Self {
        self.download_attempts = attempts;
        self
    }

    /// Set the retry backoff base delay.
    #[must_use]
    pub const fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Set the upload attempt bound.
    #[must_use]
    pub const fn with_upload_attempts(mut self, attempts: u32) -> Self {
        self.upload_attempts = attempts;
        self
    }

    /// Set the stale-scope sweep grace period.
    #[must_use]
    pub const fn with_sweep_grace(mut self, grace: Duration) -> Self {
        self.sweep_grace = grace;
        self
    }

    /// Set the variant menu cap.
    #[must_use]
    pub const fn with_max_variants(mut self, max: usize) -> Self {
        self.max_variants = max;
        self
    }

    /// Set the selection window timeout.
    #[must_use]
    pub const fn with_selection_timeout(mut self, timeout: Duration) -> Self {
        self.selection_timeout = timeout;
        self
    }

    /// Set the forced-abort grace period.
    #[must_use]
    pub const fn with_abort_grace(mut self, grace: Duration) -> Self {
        self.abort_grace = grace;
        self
    }
}
