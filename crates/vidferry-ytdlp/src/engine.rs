//! Process orchestration for the yt-dlp engine.
//!
//! Both operations spawn the binary with `kill_on_drop`, so dropping an
//! in-flight future (cancellation, timeout) tears the child down with it.
//! `fetch` streams stdout line by line, forwarding protocol lines to the
//! progress callback, while stderr is collected in the background for
//! failure classification after exit.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;

use vidferry_core::SourceUrl;
use vidferry_core::ports::{
    EngineError, EngineResult, FetchRequest, FetchedArtifact, MediaEngine, SourceMeta,
};

use crate::{locate, probe, progress};

/// Socket timeout passed to yt-dlp, in seconds.
const SOCKET_TIMEOUT_SECS: u64 = 30;

/// Overall budget for one `-J` probe call.
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Output template relative to the request's scope directory.
const OUTPUT_TEMPLATE: &str = "%(id)s.%(ext)s";

/// Container for merged video+audio selections.
const MERGED_CONTAINER: &str = "mp4";

/// Remux without re-encoding, with moov up front for streamed playback.
const FFMPEG_REMUX_ARGS: &str = "ffmpeg:-c copy -movflags +faststart -max_muxing_queue_size 9999";

/// stderr markers for sources that exist but cannot be fetched. Retrying
/// these is pointless, so they map to [`EngineError::Unavailable`].
const UNAVAILABLE_MARKERS: [&str; 8] = [
    "is not a valid url",
    "unsupported url",
    "video unavailable",
    "private video",
    "sign in to confirm",
    "not available in your country",
    "members-only",
    "has been removed",
];

/// Media engine backed by the yt-dlp executable.
pub struct YtDlpEngine {
    binary: PathBuf,
    cookies_file: Option<PathBuf>,
    probe_timeout: Duration,
}

impl YtDlpEngine {
    /// Create an engine around an explicit binary path.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cookies_file: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Create an engine by discovering the binary (env override, then
    /// `PATH`).
    pub fn locate() -> EngineResult<Self> {
        let binary = locate::find_binary()?;
        tracing::info!(binary = %binary.display(), "yt-dlp located");
        Ok(Self::new(binary))
    }

    /// Pass a Netscape cookies file to every invocation.
    #[must_use]
    pub fn with_cookies_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookies_file = Some(path.into());
        self
    }

    /// Override the probe time budget.
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Flags shared by every invocation.
    fn common_args(&self, cmd: &mut Command) {
        cmd.arg("--no-warnings")
            .arg("--socket-timeout")
            .arg(SOCKET_TIMEOUT_SECS.to_string())
            .arg("--no-playlist");
        if let Some(cookies) = &self.cookies_file {
            cmd.arg("--cookies").arg(cookies);
        }
    }
}

#[async_trait]
impl MediaEngine for YtDlpEngine {
    async fn probe(&self, url: &SourceUrl) -> EngineResult<SourceMeta> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-J");
        self.common_args(&mut cmd);
        cmd.arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(url = %url, "Probing source");
        let child = cmd.spawn().map_err(|e| spawn_error(&self.binary, &e))?;

        let output = timeout(self.probe_timeout, child.wait_with_output())
            .await
            .map_err(|_| EngineError::timeout(self.probe_timeout.as_secs()))?
            .map_err(|e| {
                EngineError::process_failed(format!("yt-dlp did not run to completion: {e}"))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(
                stderr.trim(),
                &format!("yt-dlp exited with {}", output.status),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        probe::parse_probe_output(&stdout)
    }

    async fn fetch(&self, request: FetchRequest<'_>) -> EngineResult<FetchedArtifact> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-f")
            .arg(request.selector)
            .arg("--newline")
            .arg("--quiet")
            .arg("--progress")
            .arg("--progress-template")
            .arg(progress::PROGRESS_TEMPLATE)
            .arg("--merge-output-format")
            .arg(MERGED_CONTAINER)
            .arg("--postprocessor-args")
            .arg(FFMPEG_REMUX_ARGS)
            .arg("-o")
            .arg(request.dest_dir.join(OUTPUT_TEMPLATE));
        self.common_args(&mut cmd);
        if let Some(max_bytes) = request.max_bytes {
            cmd.arg("--max-filesize").arg(max_bytes.to_string());
        }
        cmd.arg(request.url.as_str());

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&self.binary, &e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::process_failed("child stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::process_failed("child stderr was not captured"))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = BufReader::new(stderr).read_to_end(&mut buf).await;
            buf
        });

        tracing::debug!(url = %request.url, selector = request.selector, "Fetch started");
        let mut lines = BufReader::new(stdout).lines();

        loop {
            tokio::select! {
                biased;

                () = request.cancel.cancelled() => {
                    let _ = child.kill().await;
                    tracing::debug!(url = %request.url, "Fetch cancelled, child killed");
                    return Err(EngineError::Cancelled);
                }

                line = lines.next_line() => {
                    let line = line.map_err(|e| {
                        EngineError::process_failed(format!("reading yt-dlp output: {e}"))
                    })?;
                    let Some(line) = line else { break };
                    if line.trim().is_empty() {
                        continue;
                    }

                    if let Ok(update) = progress::parse_progress_line(&line) {
                        if let Some(callback) = request.progress {
                            callback(update.downloaded, update.total);
                        }
                    } else {
                        // Merger/postprocessor chatter; not part of the
                        // protocol.
                        tracing::trace!(line = %line, "yt-dlp output");
                    }
                }
            }
        }

        let status = child.wait().await.map_err(|e| {
            EngineError::process_failed(format!("yt-dlp did not run to completion: {e}"))
        })?;
        let stderr_buf = stderr_task.await.unwrap_or_default();
        let stderr_text = String::from_utf8_lossy(&stderr_buf);
        let stderr_text = stderr_text.trim();

        if !status.success() {
            return Err(classify_failure(
                stderr_text,
                &format!("yt-dlp exited with {status}"),
            ));
        }
        if !stderr_text.is_empty() {
            tracing::debug!(stderr = %stderr_text, "yt-dlp stderr despite success");
        }

        resolve_artifact(request.dest_dir).await
    }
}

/// Map a spawn failure, distinguishing a missing binary from the rest.
fn spawn_error(binary: &Path, error: &std::io::Error) -> EngineError {
    if error.kind() == ErrorKind::NotFound {
        EngineError::missing_binary(format!("{} not found", binary.display()))
    } else {
        EngineError::process_failed(format!("failed to spawn {}: {error}", binary.display()))
    }
}

/// Classify a non-zero exit from its stderr.
fn classify_failure(stderr: &str, fallback: &str) -> EngineError {
    let detail = extract_error_line(stderr).unwrap_or_else(|| fallback.to_string());
    let lowered = stderr.to_lowercase();
    if UNAVAILABLE_MARKERS.iter().any(|m| lowered.contains(m)) {
        EngineError::unavailable(detail)
    } else {
        EngineError::process_failed(detail)
    }
}

/// The most useful line of stderr: the last `ERROR:` line if there is one,
/// otherwise the last non-empty line.
fn extract_error_line(stderr: &str) -> Option<String> {
    let line = stderr
        .lines()
        .rev()
        .find(|l| l.contains("ERROR:"))
        .or_else(|| stderr.lines().rev().find(|l| !l.trim().is_empty()))?;
    Some(line.trim().trim_start_matches("ERROR:").trim().to_string())
}

/// Find the artifact yt-dlp left in the scope directory.
///
/// The scope is private to one request and empty before the fetch, so the
/// artifact is whatever complete file remains; `.mp4` wins over leftover
/// intermediates, bigger wins within a container.
async fn resolve_artifact(dest_dir: &Path) -> EngineResult<FetchedArtifact> {
    let mut entries = fs::read_dir(dest_dir).await.map_err(|e| {
        EngineError::process_failed(format!("cannot read scope {}: {e}", dest_dir.display()))
    })?;

    let mut best: Option<(bool, u64, PathBuf)> = None;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() || is_partial(&path) {
            continue;
        }
        let is_mp4 = path.extension().and_then(|e| e.to_str()) == Some(MERGED_CONTAINER);
        let ranking = (is_mp4, meta.len());
        if best.as_ref().is_none_or(|(m, l, _)| ranking > (*m, *l)) {
            best = Some((is_mp4, meta.len(), path));
        }
    }

    best.map(|(_, bytes, path)| {
        tracing::debug!(path = %path.display(), bytes, "Artifact resolved");
        FetchedArtifact { path, bytes }
    })
    .ok_or_else(|| EngineError::process_failed("yt-dlp reported success but left no artifact"))
}

fn is_partial(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("part" | "ytdl" | "temp")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_unavailable_source() {
        let stderr = "WARNING: [youtube] something minor\n\
                      ERROR: [youtube] dQw4w9WgXcQ: Private video. Sign in if you've been granted access";
        let err = classify_failure(stderr, "fallback");

        assert!(matches!(err, EngineError::Unavailable { .. }));
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("Private video"));
    }

    #[test]
    fn test_classify_network_failure_is_retryable() {
        let stderr = "ERROR: unable to download video data: HTTP Error 503: Service Unavailable";
        let err = classify_failure(stderr, "fallback");

        assert!(matches!(err, EngineError::ProcessFailed { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_empty_stderr_uses_fallback() {
        let err = classify_failure("", "yt-dlp exited with signal: 9 (SIGKILL)");
        assert!(err.to_string().contains("SIGKILL"));
    }

    #[test]
    fn test_extract_error_line_prefers_last_error() {
        let stderr = "ERROR: first problem\nsome context\nERROR: second problem";
        assert_eq!(extract_error_line(stderr).unwrap(), "second problem");
    }

    #[test]
    fn test_extract_error_line_falls_back_to_last_line() {
        let stderr = "no structured errors here\njust chatter";
        assert_eq!(extract_error_line(stderr).unwrap(), "just chatter");
        assert!(extract_error_line("  \n \n").is_none());
    }

    #[tokio::test]
    async fn test_resolve_artifact_prefers_mp4() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("video.mp4"), vec![0u8; 100])
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("video.webm"), vec![0u8; 5000])
            .await
            .unwrap();

        let artifact = resolve_artifact(dir.path()).await.unwrap();
        assert_eq!(artifact.path, dir.path().join("video.mp4"));
        assert_eq!(artifact.bytes, 100);
    }

    #[tokio::test]
    async fn test_resolve_artifact_skips_partials() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("video.mp4.part"), vec![0u8; 9000])
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("video.mp4"), vec![0u8; 400])
            .await
            .unwrap();

        let artifact = resolve_artifact(dir.path()).await.unwrap();
        assert_eq!(artifact.bytes, 400);
    }

    #[tokio::test]
    async fn test_resolve_artifact_rejects_empty_scope() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_artifact(dir.path()).await.unwrap_err();
        assert!(matches!(err, EngineError::ProcessFailed { .. }));

        tokio::fs::write(dir.path().join("only.part"), b"half")
            .await
            .unwrap();
        let err = resolve_artifact(dir.path()).await.unwrap_err();
        assert!(matches!(err, EngineError::ProcessFailed { .. }));
    }
}
