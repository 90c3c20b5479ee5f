//! Media engine port definition.
//!
//! The engine is the external tool that resolves a URL into raw formats
//! and performs the actual byte transfer to disk. The orchestration core
//! only ever talks to it through this port.
//!
//! # Design
//!
//! - Only core domain types in signatures
//! - Progress flows out through a plain callback; no channel types leak
//! - Cancellation flows in through a `CancellationToken`, checked by the
//!   implementation at its own yield points

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::source_url::SourceUrl;

/// Callback for transfer progress: (`bytes_done`, `bytes_total`).
///
/// `bytes_total` is 0 while the engine does not know the final size.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send + Sync>;

/// One raw format entry exactly as the engine reports it.
///
/// Normalization into user-facing variants happens in the pipeline; this
/// type stays close to the engine's vocabulary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaFormat {
    /// Engine-native format id.
    pub id: String,
    /// Container extension (e.g. `mp4`, `webm`, `m4a`).
    pub container: String,
    /// Video codec tag, `None` when the stream carries no video.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    /// Audio codec tag, `None` when the stream carries no audio.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    /// Vertical resolution in pixels, when video.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Frames per second as reported, when video.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    /// Total bitrate in kbit/s, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<f64>,
    /// Exact or approximate size in bytes, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
}

impl MediaFormat {
    /// True when the entry carries a video stream.
    #[must_use]
    pub fn has_video(&self) -> bool {
        self.video_codec.is_some()
    }

    /// True when the entry carries an audio stream.
    #[must_use]
    pub fn has_audio(&self) -> bool {
        self.audio_codec.is_some()
    }
}

/// Metadata for a resolved source, including its raw format list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceMeta {
    /// Engine-native source id.
    pub source_id: String,
    /// Source title.
    pub title: String,
    /// Duration in whole seconds, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    /// Channel or uploader name, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Thumbnail URL, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// All formats the engine offered, unfiltered.
    pub formats: Vec<MediaFormat>,
}

/// Request payload for one fetch invocation.
///
/// The engine writes the artifact somewhere under `dest_dir` and returns
/// the final path; it never touches disk outside that scope.
pub struct FetchRequest<'a> {
    /// The validated source URL.
    pub url: &'a SourceUrl,
    /// Engine-native selector for the chosen variant.
    pub selector: &'a str,
    /// Scope directory the artifact must land in.
    pub dest_dir: &'a Path,
    /// Advisory size cap the engine may enforce early, in bytes.
    pub max_bytes: Option<u64>,
    /// Progress callback, invoked from the engine's own task.
    pub progress: Option<&'a ProgressFn>,
    /// Cancellation token for external cancellation.
    pub cancel: CancellationToken,
}

/// What a successful fetch produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedArtifact {
    /// Final artifact path inside the requested scope.
    pub path: PathBuf,
    /// Size on disk in bytes, as the engine measured it.
    pub bytes: u64,
}

/// Errors crossing the engine port.
///
/// Serializable so adapter failures can be surfaced through APIs without
/// losing their classification.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum EngineError {
    /// The source exists but cannot be fetched (private, region-blocked,
    /// removed). Retrying will not help.
    #[error("Source unavailable: {message}")]
    Unavailable {
        /// Detailed error message.
        message: String,
    },

    /// The engine process or its network path failed. Worth retrying.
    #[error("Engine failed: {message}")]
    ProcessFailed {
        /// Detailed error message.
        message: String,
    },

    /// The engine produced output the adapter could not parse.
    #[error("Engine protocol error: {message}")]
    Protocol {
        /// Detailed error message.
        message: String,
    },

    /// The engine binary could not be located or spawned.
    #[error("Engine binary unavailable: {message}")]
    MissingBinary {
        /// Detailed error message.
        message: String,
    },

    /// The engine call exceeded its time budget.
    #[error("Engine call timed out after {secs}s")]
    Timeout {
        /// The exhausted budget in seconds.
        secs: u64,
    },

    /// The call was cancelled through the token.
    #[error("Engine call cancelled")]
    Cancelled,
}

impl EngineError {
    /// Create an unavailable-source error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create a process failure.
    pub fn process_failed(message: impl Into<String>) -> Self {
        Self::ProcessFailed {
            message: message.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a missing-binary error.
    pub fn missing_binary(message: impl Into<String>) -> Self {
        Self::MissingBinary {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    #[must_use]
    pub const fn timeout(secs: u64) -> Self {
        Self::Timeout { secs }
    }

    /// Check if retrying the same call could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ProcessFailed { .. } | Self::Timeout { .. })
    }

    /// Check if this is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Convenience result type for engine calls.
pub type EngineResult<T> = Result<T, EngineError>;

/// Port for the external extraction/download engine.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Resolve a URL into source metadata and raw formats.
    ///
    /// Suspends on network I/O; implementations must return promptly once
    /// the token is cancelled.
    async fn probe(&self, url: &SourceUrl) -> EngineResult<SourceMeta>;

    /// Download the selected variant into the request's scope directory.
    ///
    /// Progress is reported through `request.progress` as bytes move.
    /// A cancelled token must abort the underlying transfer and return
    /// [`EngineError::Cancelled`].
    async fn fetch(&self, request: FetchRequest<'_>) -> EngineResult<FetchedArtifact>;
}
