//! Session error types.
//!
//! These errors are designed to be serializable and not depend on external
//! error types like `std::io::Error`. Adapter errors are captured as
//! strings at the port boundary.

use crate::session::FailureKind;
use crate::variant::format_bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for session orchestration.
///
/// Serializable so rejections and terminal failures can cross API
/// boundaries (HTTP, bot transport) without losing structure.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionError {
    /// The submitted text is not a recognized video source URL.
    #[error("Unsupported URL: {url}")]
    InvalidUrl {
        /// The rejected input.
        url: String,
    },

    /// The engine could not resolve the URL into variants.
    #[error("Could not resolve source: {message}")]
    Unresolvable {
        /// Detailed error message.
        message: String,
    },

    /// Every candidate variant exceeds the configured artifact ceiling.
    #[error("Source too large: smallest variant exceeds {limit_bytes} bytes")]
    TooLarge {
        /// Configured ceiling in bytes.
        limit_bytes: u64,
        /// Size of the smallest candidate, if the engine reported one.
        #[serde(skip_serializing_if = "Option::is_none")]
        smallest_bytes: Option<u64>,
    },

    /// The byte ceiling was crossed while the transfer was running.
    #[error("Transfer exceeded {limit_bytes} bytes (observed {observed_bytes})")]
    SizeExceeded {
        /// Configured ceiling in bytes.
        limit_bytes: u64,
        /// Byte count observed when the transfer was aborted.
        observed_bytes: u64,
    },

    /// The extraction engine failed while moving bytes.
    #[error("Download failed: {message}")]
    DownloadFailed {
        /// Detailed error message.
        message: String,
        /// Attempts made before giving up, when retries were involved.
        #[serde(skip_serializing_if = "Option::is_none")]
        attempts: Option<u32>,
    },

    /// The artifact on disk was missing, empty or truncated.
    #[error("Artifact failed verification: {message}")]
    Integrity {
        /// Detailed error message.
        message: String,
    },

    /// The transfer channel failed to deliver the artifact.
    #[error("Upload failed: {message}")]
    UploadFailed {
        /// Detailed error message.
        message: String,
        /// Attempts made before giving up, when retries were involved.
        #[serde(skip_serializing_if = "Option::is_none")]
        attempts: Option<u32>,
    },

    /// No progress was observed for longer than the stall timeout.
    #[error("Transfer stalled: no progress for {stalled_secs}s")]
    Stalled {
        /// Length of the silent window in seconds.
        stalled_secs: u64,
    },

    /// The user already owns a live session.
    #[error("An active request already exists for this user")]
    AlreadyActive,

    /// The global concurrency cap is reached.
    #[error("Too many active requests: maximum {max_sessions} allowed")]
    CapacityExceeded {
        /// Configured cap.
        max_sessions: usize,
    },

    /// The selection token matched none of the offered variants.
    #[error("Unknown variant: {token}")]
    UnknownVariant {
        /// The rejected selection token.
        token: String,
    },

    /// A selection arrived when the session no longer accepts one.
    #[error("Selection window is closed")]
    SelectionClosed,

    /// The user cancelled the request. A terminal outcome, not a fault.
    #[error("Cancelled by user")]
    Cancelled,

    /// A bug or unexpected condition inside the orchestration core.
    #[error("Internal error: {message}")]
    Internal {
        /// Detailed error message.
        message: String,
    },
}

impl SessionError {
    /// Create an invalid URL rejection.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Create an unresolvable source error.
    pub fn unresolvable(message: impl Into<String>) -> Self {
        Self::Unresolvable {
            message: message.into(),
        }
    }

    /// Create a too-large rejection for a source whose variants all exceed the ceiling.
    #[must_use]
    pub const fn too_large(limit_bytes: u64, smallest_bytes: Option<u64>) -> Self {
        Self::TooLarge {
            limit_bytes,
            smallest_bytes,
        }
    }

    /// Create a mid-transfer size violation.
    #[must_use]
    pub const fn size_exceeded(limit_bytes: u64, observed_bytes: u64) -> Self {
        Self::SizeExceeded {
            limit_bytes,
            observed_bytes,
        }
    }

    /// Create a download failure without attempt accounting.
    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
            attempts: None,
        }
    }

    /// Create a download failure recorded after retries were exhausted.
    pub fn download_failed_after(message: impl Into<String>, attempts: u32) -> Self {
        Self::DownloadFailed {
            message: message.into(),
            attempts: Some(attempts),
        }
    }

    /// Create an integrity failure.
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    /// Create an upload failure without attempt accounting.
    pub fn upload_failed(message: impl Into<String>) -> Self {
        Self::UploadFailed {
            message: message.into(),
            attempts: None,
        }
    }

    /// Create an upload failure recorded after retries were exhausted.
    pub fn upload_failed_after(message: impl Into<String>, attempts: u32) -> Self {
        Self::UploadFailed {
            message: message.into(),
            attempts: Some(attempts),
        }
    }

    /// Create a stall failure.
    #[must_use]
    pub const fn stalled(stalled_secs: u64) -> Self {
        Self::Stalled { stalled_secs }
    }

    /// Create a capacity rejection.
    #[must_use]
    pub const fn capacity_exceeded(max_sessions: usize) -> Self {
        Self::CapacityExceeded { max_sessions }
    }

    /// Create an unknown-variant rejection.
    pub fn unknown_variant(token: impl Into<String>) -> Self {
        Self::UnknownVariant {
            token: token.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if resubmitting the same request later could succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DownloadFailed { .. }
                | Self::UploadFailed { .. }
                | Self::Stalled { .. }
                | Self::CapacityExceeded { .. }
        )
    }

    /// The terminal failure classification, when this error fails a session.
    ///
    /// Synchronous rejections (`InvalidUrl`, `AlreadyActive`,
    /// `CapacityExceeded`, selection errors) and `Cancelled` return `None`
    /// because they never enter `Failed`.
    #[must_use]
    pub const fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Unresolvable { .. } => Some(FailureKind::Unresolvable),
            Self::TooLarge { .. } => Some(FailureKind::TooLarge),
            Self::SizeExceeded { .. } => Some(FailureKind::SizeExceeded),
            Self::DownloadFailed { .. } => Some(FailureKind::Download),
            Self::Integrity { .. } => Some(FailureKind::Integrity),
            Self::UploadFailed { .. } => Some(FailureKind::Upload),
            Self::Stalled { .. } => Some(FailureKind::Stalled),
            Self::Internal { .. } => Some(FailureKind::Internal),
            Self::InvalidUrl { .. }
            | Self::AlreadyActive
            | Self::CapacityExceeded { .. }
            | Self::UnknownVariant { .. }
            | Self::SelectionClosed
            | Self::Cancelled => None,
        }
    }

    /// Convert to a user-friendly message for the chat transport.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidUrl { .. } => {
                "That does not look like a supported video link. Send a YouTube URL.".to_string()
            }
            Self::Unresolvable { .. } => {
                "Could not read this video. It may be private, region-blocked or removed."
                    .to_string()
            }
            Self::TooLarge { limit_bytes, .. } => {
                format!(
                    "This video is too large: every available quality exceeds the {} limit.",
                    format_bytes(*limit_bytes)
                )
            }
            Self::SizeExceeded { limit_bytes, .. } => {
                format!(
                    "Download aborted: the file grew past the {} limit.",
                    format_bytes(*limit_bytes)
                )
            }
            Self::DownloadFailed { .. } => {
                "The download failed. Try again in a few minutes.".to_string()
            }
            Self::Integrity { .. } => {
                "The downloaded file was incomplete. Try again in a few minutes.".to_string()
            }
            Self::UploadFailed { .. } => {
                "Sending the file failed. Try again in a few minutes.".to_string()
            }
            Self::Stalled { stalled_secs } => {
                format!("The transfer stalled for {stalled_secs}s and was aborted.")
            }
            Self::AlreadyActive => {
                "You already have a request in progress. Cancel it or wait for it to finish."
                    .to_string()
            }
            Self::CapacityExceeded { .. } => {
                "The service is busy right now. Try again in a few minutes.".to_string()
            }
            Self::UnknownVariant { .. } => {
                "That quality option is not available. Pick one of the offered options.".to_string()
            }
            Self::SelectionClosed => {
                "This request is no longer waiting for a quality choice.".to_string()
            }
            Self::Cancelled => "Request cancelled.".to_string(),
            Self::Internal { .. } => "Something went wrong on our side.".to_string(),
        }
    }
}

/// Convenience result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization_round_trip() {
        let err = SessionError::download_failed_after("connection reset", 3);
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("connection reset"));
        assert!(json.contains('3'));

        let parsed: SessionError = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, err);
    }

    #[test]
    fn test_failure_kind_mapping() {
        assert_eq!(
            SessionError::unresolvable("gone").failure_kind(),
            Some(FailureKind::Unresolvable)
        );
        assert_eq!(
            SessionError::size_exceeded(100, 150).failure_kind(),
            Some(FailureKind::SizeExceeded)
        );
        assert_eq!(
            SessionError::stalled(120).failure_kind(),
            Some(FailureKind::Stalled)
        );
        assert_eq!(SessionError::AlreadyActive.failure_kind(), None);
        assert_eq!(SessionError::Cancelled.failure_kind(), None);
        assert_eq!(
            SessionError::unknown_variant("v99").failure_kind(),
            None
        );
    }

    #[test]
    fn test_is_recoverable() {
        assert!(SessionError::download_failed("timeout").is_recoverable());
        assert!(SessionError::capacity_exceeded(4).is_recoverable());
        assert!(!SessionError::Cancelled.is_recoverable());
        assert!(!SessionError::too_large(850, None).is_recoverable());
    }

    #[test]
    fn test_user_messages_mention_the_limit() {
        let err = SessionError::too_large(850 * 1024 * 1024, Some(900 * 1024 * 1024));
        assert!(err.user_message().contains("850.0 MB"));
    }

    #[test]
    fn test_cancelled_is_not_a_failure() {
        assert!(SessionError::Cancelled.is_cancelled());
        assert!(SessionError::Cancelled.failure_kind().is_none());
    }
}
