//! Transfer channel port definition.
//!
//! The transfer channel pushes a finished artifact back to the user
//! (chat upload, object store, anything that accepts a file). The core
//! hands over a path plus display metadata and waits for delivery.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::ids::{RequestId, UserId};
use crate::ports::media_engine::ProgressFn;

/// Request payload for one delivery.
pub struct DeliveryRequest<'a> {
    /// Session identity, for correlation on the far side.
    pub request_id: RequestId,
    /// Receiving chat account.
    pub user_id: UserId,
    /// Artifact to deliver. Owned by the caller's temp scope; the channel
    /// must not move or delete it.
    pub artifact: &'a Path,
    /// Title to display with the file.
    pub title: &'a str,
    /// Channel or uploader name for the caption, when known.
    pub channel: Option<&'a str>,
    /// Duration in whole seconds, when known.
    pub duration_secs: Option<u64>,
    /// Vertical resolution of the delivered video, when known.
    pub height: Option<u32>,
    /// Thumbnail URL, when known.
    pub thumbnail_url: Option<&'a str>,
    /// Progress callback, invoked as bytes are pushed.
    pub progress: Option<&'a ProgressFn>,
    /// Cancellation token for external cancellation.
    pub cancel: CancellationToken,
}

/// Errors crossing the transfer channel port.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransferError {
    /// The channel failed transiently (network, backend hiccup). Worth
    /// retrying with the same artifact.
    #[error("Transfer failed: {message}")]
    Failed {
        /// Detailed error message.
        message: String,
    },

    /// The channel refused the artifact (over its own size cap, bad
    /// format). Retrying the same artifact cannot succeed.
    #[error("Artifact rejected: {message}")]
    Rejected {
        /// Detailed error message.
        message: String,
    },

    /// The delivery was cancelled through the token.
    #[error("Transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// Create a transient failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Create a rejection.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Check if retrying the same delivery could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Check if this is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Convenience result type for deliveries.
pub type TransferResult<T> = Result<T, TransferError>;

/// Port for delivering finished artifacts to the user.
#[async_trait]
pub trait TransferChannel: Send + Sync {
    /// Deliver the artifact, blocking until the far side acknowledges it.
    ///
    /// A cancelled token must abort the push and return
    /// [`TransferError::Cancelled`].
    async fn deliver(&self, request: DeliveryRequest<'_>) -> TransferResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TransferError::failed("connection reset").is_retryable());
        assert!(!TransferError::rejected("file too big for transport").is_retryable());
        assert!(!TransferError::Cancelled.is_retryable());
    }

    #[test]
    fn test_transfer_error_serialization() {
        let err = TransferError::rejected("unsupported container");
        let json = serde_json::to_string(&err).unwrap();
        let parsed: TransferError = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, err);
    }
}
