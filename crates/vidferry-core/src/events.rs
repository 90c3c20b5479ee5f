//! Session events - discriminated union for all user-visible state changes.

use crate::ids::{RequestId, UserId};
use crate::progress::TransferPhase;
use crate::session::{FailureKind, SessionState};
use crate::variant::VariantDescriptor;
use serde::{Deserialize, Serialize};

/// Single discriminated union for everything a session reports outward.
///
/// Emitted through the `SessionEventEmitter` port; the chat adapter turns
/// these into message edits, the HTTP adapter can forward them as SSE.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A submitted URL was accepted and a session now exists.
    SessionStarted {
        /// Session identity.
        request_id: RequestId,
        /// Owning chat account.
        user_id: UserId,
    },

    /// The source resolved; the variant menu is ready for selection.
    VariantsReady {
        /// Session identity.
        request_id: RequestId,
        /// Source title for the selection prompt.
        title: String,
        /// Channel or uploader name, when known.
        #[serde(skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
        /// Selectable variants, best first.
        variants: Vec<VariantDescriptor>,
    },

    /// The session moved to a new lifecycle state.
    StateChanged {
        /// Session identity.
        request_id: RequestId,
        /// The state just entered.
        state: SessionState,
    },

    /// Throttled progress update for one phase.
    Progress {
        /// Session identity.
        request_id: RequestId,
        /// Phase the byte counts belong to.
        phase: TransferPhase,
        /// Bytes moved so far.
        bytes_done: u64,
        /// Expected total bytes, 0 when unknown.
        bytes_total: u64,
        /// Smoothed transfer speed in bytes per second.
        speed_bps: f64,
        /// Estimated seconds remaining.
        eta_seconds: f64,
        /// Progress percentage (0.0 - 100.0).
        percentage: f64,
    },

    /// The artifact was delivered and the session is done.
    SessionCompleted {
        /// Session identity.
        request_id: RequestId,
    },

    /// The session ended in failure.
    SessionFailed {
        /// Session identity.
        request_id: RequestId,
        /// Failure classification.
        kind: FailureKind,
        /// User-friendly description of what went wrong.
        message: String,
    },

    /// The session was cancelled by the user.
    SessionCancelled {
        /// Session identity.
        request_id: RequestId,
    },
}

impl SessionEvent {
    /// Create a session started event.
    #[must_use]
    pub const fn started(request_id: RequestId, user_id: UserId) -> Self {
        Self::SessionStarted {
            request_id,
            user_id,
        }
    }

    /// Create a variants ready event.
    pub fn variants_ready(
        request_id: RequestId,
        title: impl Into<String>,
        channel: Option<String>,
        variants: Vec<VariantDescriptor>,
    ) -> Self {
        Self::VariantsReady {
            request_id,
            title: title.into(),
            channel,
            variants,
        }
    }

    /// Create a state changed event.
    #[must_use]
    pub const fn state_changed(request_id: RequestId, state: SessionState) -> Self {
        Self::StateChanged { request_id, state }
    }

    /// Create a progress event, deriving percentage and ETA.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(
        request_id: RequestId,
        phase: TransferPhase,
        bytes_done: u64,
        bytes_total: u64,
        speed_bps: f64,
    ) -> Self {
        let percentage = if bytes_total > 0 {
            (bytes_done as f64 / bytes_total as f64) * 100.0
        } else {
            0.0
        };

        let eta_seconds = if speed_bps > 0.0 && bytes_total > bytes_done {
            (bytes_total - bytes_done) as f64 / speed_bps
        } else {
            0.0
        };

        Self::Progress {
            request_id,
            phase,
            bytes_done,
            bytes_total,
            speed_bps,
            eta_seconds,
            percentage,
        }
    }

    /// Create a session completed event.
    #[must_use]
    pub const fn completed(request_id: RequestId) -> Self {
        Self::SessionCompleted { request_id }
    }

    /// Create a session failed event.
    pub fn failed(request_id: RequestId, kind: FailureKind, message: impl Into<String>) -> Self {
        Self::SessionFailed {
            request_id,
            kind,
            message: message.into(),
        }
    }

    /// Create a session cancelled event.
    #[must_use]
    pub const fn cancelled(request_id: RequestId) -> Self {
        Self::SessionCancelled { request_id }
    }

    /// Get the session identity from any event type.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        match self {
            Self::SessionStarted { request_id, .. }
            | Self::VariantsReady { request_id, .. }
            | Self::StateChanged { request_id, .. }
            | Self::Progress { request_id, .. }
            | Self::SessionCompleted { request_id }
            | Self::SessionFailed { request_id, .. }
            | Self::SessionCancelled { request_id } => *request_id,
        }
    }

    /// Get the event name for wire protocols.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session:started",
            Self::VariantsReady { .. } => "session:variants_ready",
            Self::StateChanged { .. } => "session:state_changed",
            Self::Progress { .. } => "session:progress",
            Self::SessionCompleted { .. } => "session:completed",
            Self::SessionFailed { .. } => "session:failed",
            Self::SessionCancelled { .. } => "session:cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_calculations() {
        let id = RequestId::new();
        let event = SessionEvent::progress(id, TransferPhase::Download, 500, 1000, 100.0);
        match event {
            SessionEvent::Progress {
                percentage,
                eta_seconds,
                ..
            } => {
                assert!((percentage - 50.0).abs() < 0.01);
                assert!((eta_seconds - 5.0).abs() < 0.01);
            }
            _ => panic!("Expected Progress"),
        }
    }

    #[test]
    fn test_progress_with_unknown_total() {
        let id = RequestId::new();
        let event = SessionEvent::progress(id, TransferPhase::Upload, 500, 0, 100.0);
        match event {
            SessionEvent::Progress {
                percentage,
                eta_seconds,
                ..
            } => {
                assert!(percentage.abs() < f64::EPSILON);
                assert!(eta_seconds.abs() < f64::EPSILON);
            }
            _ => panic!("Expected Progress"),
        }
    }

    #[test]
    fn test_request_id_extraction() {
        let id = RequestId::new();
        assert_eq!(SessionEvent::completed(id).request_id(), id);
        assert_eq!(SessionEvent::cancelled(id).request_id(), id);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let id = RequestId::new();
        let json = serde_json::to_string(&SessionEvent::failed(
            id,
            FailureKind::Stalled,
            "no progress",
        ))
        .unwrap();
        assert!(json.contains("\"type\":\"session_failed\""));
        assert!(json.contains("\"kind\":\"stalled\""));
    }
}
