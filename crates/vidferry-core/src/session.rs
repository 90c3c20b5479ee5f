//! Session lifecycle states and read-only snapshots.

use crate::ids::{RequestId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a terminal failure.
///
/// Stored inside [`SessionState::Failed`] and reported to the user through
/// the event emitter; the human-readable wording lives on `SessionError`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The source URL could not be resolved into variants.
    Unresolvable,
    /// Every resolvable variant exceeds the configured artifact ceiling.
    TooLarge,
    /// The byte ceiling was crossed while the transfer was running.
    SizeExceeded,
    /// The extraction engine failed after exhausting retries.
    Download,
    /// The artifact on disk was missing, empty or truncated.
    Integrity,
    /// The transfer channel failed after exhausting retries.
    Upload,
    /// No progress was observed for longer than the stall timeout.
    Stalled,
    /// A bug or unexpected condition inside the orchestration core.
    Internal,
}

impl FailureKind {
    /// Stable string form used in log fields and wire payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unresolvable => "unresolvable",
            Self::TooLarge => "too_large",
            Self::SizeExceeded => "size_exceeded",
            Self::Download => "download",
            Self::Integrity => "integrity",
            Self::Upload => "upload",
            Self::Stalled => "stalled",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a request session.
///
/// The forward chain is
/// `Created → AwaitingSelection → Downloading → Verifying → Transferring → Completed`;
/// `Cancelled` and `Failed` are side exits reachable from every non-terminal
/// state. Terminal states never transition again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// Session exists but the source has not been resolved yet.
    Created,
    /// Variants are known; waiting for the user to pick one.
    AwaitingSelection,
    /// The extraction engine is moving bytes to disk.
    Downloading,
    /// Bytes are on disk; checking size and integrity.
    Verifying,
    /// The artifact is being handed through the transfer channel.
    Transferring,
    /// Delivered successfully.
    Completed,
    /// Ended by an explicit user cancellation.
    Cancelled,
    /// Ended by an error, classified by `kind`.
    Failed {
        /// What went wrong.
        kind: FailureKind,
    },
}

impl SessionState {
    /// True once the session can never transition again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed { .. })
    }

    /// True while the session still accepts a variant selection.
    #[must_use]
    pub const fn accepts_selection(self) -> bool {
        matches!(self, Self::AwaitingSelection)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Terminal states accept nothing; non-terminal states accept the next
    /// step of the forward chain plus the two side exits.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Self::Created, Self::AwaitingSelection)
                | (Self::AwaitingSelection, Self::Downloading)
                | (Self::Downloading, Self::Verifying)
                | (Self::Verifying, Self::Transferring)
                | (Self::Transferring, Self::Completed)
                | (_, Self::Cancelled | Self::Failed { .. })
        )
    }

    /// Stable string form used in log fields and wire payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AwaitingSelection => "awaiting_selection",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::Transferring => "transferring",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { kind } => write!(f, "failed({kind})"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// Read-only view of a session for status queries and API responses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Request identity (also names the temp scope).
    pub request_id: RequestId,
    /// Owning chat account.
    pub user_id: UserId,
    /// Current lifecycle state.
    pub state: SessionState,
    /// The URL the user submitted.
    pub source_url: String,
    /// Id of the chosen variant once selection happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_variant: Option<String>,
    /// Bytes moved so far in the current phase.
    pub bytes_transferred: u64,
    /// Expected total bytes, when the engine reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_expected: Option<u64>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_chain_is_legal() {
        let chain = [
            SessionState::Created,
            SessionState::AwaitingSelection,
            SessionState::Downloading,
            SessionState::Verifying,
            SessionState::Transferring,
            SessionState::Completed,
        ];
        for pair in chain.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_side_exits_from_every_non_terminal_state() {
        let non_terminal = [
            SessionState::Created,
            SessionState::AwaitingSelection,
            SessionState::Downloading,
            SessionState::Verifying,
            SessionState::Transferring,
        ];
        for state in non_terminal {
            assert!(state.can_advance_to(SessionState::Cancelled));
            assert!(state.can_advance_to(SessionState::Failed {
                kind: FailureKind::Download
            }));
        }
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        let terminal = [
            SessionState::Completed,
            SessionState::Cancelled,
            SessionState::Failed {
                kind: FailureKind::Stalled,
            },
        ];
        for state in terminal {
            assert!(state.is_terminal());
            assert!(!state.can_advance_to(SessionState::Cancelled));
            assert!(!state.can_advance_to(SessionState::Downloading));
        }
    }

    #[test]
    fn test_skipping_forward_states_is_illegal() {
        assert!(!SessionState::Created.can_advance_to(SessionState::Downloading));
        assert!(!SessionState::Downloading.can_advance_to(SessionState::Completed));
        assert!(!SessionState::Verifying.can_advance_to(SessionState::Downloading));
    }

    #[test]
    fn test_failed_display_includes_kind() {
        let state = SessionState::Failed {
            kind: FailureKind::SizeExceeded,
        };
        assert_eq!(state.to_string(), "failed(size_exceeded)");
        assert_eq!(state.as_str(), "failed");
    }

    #[test]
    fn test_state_serializes_with_tag() {
        let json = serde_json::to_string(&SessionState::Failed {
            kind: FailureKind::Upload,
        })
        .unwrap();
        assert!(json.contains("\"state\":\"failed\""));
        assert!(json.contains("\"kind\":\"upload\""));
    }
}
