//! Phase-tagged progress values.
//!
//! A session reports byte counts twice: once while the engine pulls the
//! artifact to disk and once while the transfer channel pushes it out.
//! Every sample carries its phase so throttling and display never mix the
//! two sequences.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which byte-moving phase a progress sample belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferPhase {
    /// Engine pulling bytes from the source to the temp scope.
    #[default]
    Download,
    /// Transfer channel pushing the artifact to the user.
    Upload,
}

impl TransferPhase {
    /// Stable string form used in log fields and wire payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Upload => "upload",
        }
    }
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One observed progress sample.
///
/// `bytes_total == 0` means the engine never reported a size; percentage
/// is undefined in that case and throttling falls back to time alone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Phase this sample belongs to.
    pub phase: TransferPhase,
    /// Bytes moved so far within the phase.
    pub bytes_done: u64,
    /// Expected total bytes for the phase, 0 when unknown.
    pub bytes_total: u64,
}

impl ProgressSnapshot {
    /// Create a snapshot.
    #[must_use]
    pub const fn new(phase: TransferPhase, bytes_done: u64, bytes_total: u64) -> Self {
        Self {
            phase,
            bytes_done,
            bytes_total,
        }
    }

    /// Percentage complete, or `None` when the total is unknown.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> Option<f64> {
        if self.bytes_total == 0 {
            return None;
        }
        Some((self.bytes_done as f64 / self.bytes_total as f64) * 100.0)
    }

    /// True once every expected byte has moved.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.bytes_total > 0 && self.bytes_done >= self.bytes_total
    }
}
