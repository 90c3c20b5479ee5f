//! The fetch progress line protocol.
//!
//! yt-dlp is invoked with `--newline` and a `--progress-template` that
//! prints one JSON object per progress update:
//!
//! ```json
//! {"downloaded": 1048576, "total": 4194304, "total_estimate": null}
//! ```
//!
//! `total` carries the exact size when yt-dlp knows it, `total_estimate` an
//! approximation otherwise; both are `null` early in a download. Lines that
//! are not protocol JSON (merger and postprocessor chatter) are skipped by
//! the caller.

use serde::Deserialize;

use vidferry_core::ports::{EngineError, EngineResult};

/// Template handed to `--progress-template`. The `download:` prefix scopes
/// it to download progress; the rest is printed verbatim with `%(...)j`
/// expanding to JSON values.
pub const PROGRESS_TEMPLATE: &str = concat!(
    "download:",
    r#"{"downloaded":%(progress.downloaded_bytes)j,"#,
    r#""total":%(progress.total_bytes)j,"#,
    r#""total_estimate":%(progress.total_bytes_estimate)j}"#,
);

/// One decoded progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    /// Bytes written so far.
    pub downloaded: u64,
    /// Expected total bytes, 0 while unknown.
    pub total: u64,
}

/// Raw JSON envelope for one progress line.
#[derive(Deserialize)]
struct RawProgress {
    downloaded: Option<f64>,
    total: Option<f64>,
    total_estimate: Option<f64>,
}

/// Parse a single stdout line into a progress update.
///
/// Missing counters decode as 0 rather than failing; yt-dlp legitimately
/// reports `null` before sizes are known.
pub fn parse_progress_line(line: &str) -> EngineResult<FetchProgress> {
    let raw: RawProgress = serde_json::from_str(line.trim())
        .map_err(|e| EngineError::protocol(format!("unreadable progress line: {e}")))?;

    Ok(FetchProgress {
        downloaded: raw.downloaded.map_or(0, round_positive),
        total: raw.total.or(raw.total_estimate).map_or(0, round_positive),
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_positive(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}
