//! yt-dlp binary discovery.

use std::path::PathBuf;

use vidferry_core::ports::{EngineError, EngineResult};

/// Environment variable that overrides binary discovery with an explicit
/// path. Useful for containers that ship the binary outside `PATH`.
pub const ENV_BINARY: &str = "VIDFERRY_YTDLP_PATH";

const BINARY_NAME: &str = "yt-dlp";

/// Find the yt-dlp binary: the env override wins, then `PATH`.
pub fn find_binary() -> EngineResult<PathBuf> {
    if let Ok(value) = std::env::var(ENV_BINARY) {
        if !value.trim().is_empty() {
            return binary_from_override(&value);
        }
    }

    which::which(BINARY_NAME)
        .map_err(|e| EngineError::missing_binary(format!("{BINARY_NAME} not found on PATH: {e}")))
}

/// Validate an explicit override path.
fn binary_from_override(value: &str) -> EngineResult<PathBuf> {
    let path = PathBuf::from(value);
    if path.is_file() {
        Ok(path)
    } else {
        Err(EngineError::missing_binary(format!(
            "{ENV_BINARY} points at {}, which is not a file",
            path.display()
        )))
    }
}
