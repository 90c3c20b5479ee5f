//! Source URL validation.
//!
//! Inbound text is validated into a [`SourceUrl`] before any engine call;
//! everything past this point can assume a well-formed, supported link.

use crate::errors::{SessionError, SessionResult};
use std::fmt;
use url::Url;

/// Recognized source hosts. Subdomains of each (e.g. `music.youtube.com`)
/// are accepted too.
const SOURCE_DOMAINS: [&str; 4] = [
    "youtube.com",
    "youtu.be",
    "m.youtube.com",
    "youtube-nocookie.com",
];

/// A validated video source URL.
///
/// Construction succeeds only for `http`/`https` links on a recognized
/// host that carry a video reference in one of the known shapes
/// (`watch?v=`, short `youtu.be/<id>`, `/embed/<id>`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceUrl(Url);

impl SourceUrl {
    /// Validate raw user input into a source URL.
    pub fn parse(input: &str) -> SessionResult<Self> {
        let trimmed = input.trim();
        let url = Url::parse(trimmed).map_err(|_| SessionError::invalid_url(trimmed))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SessionError::invalid_url(trimmed));
        }
        if !references_video(&url) {
            return Err(SessionError::invalid_url(trimmed));
        }
        Ok(Self(url))
    }

    /// The URL as a string, exactly as it will be handed to the engine.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// The video id embedded in the URL, when one of the known shapes
    /// carries it explicitly.
    #[must_use]
    pub fn video_id(&self) -> Option<String> {
        let host = self.0.host_str()?.to_ascii_lowercase();
        if host == "youtu.be" || host == "www.youtu.be" {
            return self
                .0
                .path_segments()
                .and_then(|mut segments| segments.next())
                .filter(|id| !id.is_empty())
                .map(ToString::to_string);
        }
        if let Some((_, value)) = self.0.query_pairs().find(|(key, _)| key == "v") {
            if !value.is_empty() {
                return Some(value.into_owned());
            }
        }
        self.0
            .path()
            .split_once("/embed/")
            .and_then(|(_, rest)| rest.split('/').next())
            .filter(|id| !id.is_empty())
            .map(ToString::to_string)
    }
}

impl fmt::Display for SourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn references_video(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let lowered = host.to_ascii_lowercase();
    let domain = lowered.strip_prefix("www.").unwrap_or(&lowered);

    let recognized = SOURCE_DOMAINS
        .iter()
        .any(|d| domain == *d || domain.ends_with(&format!(".{d}")));
    if !recognized {
        return false;
    }

    // Short links carry the id as the path.
    if domain == "youtu.be" {
        return url.path().len() > 1;
    }

    // Standard watch links carry it in the query.
    if let Some((_, value)) = url.query_pairs().find(|(key, _)| key == "v") {
        return !value.is_empty();
    }

    // Embed links carry it in the path.
    url.path().contains("/embed/")
}
