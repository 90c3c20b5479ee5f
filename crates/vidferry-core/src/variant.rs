//! Selectable quality variants.
//!
//! A [`VariantDescriptor`] is the normalized, immutable form of one
//! download option offered to the user. Normalization from raw engine
//! format lists happens in the pipeline crate; afterwards descriptors are
//! read-only.

use crate::ids::RequestId;
use serde::{Deserialize, Serialize};

/// One selectable quality/format option for a resolved source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDescriptor {
    /// Engine-native selector token (e.g. `137+140` for a composed
    /// video+audio pair). Opaque to everything but the engine.
    pub id: String,
    /// Human label shown in the selection prompt (e.g. `1080p 60fps`).
    pub label: String,
    /// Container name (e.g. `mp4`).
    pub container: String,
    /// Video codec tag, absent for audio-only variants.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    /// Audio codec tag, absent for video-only streams.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    /// Vertical resolution in pixels, absent for audio-only variants.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Rounded frames per second, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    /// Estimated artifact size in bytes. Advisory only; the ceiling is
    /// enforced again while bytes actually move.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_bytes: Option<u64>,
    /// Whether the variant carries a video stream.
    pub has_video: bool,
    /// Whether the variant carries an audio stream.
    pub has_audio: bool,
}

impl VariantDescriptor {
    /// Create a video variant (with or without muxed audio).
    pub fn video(
        id: impl Into<String>,
        label: impl Into<String>,
        container: impl Into<String>,
        height: u32,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            container: container.into(),
            video_codec: None,
            audio_codec: None,
            height: Some(height),
            fps: None,
            estimated_bytes: None,
            has_video: true,
            has_audio: false,
        }
    }

    /// Create an audio-only variant.
    pub fn audio_only(
        id: impl Into<String>,
        label: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            container: container.into(),
            video_codec: None,
            audio_codec: None,
            height: None,
            fps: None,
            estimated_bytes: None,
            has_video: false,
            has_audio: true,
        }
    }

    /// Attach codec tags.
    #[must_use]
    pub fn with_codecs(
        mut self,
        video_codec: Option<impl Into<String>>,
        audio_codec: Option<impl Into<String>>,
    ) -> Self {
        self.video_codec = video_codec.map(Into::into);
        self.audio_codec = audio_codec.map(Into::into);
        self.has_audio = self.has_audio || self.audio_codec.is_some();
        self
    }

    /// Attach a frame rate.
    #[must_use]
    pub const fn with_fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Attach a size estimate.
    #[must_use]
    pub const fn with_estimated_bytes(mut self, bytes: u64) -> Self {
        self.estimated_bytes = Some(bytes);
        self
    }

    /// Human-readable size for the selection prompt.
    #[must_use]
    pub fn size_label(&self) -> String {
        self.estimated_bytes
            .map_or_else(|| "size unknown".to_string(), |b| format!("~{}", format_bytes(b)))
    }
}

/// What the user gets back after a URL resolves: source metadata plus the
/// ordered variant menu.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSource {
    /// The session this menu belongs to.
    pub request_id: RequestId,
    /// Source title as reported by the engine.
    pub title: String,
    /// Duration in whole seconds, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    /// Channel or uploader name, when the engine reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Thumbnail URL, when the engine reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Selectable variants, best first.
    pub variants: Vec<VariantDescriptor>,
}

/// Format a byte count with a 1024 ladder (`B`, `KB`, `MB`, `GB`, `TB`).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    for unit in &UNITS[..UNITS.len() - 1] {
        if value < 1024.0 {
            return format!("{value:.1} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1} TB")
}
