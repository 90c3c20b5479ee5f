//! Quality catalog.
//!
//! Turns the engine's raw format list into the ordered variant menu a
//! user can pick from. The filter targets what chat clients can play
//! inline: H.264 video in mp4/webm/mkv, plus a known audio codec.
//! Composition pairs a video-only stream with the best audio stream into
//! one `video+audio` selector for the engine to merge.

use indexmap::IndexMap;
use vidferry_core::{
    MediaFormat, OrchestratorConfig, SessionError, SessionResult, SourceMeta, VariantDescriptor,
};

const VIDEO_CODEC_MARKERS: [&str; 3] = ["avc", "h264", "h.264"];
const VIDEO_CONTAINERS: [&str; 3] = ["mp4", "webm", "mkv"];
const AUDIO_CODEC_MARKERS: [&str; 5] = ["aac", "mp4a", "opus", "vorbis", "mp3"];
const PREFERRED_AUDIO_MARKERS: [&str; 2] = ["aac", "mp4a"];

/// Engine-native selector offered when no listed format passes the
/// compatibility filter.
pub const FALLBACK_SELECTOR: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";

/// Normalizes raw engine formats into selectable variants.
#[derive(Debug, Clone, Copy)]
pub struct QualityCatalog {
    max_artifact_bytes: u64,
    max_variants: usize,
}

impl QualityCatalog {
    /// Create a catalog with the given limits.
    #[must_use]
    pub const fn new(max_artifact_bytes: u64, max_variants: usize) -> Self {
        Self {
            max_artifact_bytes,
            max_variants,
        }
    }

    /// Create a catalog from the orchestrator config.
    #[must_use]
    pub const fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.max_artifact_bytes, config.max_variants)
    }

    /// Build the ordered variant menu for a resolved source.
    ///
    /// Video variants come first, highest resolution first, deduplicated
    /// by (height, codec family) keeping the highest bitrate. An
    /// audio-only option follows when the source has a usable audio
    /// stream. Variants whose size estimate exceeds the artifact ceiling
    /// are dropped; when that drops every video candidate the whole
    /// source is rejected as too large.
    pub fn build(&self, meta: &SourceMeta) -> SessionResult<Vec<VariantDescriptor>> {
        if meta.formats.is_empty() {
            return Err(SessionError::unresolvable("source reported no formats"));
        }

        let compatible: Vec<&MediaFormat> =
            meta.formats.iter().filter(|f| is_compatible(f)).collect();

        let best_audio = pick_best_audio(&compatible);
        let candidates = dedupe_video_candidates(&compatible, best_audio);

        if candidates.is_empty() {
            return Ok(self.menu_without_video(best_audio));
        }

        let (fitting, oversized): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| c.fits_within(self.max_artifact_bytes));

        if fitting.is_empty() {
            let smallest = oversized
                .iter()
                .filter_map(Candidate::estimated_bytes)
                .min();
            return Err(SessionError::too_large(self.max_artifact_bytes, smallest));
        }

        let mut menu: Vec<VariantDescriptor> =
            fitting.iter().map(Candidate::to_descriptor).collect();
        if let Some(audio) = best_audio {
            let descriptor = audio_descriptor(audio);
            if descriptor
                .estimated_bytes
                .is_none_or(|b| b <= self.max_artifact_bytes)
            {
                menu.push(descriptor);
            }
        }
        menu.truncate(self.max_variants);
        Ok(menu)
    }

    /// Menu for sources with no compatible video stream.
    fn menu_without_video(&self, best_audio: Option<&MediaFormat>) -> Vec<VariantDescriptor> {
        if let Some(audio) = best_audio {
            let descriptor = audio_descriptor(audio);
            if descriptor
                .estimated_bytes
                .is_none_or(|b| b <= self.max_artifact_bytes)
            {
                return vec![descriptor];
            }
        }
        vec![fallback_descriptor()]
    }
}

/// One video option before it becomes a descriptor: the video stream plus
/// the audio stream that will be merged in when the video has none.
#[derive(Clone, Copy)]
struct Candidate<'a> {
    video: &'a MediaFormat,
    paired_audio: Option<&'a MediaFormat>,
    height: u32,
}

impl Candidate<'_> {
    fn bitrate(&self) -> f64 {
        self.video.bitrate_kbps.unwrap_or(0.0)
    }

    fn selector(&self) -> String {
        self.paired_audio.map_or_else(
            || self.video.id.clone(),
            |audio| format!("{}+{}", self.video.id, audio.id),
        )
    }

    /// Sum of the known stream sizes, `None` when nothing is known.
    fn estimated_bytes(&self) -> Option<u64> {
        let video = self.video.filesize;
        let audio = self.paired_audio.and_then(|a| a.filesize);
        match (video, audio) {
            (None, None) => None,
            (v, a) => Some(v.unwrap_or(0) + a.unwrap_or(0)),
        }
    }

    /// Unknown sizes pass; the ceiling is enforced again while bytes move.
    fn fits_within(&self, limit: u64) -> bool {
        self.estimated_bytes().is_none_or(|b| b <= limit)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn to_descriptor(&self) -> VariantDescriptor {
        let fps = self.video.fps.map(|f| f.round() as u32);
        let label = match fps {
            Some(f) if f > 30 => format!("{}p {f}fps", self.height),
            _ => format!("{}p", self.height),
        };
        let container = if self.paired_audio.is_some() {
            // Merged output is always remuxed to mp4.
            "mp4".to_string()
        } else {
            self.video.container.clone()
        };
        let audio_codec = self
            .video
            .audio_codec
            .clone()
            .or_else(|| self.paired_audio.and_then(|a| a.audio_codec.clone()));

        let mut descriptor =
            VariantDescriptor::video(self.selector(), label, container, self.height)
                .with_codecs(self.video.video_codec.clone(), audio_codec);
        if let Some(f) = fps {
            descriptor = descriptor.with_fps(f);
        }
        if let Some(bytes) = self.estimated_bytes() {
            descriptor = descriptor.with_estimated_bytes(bytes);
        }
        descriptor
    }
}

fn is_compatible(format: &MediaFormat) -> bool {
    if format.video_codec.is_none() && format.audio_codec.is_none() {
        return false;
    }
    if let Some(vcodec) = &format.video_codec {
        let vcodec = vcodec.to_lowercase();
        if !VIDEO_CODEC_MARKERS.iter().any(|m| vcodec.contains(m)) {
            return false;
        }
        let container = format.container.to_lowercase();
        if !VIDEO_CONTAINERS.contains(&container.as_str()) {
            return false;
        }
    }
    if let Some(acodec) = &format.audio_codec {
        let acodec = acodec.to_lowercase();
        if !AUDIO_CODEC_MARKERS.iter().any(|m| acodec.contains(m)) {
            return false;
        }
    }
    true
}

/// Best standalone audio stream: prefer the AAC family, break ties by
/// size so the merged artifact sounds as good as the menu promised.
fn pick_best_audio<'a>(compatible: &[&'a MediaFormat]) -> Option<&'a MediaFormat> {
    let audio_only: Vec<&MediaFormat> = compatible
        .iter()
        .filter(|f| !f.has_video() && f.has_audio())
        .copied()
        .collect();

    let preferred: Vec<&MediaFormat> = audio_only
        .iter()
        .filter(|f| {
            f.audio_codec.as_ref().is_some_and(|codec| {
                let codec = codec.to_lowercase();
                PREFERRED_AUDIO_MARKERS.iter().any(|m| codec.contains(m))
            })
        })
        .copied()
        .collect();

    let pool = if preferred.is_empty() {
        audio_only
    } else {
        preferred
    };
    pool.into_iter().max_by_key(|f| f.filesize.unwrap_or(0))
}

fn dedupe_video_candidates<'a>(
    compatible: &[&'a MediaFormat],
    best_audio: Option<&'a MediaFormat>,
) -> Vec<Candidate<'a>> {
    let mut best: IndexMap<(u32, String), Candidate<'a>> = IndexMap::new();

    for format in compatible {
        if !format.has_video() {
            continue;
        }
        let Some(height) = format.height else {
            continue;
        };
        let candidate = Candidate {
            video: format,
            paired_audio: if format.has_audio() { None } else { best_audio },
            height,
        };
        let key = (height, codec_family(format));
        match best.get(&key) {
            Some(existing) if existing.bitrate() >= candidate.bitrate() => {}
            _ => {
                best.insert(key, candidate);
            }
        }
    }

    let mut candidates: Vec<Candidate<'a>> = best.into_values().collect();
    candidates.sort_by(|a, b| {
        b.height
            .cmp(&a.height)
            .then_with(|| b.bitrate().total_cmp(&a.bitrate()))
    });
    candidates
}

fn codec_family(format: &MediaFormat) -> String {
    format
        .video_codec
        .as_deref()
        .unwrap_or_default()
        .split('.')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

fn audio_descriptor(audio: &MediaFormat) -> VariantDescriptor {
    let mut descriptor =
        VariantDescriptor::audio_only(audio.id.clone(), "Audio", audio.container.clone())
            .with_codecs(None::<String>, audio.audio_codec.clone());
    if let Some(bytes) = audio.filesize {
        descriptor = descriptor.with_estimated_bytes(bytes);
    }
    descriptor
}

fn fallback_descriptor() -> VariantDescriptor {
    VariantDescriptor {
        id: FALLBACK_SELECTOR.to_string(),
        label: "Best available".to_string(),
        container: "mp4".to_string(),
        video_codec: None,
        audio_codec: None,
        height: None,
        fps: None,
        estimated_bytes: None,
        has_video: true,
        has_audio: true,
    }
}
