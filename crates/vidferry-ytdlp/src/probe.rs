//! Parsing of `yt-dlp -J` output.
//!
//! The dump is one large JSON object. Only the fields the pipeline consumes
//! are deserialized; everything else is ignored. yt-dlp reports "no stream"
//! as the literal string `"none"` in `vcodec`/`acodec`, which normalizes to
//! `None` here so the catalog never has to know that convention.

use serde::Deserialize;

use vidferry_core::ports::{EngineError, EngineResult, MediaFormat, SourceMeta};

/// Raw envelope for the `-J` dump.
#[derive(Deserialize)]
struct RawInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    channel: Option<String>,
    uploader: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

/// One entry of the raw format list.
#[derive(Deserialize)]
struct RawFormat {
    format_id: Option<String>,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    fps: Option<f64>,
    tbr: Option<f64>,
    filesize: Option<u64>,
    filesize_approx: Option<f64>,
}

/// Parse the full `-J` dump into source metadata.
pub fn parse_probe_output(json: &str) -> EngineResult<SourceMeta> {
    let raw: RawInfo = serde_json::from_str(json)
        .map_err(|e| EngineError::protocol(format!("unreadable -J output: {e}")))?;

    let formats = raw.formats.into_iter().filter_map(convert_format).collect();

    Ok(SourceMeta {
        source_id: raw.id.unwrap_or_default(),
        title: raw.title.unwrap_or_default(),
        duration_secs: raw.duration.map(round_positive),
        // Non-YouTube extractors report the account as `uploader` only.
        channel: raw.channel.or(raw.uploader),
        thumbnail_url: raw.thumbnail,
        formats,
    })
}

/// Convert one raw format entry; entries without a format id are dropped.
fn convert_format(raw: RawFormat) -> Option<MediaFormat> {
    let id = raw.format_id?;
    let filesize = raw
        .filesize
        .or_else(|| raw.filesize_approx.map(round_positive));

    Some(MediaFormat {
        id,
        container: raw.ext.unwrap_or_default(),
        video_codec: normalize_codec(raw.vcodec),
        audio_codec: normalize_codec(raw.acodec),
        height: raw.height,
        fps: raw.fps,
        bitrate_kbps: raw.tbr,
        filesize,
    })
}

/// Map yt-dlp's `"none"` marker (and empty strings) to a real absence.
fn normalize_codec(raw: Option<String>) -> Option<String> {
    raw.filter(|codec| !codec.is_empty() && codec != "none")
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_positive(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}
