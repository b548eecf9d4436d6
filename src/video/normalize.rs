use std::path::PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::{AudioStream, DataWarning, FileRecord, SkipReason, SkippedFile, VideoStream};

const HDR_TRANSFERS: [&str; 2] = ["smpte2084", "arib-std-b67"];
const WIDE_GAMUT_PRIMARIES: [&str; 1] = ["bt2020"];

/// Untyped probe payload for one file plus its filesystem facts.
///
/// `format`, `video_stream` and `audio_streams` mirror ffprobe's JSON objects and
/// may be partial. Nothing downstream of [`normalize`] reads them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawProbe {
    pub path: PathBuf,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub format: Value,
    #[serde(default)]
    pub video_stream: Option<Value>,
    #[serde(default)]
    pub audio_streams: Vec<Value>,
}

impl RawProbe {
    /// Builds the bag from a full `ffprobe -show_format -show_streams` document.
    /// Only the first video stream is kept; audio streams keep probe order.
    pub fn from_ffprobe_output(
        path: impl Into<PathBuf>,
        size_bytes: u64,
        modified_at: Option<DateTime<Utc>>,
        output: &Value,
    ) -> Self {
        let streams = output
            .get("streams")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let of_type = |stream: &&Value, kind: &str| {
            stream.get("codec_type").and_then(Value::as_str) == Some(kind)
        };

        Self {
            path: path.into(),
            size_bytes,
            modified_at,
            format: output.get("format").cloned().unwrap_or(Value::Null),
            video_stream: streams.iter().find(|s| of_type(s, "video")).cloned(),
            audio_streams: streams.iter().filter(|s| of_type(s, "audio")).cloned().collect(),
        }
    }
}

/// Typed view of one file, output of the normalization stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbedFile {
    pub file: FileRecord,
    pub video: Option<VideoStream>,
    pub audio: Vec<AudioStream>,
    pub warnings: Vec<DataWarning>,
}

pub fn normalize(raw: &RawProbe) -> std::result::Result<ProbedFile, SkippedFile> {
    let duration_seconds = resolve_duration(raw).map_err(|reason| SkippedFile {
        path: raw.path.clone(),
        reason,
    })?;

    let mut warnings = Vec::new();

    let container_bitrate_bps = field(&raw.format, "bit_rate").and_then(positive_int);
    if container_bitrate_bps.is_none() {
        warnings.push(DataWarning::MissingContainerBitrate);
    }

    let file = FileRecord {
        path: raw.path.clone(),
        size_bytes: raw.size_bytes,
        duration_seconds,
        container_format: field(&raw.format, "format_name")
            .and_then(text)
            .unwrap_or_else(|| "unknown".to_string()),
        container_bitrate_bps,
        modified_at: raw.modified_at,
    };

    let video = match &raw.video_stream {
        Some(stream) => normalize_video(stream, &mut warnings),
        None => {
            warnings.push(DataWarning::NoVideoStream);
            None
        }
    };

    let audio = raw
        .audio_streams
        .iter()
        .enumerate()
        .filter_map(|(position, stream)| normalize_audio(stream, position, &mut warnings))
        .collect();

    for warning in &warnings {
        log::debug!("{}: {}", raw.path.display(), warning);
    }

    Ok(ProbedFile { file, video, audio, warnings })
}

/// First usable duration among the container and the video stream.
/// When neither is usable the container's defect is reported.
fn resolve_duration(raw: &RawProbe) -> std::result::Result<f64, SkipReason> {
    let candidates = [
        field(&raw.format, "duration"),
        raw.video_stream.as_ref().and_then(|s| field(s, "duration")),
    ];

    let mut first_error = None;
    for value in candidates.into_iter().flatten() {
        match parse_duration(value) {
            Ok(seconds) => return Ok(seconds),
            Err(reason) => {
                first_error.get_or_insert(reason);
            }
        }
    }
    Err(first_error.unwrap_or(SkipReason::MissingDuration))
}

fn parse_duration(value: &Value) -> std::result::Result<f64, SkipReason> {
    let seconds = number(value).ok_or_else(|| {
        SkipReason::UnparseableDuration(text(value).unwrap_or_else(|| value.to_string()))
    })?;
    if seconds > 0.0 {
        Ok(seconds)
    } else {
        Err(SkipReason::NonPositiveDuration(seconds))
    }
}

fn normalize_video(stream: &Value, warnings: &mut Vec<DataWarning>) -> Option<VideoStream> {
    let Some(codec) = field(stream, "codec_name").and_then(text) else {
        warnings.push(DataWarning::IncompleteVideoStream("codec_name"));
        return None;
    };
    let Some(width) = field(stream, "width").and_then(dimension) else {
        warnings.push(DataWarning::IncompleteVideoStream("width"));
        return None;
    };
    let Some(height) = field(stream, "height").and_then(dimension) else {
        warnings.push(DataWarning::IncompleteVideoStream("height"));
        return None;
    };

    let bitrate_bps = field(stream, "bit_rate").and_then(positive_int);
    if bitrate_bps.is_none() {
        warnings.push(DataWarning::MissingVideoBitrate);
    }

    let avg_frame_rate = field(stream, "avg_frame_rate").and_then(frame_rate);
    let nominal_frame_rate = field(stream, "r_frame_rate").and_then(frame_rate);
    let fps = avg_frame_rate.or(nominal_frame_rate);
    if fps.is_none() {
        let raw_rate = field(stream, "avg_frame_rate")
            .or_else(|| field(stream, "r_frame_rate"))
            .and_then(text)
            .unwrap_or_default();
        warnings.push(DataWarning::UnknownFrameRate(raw_rate));
    }
    let is_variable_frame_rate = match (avg_frame_rate, nominal_frame_rate) {
        (Some(avg), Some(nominal)) => (avg - nominal).abs() > 1e-6,
        _ => false,
    };

    let color_transfer = field(stream, "color_transfer").and_then(text);
    let color_primaries = field(stream, "color_primaries").and_then(text);
    let is_hdr = is_hdr(color_transfer.as_deref(), color_primaries.as_deref());

    Some(VideoStream {
        codec,
        width,
        height,
        bitrate_bps,
        fps,
        is_variable_frame_rate,
        is_hdr,
        pix_fmt: field(stream, "pix_fmt").and_then(text),
        profile: field(stream, "profile").and_then(text),
        level: field(stream, "level").and_then(text),
        color_space: field(stream, "color_space").and_then(text),
        color_transfer,
        color_primaries,
    })
}

fn normalize_audio(
    stream: &Value,
    position: usize,
    warnings: &mut Vec<DataWarning>,
) -> Option<AudioStream> {
    let index = field(stream, "index")
        .and_then(number)
        .filter(|i| *i >= 0.0)
        .map(|i| i as u32)
        .unwrap_or(position as u32);

    let required = |key: &'static str| {
        field(stream, key).and_then(dimension).ok_or(DataWarning::IncompleteAudioStream {
            index,
            field: key,
        })
    };
    let Some(codec) = field(stream, "codec_name").and_then(text) else {
        warnings.push(DataWarning::IncompleteAudioStream { index, field: "codec_name" });
        return None;
    };
    let (channels, sample_rate) = match (required("channels"), required("sample_rate")) {
        (Ok(channels), Ok(sample_rate)) => (channels, sample_rate),
        (Err(warning), _) | (_, Err(warning)) => {
            warnings.push(warning);
            return None;
        }
    };

    let bitrate_bps = field(stream, "bit_rate").and_then(positive_int);
    if bitrate_bps.is_none() {
        warnings.push(DataWarning::MissingAudioBitrate { index });
    }

    Some(AudioStream {
        index,
        codec,
        channels,
        sample_rate,
        bitrate_bps,
        channel_layout: field(stream, "channel_layout").and_then(text),
    })
}

/// HDR when the transfer is PQ/HLG or the primaries are BT.2020.
pub fn is_hdr(color_transfer: Option<&str>, color_primaries: Option<&str>) -> bool {
    let matches_any = |value: Option<&str>, known: &[&str]| {
        value.is_some_and(|v| known.iter().any(|k| v.eq_ignore_ascii_case(k)))
    };
    matches_any(color_transfer, &HDR_TRANSFERS)
        || matches_any(color_primaries, &WIDE_GAMUT_PRIMARIES)
}

/// Parses `"num/den"` (or a plain number) into frames per second.
/// Zero denominators and non-positive rates are unknown.
pub fn parse_frame_rate(expression: &str) -> Option<f64> {
    let expression = expression.trim();
    let rate = match expression.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => expression.parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

// Present, non-null and not ffprobe's "N/A" placeholder.
fn field<'a>(object: &'a Value, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|value| match value {
        Value::Null => false,
        Value::String(s) => {
            let s = s.trim();
            !s.is_empty() && !s.eq_ignore_ascii_case("n/a")
        }
        _ => true,
    })
}

fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

fn positive_int(value: &Value) -> Option<u64> {
    number(value).filter(|n| *n >= 1.0).map(|n| n as u64)
}

fn dimension(value: &Value) -> Option<u32> {
    positive_int(value).and_then(|n| u32::try_from(n).ok())
}

fn frame_rate(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => parse_frame_rate(s),
        other => number(other).filter(|n| *n > 0.0),
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn raw(format: Value, video: Option<Value>, audio: Vec<Value>) -> RawProbe {
        RawProbe {
            path: PathBuf::from("/media/clip.mp4"),
            size_bytes: 8_053_063,
            modified_at: None,
            format,
            video_stream: video,
            audio_streams: audio,
        }
    }

    fn sdr_video() -> Value {
        json!({
            "codec_name": "h264",
            "width": 1920,
            "height": 1080,
            "bit_rate": "142733",
            "avg_frame_rate": "60/1",
            "r_frame_rate": "60/1",
            "pix_fmt": "yuv420p",
            "profile": "High",
            "level": 42,
            "color_space": "bt709",
            "color_transfer": "bt709",
            "color_primaries": "bt709"
        })
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("60/1"), Some(60.0));
        assert_eq!(parse_frame_rate("30000/1001").map(|f| (f * 1000.0).round()), Some(29970.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("24/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_hdr_detection() {
        assert!(is_hdr(Some("smpte2084"), None));
        assert!(is_hdr(Some("ARIB-STD-B67"), Some("bt709")));
        assert!(is_hdr(Some("bt709"), Some("bt2020")));
        assert!(!is_hdr(Some("bt709"), Some("bt709")));
        assert!(!is_hdr(None, None));
    }

    #[test]
    fn test_normalize_full_probe() {
        let probe = raw(
            json!({"duration": "230.533333", "format_name": "mov,mp4,m4a,3gp,3g2,mj2"}),
            Some(sdr_video()),
            vec![json!({"index": 1, "codec_name": "aac", "bit_rate": "128001",
                        "channels": 2, "sample_rate": "44100", "channel_layout": "stereo"})],
        );

        let probed = normalize(&probe).unwrap();
        assert_eq!(probed.file.duration_seconds, 230.533333);
        assert_eq!(probed.file.container_format, "mov,mp4,m4a,3gp,3g2,mj2");
        assert_eq!(probed.file.container_bitrate_bps, None);

        let video = probed.video.unwrap();
        assert_eq!(video.codec, "h264");
        assert_eq!((video.width, video.height), (1920, 1080));
        assert_eq!(video.bitrate_bps, Some(142_733));
        assert_eq!(video.fps, Some(60.0));
        assert_eq!(video.level.as_deref(), Some("42"));
        assert!(!video.is_hdr);
        assert!(!video.is_variable_frame_rate);

        assert_eq!(probed.audio.len(), 1);
        assert_eq!(probed.audio[0].sample_rate, 44_100);
        assert_eq!(probed.audio[0].bitrate_bps, Some(128_001));
        assert_eq!(probed.warnings, vec![DataWarning::MissingContainerBitrate]);
    }

    #[test]
    fn test_duration_failures_skip_file() {
        let missing = normalize(&raw(json!({"format_name": "mp4"}), None, vec![])).unwrap_err();
        assert_eq!(missing.reason, SkipReason::MissingDuration);

        let placeholder = normalize(&raw(json!({"duration": "N/A"}), None, vec![])).unwrap_err();
        assert_eq!(placeholder.reason, SkipReason::MissingDuration);

        let garbage = normalize(&raw(json!({"duration": "soon"}), None, vec![])).unwrap_err();
        assert_eq!(garbage.reason, SkipReason::UnparseableDuration("soon".into()));

        let zero = normalize(&raw(json!({"duration": 0}), None, vec![])).unwrap_err();
        assert_eq!(zero.reason, SkipReason::NonPositiveDuration(0.0));
        assert_eq!(zero.path, PathBuf::from("/media/clip.mp4"));
    }

    #[test]
    fn test_duration_falls_back_to_video_stream() {
        let mut video = sdr_video();
        video["duration"] = json!("12.5");
        let probed = normalize(&raw(json!({}), Some(video), vec![])).unwrap();
        assert_eq!(probed.file.duration_seconds, 12.5);
        assert_eq!(probed.file.container_format, "unknown");
    }

    #[test]
    fn test_unusable_container_duration_falls_through_to_stream() {
        let mut video = sdr_video();
        video["duration"] = json!("42.0");
        let probed =
            normalize(&raw(json!({"duration": "soon"}), Some(video.clone()), vec![])).unwrap();
        assert_eq!(probed.file.duration_seconds, 42.0);

        let probed = normalize(&raw(json!({"duration": "0.000"}), Some(video), vec![])).unwrap();
        assert_eq!(probed.file.duration_seconds, 42.0);

        let mut negative = sdr_video();
        negative["duration"] = json!(-1);
        let skipped =
            normalize(&raw(json!({"duration": "soon"}), Some(negative), vec![])).unwrap_err();
        assert_eq!(skipped.reason, SkipReason::UnparseableDuration("soon".into()));
    }

    #[test]
    fn test_zero_denominator_frame_rate_is_unknown() {
        let mut video = sdr_video();
        video["avg_frame_rate"] = json!("0/0");
        video["r_frame_rate"] = json!("0/0");
        let probed = normalize(&raw(json!({"duration": 10}), Some(video), vec![])).unwrap();
        let video = probed.video.unwrap();
        assert_eq!(video.fps, None);
        assert!(!video.is_variable_frame_rate);
        assert!(probed.warnings.contains(&DataWarning::UnknownFrameRate("0/0".into())));
    }

    #[test]
    fn test_variable_frame_rate_and_hdr() {
        let mut video = sdr_video();
        video["avg_frame_rate"] = json!("29876/1000");
        video["r_frame_rate"] = json!("30/1");
        video["color_transfer"] = json!("smpte2084");
        video["color_primaries"] = json!("bt2020");
        let probed = normalize(&raw(json!({"duration": 60}), Some(video), vec![])).unwrap();
        let video = probed.video.unwrap();
        assert!(video.is_variable_frame_rate);
        assert!(video.is_hdr);
        assert_eq!(video.fps, Some(29.876));
    }

    #[test]
    fn test_incomplete_streams_are_dropped() {
        let mut video = sdr_video();
        video["width"] = json!(0);
        let probed = normalize(&raw(
            json!({"duration": 60, "bit_rate": "1000000"}),
            Some(video),
            vec![
                json!({"index": 1, "codec_name": "aac", "channels": 2}),
                json!({"index": 2, "codec_name": "opus", "channels": 2, "sample_rate": 48000}),
            ],
        ))
        .unwrap();

        assert!(probed.video.is_none());
        assert_eq!(probed.audio.len(), 1);
        assert_eq!(probed.audio[0].index, 2);
        assert_eq!(
            probed.warnings,
            vec![
                DataWarning::IncompleteVideoStream("width"),
                DataWarning::IncompleteAudioStream { index: 1, field: "sample_rate" },
                DataWarning::MissingAudioBitrate { index: 2 },
            ]
        );
    }

    #[test]
    fn test_from_ffprobe_output_selects_first_video() {
        let output = json!({
            "format": {"duration": "5.0", "bit_rate": "900000"},
            "streams": [
                {"index": 0, "codec_type": "audio", "codec_name": "aac"},
                {"index": 1, "codec_type": "video", "codec_name": "hevc"},
                {"index": 2, "codec_type": "video", "codec_name": "mjpeg"},
                {"index": 3, "codec_type": "audio", "codec_name": "ac3"},
                {"index": 4, "codec_type": "subtitle", "codec_name": "mov_text"}
            ]
        });

        let probe = RawProbe::from_ffprobe_output("/media/a.mkv", 10, None, &output);
        assert_eq!(probe.video_stream.unwrap()["codec_name"], "hevc");
        let audio: Vec<_> = probe.audio_streams.iter().map(|s| s["codec_name"].clone()).collect();
        assert_eq!(audio, vec![json!("aac"), json!("ac3")]);
        assert_eq!(probe.format["bit_rate"], "900000");
    }
}
