use std::fmt;
use serde::{Deserialize, Serialize};
use crate::analyzers::flags::{Flag, FlagSet};
use crate::config::AnalysisConfig;
use crate::video::normalize::ProbedFile;
use crate::{AudioStream, FileRecord, VideoStream};

const BYTES_PER_MB: f64 = 1_048_576.0;
const SECONDS_PER_MINUTE: f64 = 60.0;
const BITS_PER_BYTE: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DurationCategory {
    VeryShort,
    Short,
    Medium,
    Long,
}

impl DurationCategory {
    pub fn from_seconds(seconds: f64, config: &AnalysisConfig) -> Self {
        if seconds < config.very_short_seconds {
            DurationCategory::VeryShort
        } else if seconds < config.medium_from_seconds {
            DurationCategory::Short
        } else if seconds < config.long_from_seconds {
            DurationCategory::Medium
        } else {
            DurationCategory::Long
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DurationCategory::VeryShort => "VERY_SHORT",
            DurationCategory::Short => "SHORT",
            DurationCategory::Medium => "MEDIUM",
            DurationCategory::Long => "LONG",
        }
    }
}

impl fmt::Display for DurationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where the total bitrate came from. Only the container value is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BitrateSource {
    Container,
    Streams,
    SizeEstimate,
}

impl BitrateSource {
    pub fn is_estimated(&self) -> bool {
        !matches!(self, BitrateSource::Container)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BitrateSource::Container => "CONTAINER",
            BitrateSource::Streams => "STREAMS",
            BitrateSource::SizeEstimate => "SIZE_ESTIMATE",
        }
    }
}

impl fmt::Display for BitrateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-file scalars, independent of the rest of the batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub bitrate_total_bps: u64,
    pub bitrate_source: BitrateSource,
    pub bitrate_is_estimated: bool,
    pub kbps_total: u64,
    pub kbps_video: Option<u64>,
    pub bits_per_pixel_frame: Option<f64>,
    pub mb_per_minute: f64,
    pub audio_share_percent: Option<f64>,
    pub duration_category: DurationCategory,
}

/// Output of the metrics stage: the probed file, its metrics and per-file flags.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasuredFile {
    pub probed: ProbedFile,
    pub metrics: DerivedMetrics,
    pub flags: FlagSet,
}

/// Total bitrate by ordered fallback: container, then video + audio streams,
/// then size over duration. The last step always succeeds for a positive duration.
pub fn resolve_total_bitrate(
    file: &FileRecord,
    video: Option<&VideoStream>,
    audio: &[AudioStream],
) -> (u64, BitrateSource) {
    if let Some(container) = file.container_bitrate_bps.filter(|b| *b > 0) {
        return (container, BitrateSource::Container);
    }

    if let Some(video_bps) = video.and_then(|v| v.bitrate_bps) {
        // An overflowing stream sum counts as unresolved.
        let total = audio
            .iter()
            .filter_map(|a| a.bitrate_bps)
            .try_fold(video_bps, u64::checked_add);
        match total {
            Some(total) if total > 0 => return (total, BitrateSource::Streams),
            Some(_) => {}
            None => log::warn!(
                "Stream bitrates of '{}' overflow, estimating from size",
                file.path.display()
            ),
        }
    }

    let estimated = file.size_bytes as f64 * BITS_PER_BYTE / file.duration_seconds;
    (estimated as u64, BitrateSource::SizeEstimate)
}

/// Video bitrate over pixels per second. Total bitrate is never substituted.
pub fn bits_per_pixel_frame(video: Option<&VideoStream>) -> Option<f64> {
    let video = video?;
    let bitrate = video.bitrate_bps? as f64;
    let fps = video.fps?;
    let pixels_per_second = video.width as f64 * video.height as f64 * fps;
    (pixels_per_second > 0.0).then(|| bitrate / pixels_per_second)
}

pub fn mb_per_minute(size_bytes: u64, duration_seconds: f64) -> f64 {
    (size_bytes as f64 / BYTES_PER_MB) / (duration_seconds / SECONDS_PER_MINUTE)
}

pub fn audio_share_percent(audio: &[AudioStream], bitrate_total_bps: u64) -> Option<f64> {
    if bitrate_total_bps == 0 {
        return None;
    }
    let known: Vec<f64> = audio.iter().filter_map(|a| a.bitrate_bps).map(|b| b as f64).collect();
    if known.is_empty() {
        return None;
    }
    Some(100.0 * known.iter().sum::<f64>() / bitrate_total_bps as f64)
}

fn to_kbps(bps: u64) -> u64 {
    (bps as f64 / 1000.0).round() as u64
}

pub struct MetricsAnalyzer<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> MetricsAnalyzer<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn measure(&self, probed: ProbedFile) -> MeasuredFile {
        let metrics = self.derive(&probed);
        let flags = self.file_flags(&probed, &metrics);
        log::debug!(
            "Measured '{}' - {} kbps ({}), {:.2} MB/min, flags [{}]",
            probed.file.path.display(),
            metrics.kbps_total,
            metrics.bitrate_source,
            metrics.mb_per_minute,
            flags
        );
        MeasuredFile { probed, metrics, flags }
    }

    pub fn derive(&self, probed: &ProbedFile) -> DerivedMetrics {
        let file = &probed.file;
        let video = probed.video.as_ref();
        let (bitrate_total_bps, bitrate_source) = resolve_total_bitrate(file, video, &probed.audio);

        DerivedMetrics {
            bitrate_total_bps,
            bitrate_source,
            bitrate_is_estimated: bitrate_source.is_estimated(),
            kbps_total: to_kbps(bitrate_total_bps),
            kbps_video: video.and_then(|v| v.bitrate_bps).map(to_kbps),
            bits_per_pixel_frame: bits_per_pixel_frame(video),
            mb_per_minute: mb_per_minute(file.size_bytes, file.duration_seconds),
            audio_share_percent: audio_share_percent(&probed.audio, bitrate_total_bps),
            duration_category: DurationCategory::from_seconds(file.duration_seconds, self.config),
        }
    }

    fn file_flags(&self, probed: &ProbedFile, metrics: &DerivedMetrics) -> FlagSet {
        let duration = probed.file.duration_seconds;
        let audio_share = metrics.audio_share_percent.unwrap_or(0.0);
        let video = probed.video.as_ref();

        let mut flags = FlagSet::new();
        flags.insert_if(duration < self.config.very_short_seconds, Flag::MuyCorto);
        flags.insert_if(duration < self.config.short_clip_seconds, Flag::DuracionCorta);
        flags.insert_if(audio_share > self.config.audio_dominant_percent, Flag::AudioDominante);
        if let Some(review) = self.config.audio_review_percent {
            flags.insert_if(audio_share > review, Flag::AudioRevisar);
        }
        flags.insert_if(video.is_some_and(|v| v.is_variable_frame_rate), Flag::Vfr);
        flags.insert_if(video.is_some_and(|v| v.is_hdr), Flag::Hdr);
        flags.insert_if(metrics.bitrate_is_estimated, Flag::BitrateContainerFaltante);
        flags.insert_if(
            metrics.bitrate_source == BitrateSource::SizeEstimate,
            Flag::EstimacionBitrate,
        );
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn file(
        size_bytes: u64,
        duration_seconds: f64,
        container_bitrate_bps: Option<u64>,
    ) -> FileRecord {
        FileRecord {
            path: PathBuf::from("/media/video.mp4"),
            size_bytes,
            duration_seconds,
            container_format: "mp4".into(),
            container_bitrate_bps,
            modified_at: None,
        }
    }

    fn video(width: u32, height: u32, fps: Option<f64>, bitrate_bps: Option<u64>) -> VideoStream {
        VideoStream {
            codec: "h264".into(),
            width,
            height,
            bitrate_bps,
            fps,
            is_variable_frame_rate: false,
            is_hdr: false,
            pix_fmt: Some("yuv420p".into()),
            profile: None,
            level: None,
            color_space: None,
            color_transfer: Some("bt709".into()),
            color_primaries: Some("bt709".into()),
        }
    }

    fn audio(index: u32, bitrate_bps: Option<u64>) -> AudioStream {
        AudioStream {
            index,
            codec: "aac".into(),
            channels: 2,
            sample_rate: 48_000,
            bitrate_bps,
            channel_layout: Some("stereo".into()),
        }
    }

    fn probed(file: FileRecord, video: Option<VideoStream>, audio: Vec<AudioStream>) -> ProbedFile {
        ProbedFile { file, video, audio, warnings: Vec::new() }
    }

    #[test]
    fn test_container_bitrate_wins() {
        let f = file(1_000_000, 10.0, Some(5_000_000));
        let v = video(1920, 1080, Some(30.0), Some(4_000_000));
        let (bps, source) = resolve_total_bitrate(&f, Some(&v), &[audio(1, Some(128_000))]);
        assert_eq!((bps, source), (5_000_000, BitrateSource::Container));
        assert!(!source.is_estimated());
    }

    #[test]
    fn test_sum_of_streams_fallback() {
        let f = file(8_053_063, 230.53, None);
        let v = video(640, 360, Some(30.0), Some(142_733));
        let streams = [audio(1, Some(128_001)), audio(2, None)];
        let (bps, source) = resolve_total_bitrate(&f, Some(&v), &streams);
        assert_eq!((bps, source), (270_734, BitrateSource::Streams));
    }

    #[test]
    fn test_audio_only_bitrates_fall_through_to_size() {
        let f = file(1_000_000, 8.0, None);
        let v = video(640, 360, Some(30.0), None);
        let (bps, source) = resolve_total_bitrate(&f, Some(&v), &[audio(1, Some(128_000))]);
        assert_eq!((bps, source), (1_000_000, BitrateSource::SizeEstimate));

        let (bps, source) = resolve_total_bitrate(&f, None, &[]);
        assert_eq!((bps, source), (1_000_000, BitrateSource::SizeEstimate));
    }

    #[test]
    fn test_overflowing_stream_sum_falls_through_to_size() {
        let f = file(1_000_000, 8.0, None);
        let v = video(1920, 1080, Some(30.0), Some(18_000_000_000_000_000_000));
        let huge_audio = [audio(1, Some(1_000_000_000_000_000_000))];
        let (bps, source) = resolve_total_bitrate(&f, Some(&v), &huge_audio);
        assert_eq!((bps, source), (1_000_000, BitrateSource::SizeEstimate));

        let share = audio_share_percent(&huge_audio, u64::MAX).unwrap();
        assert!(share.is_finite() && share > 0.0);
    }

    #[test]
    fn test_bits_per_pixel_frame() {
        let v = video(1920, 1080, Some(60.0), Some(37_200_199));
        let bppf = bits_per_pixel_frame(Some(&v)).unwrap();
        assert!((bppf - 0.299).abs() < 0.001);

        assert_eq!(bits_per_pixel_frame(Some(&video(1920, 1080, None, Some(1)))), None);
        assert_eq!(bits_per_pixel_frame(Some(&video(1920, 1080, Some(30.0), None))), None);
        assert_eq!(bits_per_pixel_frame(None), None);
    }

    #[test]
    fn test_mb_per_minute() {
        assert!((mb_per_minute(10 * 1_048_576, 120.0) - 5.0).abs() < 1e-12);
        assert_eq!(mb_per_minute(0, 30.0), 0.0);
    }

    #[test]
    fn test_audio_share() {
        let share =
            audio_share_percent(&[audio(1, Some(100_000)), audio(2, Some(50_000))], 1_000_000);
        assert_eq!(share, Some(15.0));
        assert_eq!(audio_share_percent(&[audio(1, None)], 1_000_000), None);
        assert_eq!(audio_share_percent(&[], 1_000_000), None);
        assert_eq!(audio_share_percent(&[audio(1, Some(1))], 0), None);
    }

    #[test]
    fn test_duration_bands() {
        let config = AnalysisConfig::default();
        assert_eq!(DurationCategory::from_seconds(9.99, &config), DurationCategory::VeryShort);
        assert_eq!(DurationCategory::from_seconds(10.0, &config), DurationCategory::Short);
        assert_eq!(DurationCategory::from_seconds(119.9, &config), DurationCategory::Short);
        assert_eq!(DurationCategory::from_seconds(120.0, &config), DurationCategory::Medium);
        assert_eq!(DurationCategory::from_seconds(300.0, &config), DurationCategory::Long);
    }

    #[test]
    fn test_sum_of_streams_metrics() {
        let config = AnalysisConfig::default();
        let analyzer = MetricsAnalyzer::new(&config);
        let measured = analyzer.measure(probed(
            file(8_053_063, 230.53, None),
            Some(video(640, 360, Some(30.0), Some(142_733))),
            vec![audio(1, Some(128_001))],
        ));

        assert_eq!(measured.metrics.bitrate_total_bps, 270_734);
        assert!(measured.metrics.bitrate_is_estimated);
        assert_eq!(measured.metrics.kbps_total, 271);
        assert_eq!(measured.metrics.kbps_video, Some(143));
        assert_eq!(measured.metrics.duration_category, DurationCategory::Medium);
        let expected: FlagSet =
            [Flag::BitrateContainerFaltante, Flag::AudioDominante].into_iter().collect();
        assert_eq!(measured.flags, expected);
    }

    #[test]
    fn test_short_hdr_vfr_clip_flags() {
        let config = AnalysisConfig::default();
        let mut v = video(3840, 2160, Some(59.94), Some(20_000_000));
        v.is_hdr = true;
        v.is_variable_frame_rate = true;
        let measured = MetricsAnalyzer::new(&config).measure(probed(
            file(3_000_000, 5.0, None),
            Some(v),
            vec![],
        ));

        assert_eq!(measured.metrics.duration_category, DurationCategory::VeryShort);
        for flag in [
            Flag::MuyCorto,
            Flag::DuracionCorta,
            Flag::Hdr,
            Flag::Vfr,
            Flag::BitrateContainerFaltante,
        ] {
            assert!(measured.flags.contains(flag), "missing {}", flag);
        }
        assert!(!measured.flags.contains(Flag::EstimacionBitrate));
        assert_eq!(measured.metrics.audio_share_percent, None);
    }

    #[test]
    fn test_size_estimate_flags_and_review_threshold() {
        let config =
            AnalysisConfig { audio_review_percent: Some(60.0), ..AnalysisConfig::default() };
        let analyzer = MetricsAnalyzer::new(&config);

        let estimated = analyzer.measure(probed(file(1_000_000, 45.0, None), None, vec![]));
        assert!(estimated.flags.contains(Flag::EstimacionBitrate));
        assert!(estimated.flags.contains(Flag::BitrateContainerFaltante));
        assert_eq!(estimated.metrics.bits_per_pixel_frame, None);

        let loud = analyzer.measure(probed(
            file(1_000_000, 45.0, Some(200_000)),
            None,
            vec![audio(1, Some(150_000))],
        ));
        assert_eq!(loud.metrics.audio_share_percent, Some(75.0));
        assert!(loud.flags.contains(Flag::AudioDominante));
        assert!(loud.flags.contains(Flag::AudioRevisar));
        assert!(!loud.flags.contains(Flag::BitrateContainerFaltante));
    }
}
