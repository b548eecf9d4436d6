use std::path::PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod analyzers;
pub mod cli;
pub mod config;
pub mod utils;
pub mod video;

/// One probed video file on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub duration_seconds: f64,
    pub container_format: String,
    /// Total bitrate reported by the container, if any.
    pub container_bitrate_bps: Option<u64>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// First video stream of a file. Derived booleans are fixed at normalization time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStream {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub bitrate_bps: Option<u64>,
    pub fps: Option<f64>,
    pub is_variable_frame_rate: bool,
    pub is_hdr: bool,
    pub pix_fmt: Option<String>,
    pub profile: Option<String>,
    pub level: Option<String>,
    pub color_space: Option<String>,
    pub color_transfer: Option<String>,
    pub color_primaries: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStream {
    pub index: u32,
    pub codec: String,
    pub channels: u32,
    pub sample_rate: u32,
    pub bitrate_bps: Option<u64>,
    pub channel_layout: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ffprobe error: {0}")]
    Probe(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

pub type Result<T> = std::result::Result<T, AuditError>;

/// Why a file was left out of the batch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SkipReason {
    #[error("duration missing from probe output")]
    MissingDuration,
    #[error("duration '{0}' is not a number")]
    UnparseableDuration(String),
    #[error("duration {0}s is not positive")]
    NonPositiveDuration(f64),
    #[error("probe failed: {0}")]
    ProbeFailed(String),
}

/// A file excluded from analysis. Never fails the batch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("skipped {}: {reason}", .path.display())]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

impl Serialize for SkippedFile {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("SkippedFile", 2)?;
        state.serialize_field("path", &self.path)?;
        state.serialize_field("reason", &self.reason.to_string())?;
        state.end()
    }
}

/// Non-fatal input defect that degrades a derived field to unknown.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataWarning {
    #[error("container bitrate not reported")]
    MissingContainerBitrate,
    #[error("video bitrate not reported")]
    MissingVideoBitrate,
    #[error("audio stream {index} bitrate not reported")]
    MissingAudioBitrate { index: u32 },
    #[error("frame rate '{0}' could not be resolved")]
    UnknownFrameRate(String),
    #[error("no video stream")]
    NoVideoStream,
    #[error("video stream ignored, missing {0}")]
    IncompleteVideoStream(&'static str),
    #[error("audio stream {index} ignored, missing {field}")]
    IncompleteAudioStream { index: u32, field: &'static str },
}

impl Serialize for DataWarning {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// Re-exports for convenience
pub use analyzers::flags::{Flag, FlagSet};
pub use analyzers::pipeline::{AnalyticsRecord, AuditPipeline, AuditReport};
pub use config::{AnalysisConfig, OutlierMetric, ScanConfig, Settings};
pub use video::normalize::{ProbedFile, RawProbe};
pub use video::probe::VideoProber;
