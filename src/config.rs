use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::analyzers::evaluate::EvaluationRules;
use crate::{AuditError, Result};

/// Metric compared against bucket peers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMetric {
    #[default]
    MbPerMinute,
    BitsPerPixelFrame,
}

impl OutlierMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutlierMetric::MbPerMinute => "mb_per_minute",
            OutlierMetric::BitsPerPixelFrame => "bits_per_pixel_frame",
        }
    }
}

/// Tunables of the metrics and outlier pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub outlier_metric: OutlierMetric,
    /// |z| at or above this is a strong outlier. Default 3.
    pub strong_z_threshold: f64,
    /// |z| at or above this (and below strong) is a soft outlier. Default 2.
    pub soft_z_threshold: f64,
    /// Buckets with fewer valid values are labeled low-confidence. Default 5.
    pub min_bucket_size: usize,
    /// Below this a clip is VERY_SHORT and flagged MUY_CORTO. Default 10s.
    pub very_short_seconds: f64,
    /// Below this a clip is flagged DURACION_CORTA. Default 30s.
    pub short_clip_seconds: f64,
    /// Upper bound (exclusive) of the SHORT band. Default 120s.
    pub medium_from_seconds: f64,
    /// Lower bound (inclusive) of the LONG band. Default 300s.
    pub long_from_seconds: f64,
    /// Audio share above this is flagged AUDIO_DOMINANTE. Default 40%.
    pub audio_dominant_percent: f64,
    /// Optional second audio-share cutoff flagged AUDIO_REVISAR. Unset by default.
    pub audio_review_percent: Option<f64>,
    pub height_ladder: Vec<u32>,
    pub fps_ladder: Vec<u32>,
    /// Append the codec to bucket keys.
    pub bucket_by_codec: bool,
    /// Recommended values checked per record.
    pub evaluation: EvaluationRules,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            outlier_metric: OutlierMetric::MbPerMinute,
            strong_z_threshold: 3.0,
            soft_z_threshold: 2.0,
            min_bucket_size: 5,
            very_short_seconds: 10.0,
            short_clip_seconds: 30.0,
            medium_from_seconds: 120.0,
            long_from_seconds: 300.0,
            audio_dominant_percent: 40.0,
            audio_review_percent: None,
            height_ladder: vec![360, 480, 720, 1080, 1440, 2160],
            fps_ladder: vec![24, 25, 30, 50, 60],
            bucket_by_codec: false,
            evaluation: EvaluationRules::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.soft_z_threshold > 0.0 && self.soft_z_threshold < self.strong_z_threshold) {
            return Err(AuditError::Config(format!(
                "soft z threshold ({}) must be positive and below the strong threshold ({})",
                self.soft_z_threshold, self.strong_z_threshold
            )));
        }
        if self.min_bucket_size == 0 {
            return Err(AuditError::Config("min_bucket_size must be at least 1".into()));
        }
        if !(self.very_short_seconds <= self.medium_from_seconds
            && self.medium_from_seconds <= self.long_from_seconds)
        {
            return Err(AuditError::Config(format!(
                "duration bands must be ordered: {} <= {} <= {}",
                self.very_short_seconds, self.medium_from_seconds, self.long_from_seconds
            )));
        }
        if let Some(review) = self.audio_review_percent {
            if review <= self.audio_dominant_percent {
                return Err(AuditError::Config(format!(
                    "audio_review_percent ({}) must exceed audio_dominant_percent ({})",
                    review, self.audio_dominant_percent
                )));
            }
        }
        if self.height_ladder.is_empty() || self.fps_ladder.is_empty() {
            return Err(AuditError::Config("snapping ladders cannot be empty".into()));
        }
        self.evaluation.validate()
    }
}

/// Options of the filesystem scan and the ffprobe collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub extensions: Vec<String>,
    /// Regex patterns; matching paths are not probed.
    pub exclude: Vec<String>,
    pub ffprobe_bin: PathBuf,
    /// Worker threads for probing, all cores when unset.
    pub threads: Option<usize>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: [
                "mp4", "mkv", "mov", "avi", "webm", "m4v", "wmv", "flv", "ts", "mpg", "mpeg",
            ]
            .iter()
            .map(|e| e.to_string())
            .collect(),
            exclude: Vec::new(),
            ffprobe_bin: PathBuf::from("ffprobe"),
            threads: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub analysis: AnalysisConfig,
    pub scan: ScanConfig,
}

impl Settings {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading settings from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.analysis.validate()?;
        for pattern in &self.scan.exclude {
            regex::Regex::new(pattern).map_err(|e| {
                AuditError::Config(format!("invalid exclude pattern '{}': {}", pattern, e))
            })?;
        }
        if self.scan.extensions.iter().all(|e| e.trim().trim_start_matches('.').is_empty()) {
            return Err(AuditError::Config("at least one video extension is required".into()));
        }
        if self.scan.threads == Some(0) {
            return Err(AuditError::Config("threads must be at least 1".into()));
        }
        Ok(())
    }
}
