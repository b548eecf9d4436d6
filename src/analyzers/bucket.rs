use std::cmp::Ordering;
use std::fmt;
use serde::{Deserialize, Serialize};
use crate::config::AnalysisConfig;
use crate::VideoStream;

pub const UNKNOWN_BUCKET: &str = "UNKNOWN";

/// Grouping key such as `1080p@30`, `2160p@60/HDR` or `720p@25/HEVC`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketKey(String);

impl BucketKey {
    pub fn unknown() -> Self {
        Self(UNKNOWN_BUCKET.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_BUCKET
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Nearest ladder step to `value`; equal distances resolve to the lower step.
pub fn snap_to_ladder(value: f64, ladder: &[u32]) -> Option<u32> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    ladder.iter().copied().min_by(|a, b| {
        let da = (*a as f64 - value).abs();
        let db = (*b as f64 - value).abs();
        da.partial_cmp(&db).unwrap_or(Ordering::Equal).then(a.cmp(b))
    })
}

pub struct BucketAssigner<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> BucketAssigner<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn assign(&self, video: Option<&VideoStream>) -> BucketKey {
        let Some(video) = video else {
            return BucketKey::unknown();
        };
        let height = snap_to_ladder(video.height as f64, &self.config.height_ladder);
        let fps = video.fps.and_then(|fps| snap_to_ladder(fps, &self.config.fps_ladder));
        let (Some(height), Some(fps)) = (height, fps) else {
            return BucketKey::unknown();
        };

        let mut key = format!("{}p@{}", height, fps);
        if video.is_hdr {
            key.push_str("/HDR");
        }
        if self.config.bucket_by_codec {
            key.push('/');
            key.push_str(&video.codec.to_uppercase());
        }
        BucketKey(key)
    }
}
