//! Robust per-bucket outlier detection.
//!
//! Each bucket is scored with a MAD z-score, `(x - median) / (1.4826 * MAD)`,
//! which stays meaningful for the heavy-tailed size distributions of real
//! libraries where a mean/standard-deviation test would be dragged by the tail.

use std::cmp::Ordering;
use std::path::PathBuf;
use serde::Serialize;
use crate::analyzers::bucket::BucketKey;
use crate::analyzers::flags::{Flag, FlagSet};
use crate::config::{AnalysisConfig, OutlierMetric};

/// Makes the MAD consistent with the standard deviation of a normal distribution.
pub const MAD_SCALE: f64 = 1.4826;

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Median absolute deviation around `center`.
pub fn median_absolute_deviation(values: &[f64], center: f64) -> Option<f64> {
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let avg = mean(values)?;
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Spread statistics of one bucket's metric. All `None` below two valid values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BucketStatistics {
    pub valid_records: usize,
    pub median: Option<f64>,
    pub mad: Option<f64>,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub low_confidence: bool,
}

/// Bucket-level outcome for a single record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutlierVerdict {
    pub z_score: Option<f64>,
    pub ratio_vs_median: Option<f64>,
    pub flags: FlagSet,
}

/// Aggregate view of a bucket, one row of the bucket report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSummary {
    pub bucket_key: BucketKey,
    pub metric: OutlierMetric,
    pub total_records: usize,
    #[serde(flatten)]
    pub statistics: BucketStatistics,
    pub mean_bitrate_bps: Option<u64>,
    pub outliers: Vec<PathBuf>,
}

pub struct OutlierAnalyzer<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> OutlierAnalyzer<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    /// Scores every value of a bucket. `values[i]` is `None` when the record has
    /// no usable metric; verdicts come back in the same order.
    pub fn analyze(&self, values: &[Option<f64>]) -> (BucketStatistics, Vec<OutlierVerdict>) {
        let valid: Vec<f64> = values.iter().flatten().copied().collect();
        let low_confidence = valid.len() < self.config.min_bucket_size;

        let mut bucket_flags = FlagSet::new();
        bucket_flags.insert_if(low_confidence, Flag::BucketPequeno);

        if valid.len() < 2 {
            let stats = BucketStatistics {
                valid_records: valid.len(),
                low_confidence,
                ..BucketStatistics::default()
            };
            let verdicts = values
                .iter()
                .map(|_| OutlierVerdict {
                    flags: bucket_flags.clone(),
                    ..OutlierVerdict::default()
                })
                .collect();
            return (stats, verdicts);
        }

        let center = median(&valid);
        let mad = center.and_then(|m| median_absolute_deviation(&valid, m));
        let stats = BucketStatistics {
            valid_records: valid.len(),
            median: center,
            mad,
            mean: mean(&valid),
            std_dev: std_dev(&valid),
            low_confidence,
        };

        let verdicts = values
            .iter()
            .map(|value| {
                let mut flags = bucket_flags.clone();
                let (Some(value), Some(center), Some(mad)) = (*value, center, mad) else {
                    return OutlierVerdict { flags, ..OutlierVerdict::default() };
                };

                let ratio_vs_median = (center != 0.0).then(|| value / center);
                // Identical values: no spread to measure against.
                let z = if mad > 0.0 { (value - center) / (MAD_SCALE * mad) } else { 0.0 };

                let abs_z = z.abs();
                if abs_z >= self.config.strong_z_threshold {
                    flags.insert(Flag::OutlierFuerte);
                } else if abs_z >= self.config.soft_z_threshold {
                    flags.insert(Flag::OutlierSuave);
                }

                OutlierVerdict { z_score: Some(z), ratio_vs_median, flags }
            })
            .collect();

        (stats, verdicts)
    }
}
