//! Checks each record against recommended values for its bucket.
//!
//! Rules are a table of default targets plus per-bucket overrides. A bucket
//! key resolves to its override table directly (`1080p@30`) or through its
//! base profile (`1080p@30/HDR` and `720p@30/HEVC` use `1080p@30` and `720p@30`).

use std::collections::BTreeMap;
use std::fmt;
use serde::{Deserialize, Serialize};
use crate::analyzers::bucket::BucketKey;
use crate::{AuditError, Result};

/// Record field checked against a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatedMetric {
    MbPerMinute,
    BitsPerPixelFrame,
    KbpsTotal,
    AudioSharePercent,
    RatioVsBucketMedian,
}

impl EvaluatedMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluatedMetric::MbPerMinute => "mb_per_minute",
            EvaluatedMetric::BitsPerPixelFrame => "bits_per_pixel_frame",
            EvaluatedMetric::KbpsTotal => "kbps_total",
            EvaluatedMetric::AudioSharePercent => "audio_share_percent",
            EvaluatedMetric::RatioVsBucketMedian => "ratio_vs_bucket_median",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            EvaluatedMetric::MbPerMinute => "MB/min",
            EvaluatedMetric::BitsPerPixelFrame => "bppf",
            EvaluatedMetric::KbpsTotal => "kbps",
            EvaluatedMetric::AudioSharePercent => "%",
            EvaluatedMetric::RatioVsBucketMedian => "x",
        }
    }
}

impl fmt::Display for EvaluatedMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recommended value. In TOML: `{ maximum = 40 }`, `{ minimum = 500 }` or `{ range = [1.0, 8.0] }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Maximum(f64),
    Minimum(f64),
    Range(f64, f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationStatus {
    Ok,
    Warn,
    NoData,
}

impl EvaluationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationStatus::Ok => "OK",
            EvaluationStatus::Warn => "WARN",
            EvaluationStatus::NoData => "NO_DATA",
        }
    }
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one rule for one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub metric: EvaluatedMetric,
    pub value: Option<f64>,
    pub recommended: String,
    pub status: EvaluationStatus,
    /// Distance to the violated limit, relative to that limit. `0` when satisfied.
    pub difference_percent: Option<f64>,
    pub detail: String,
}

impl Recommendation {
    pub fn evaluate(&self, metric: EvaluatedMetric, value: Option<f64>) -> Evaluation {
        let recommended = self.describe(metric.unit());
        let Some(value) = value else {
            return Evaluation {
                metric,
                value: None,
                recommended,
                status: EvaluationStatus::NoData,
                difference_percent: None,
                detail: "no data".to_string(),
            };
        };

        let (ok, difference_percent, detail) = match *self {
            Recommendation::Maximum(limit) => {
                if value <= limit {
                    (true, Some(0.0), "within the expected maximum".to_string())
                } else {
                    let diff =
                        if limit > 0.0 { relative_difference(value, limit) } else { Some(0.0) };
                    let detail = format!("exceeds the maximum by {:.1}%", diff.unwrap_or(0.0));
                    (false, diff, detail)
                }
            }
            Recommendation::Minimum(limit) => {
                if value >= limit {
                    (true, Some(0.0), "meets the expected minimum".to_string())
                } else {
                    let diff =
                        if limit > 0.0 { relative_difference(value, limit) } else { Some(0.0) };
                    let detail = format!("{:.1}% below the minimum", diff.unwrap_or(0.0));
                    (false, diff, detail)
                }
            }
            Recommendation::Range(min, max) => {
                if (min..=max).contains(&value) {
                    (true, Some(0.0), "within the target range".to_string())
                } else if value < min {
                    let diff = (min > 0.0).then(|| relative_difference(value, min)).flatten();
                    let detail = match diff {
                        Some(d) => format!("{:.1}% below the minimum", d),
                        None => "below the range".to_string(),
                    };
                    (false, diff, detail)
                } else {
                    let diff = (max > 0.0).then(|| relative_difference(value, max)).flatten();
                    let detail = match diff {
                        Some(d) => format!("{:.1}% above the maximum", d),
                        None => "above the range".to_string(),
                    };
                    (false, diff, detail)
                }
            }
        };

        Evaluation {
            metric,
            value: Some(value),
            recommended,
            status: if ok { EvaluationStatus::Ok } else { EvaluationStatus::Warn },
            difference_percent,
            detail,
        }
    }

    /// Human-readable target, e.g. `1 - 8 MB/min` or `<= 40 %`.
    pub fn describe(&self, unit: &str) -> String {
        let text = match *self {
            Recommendation::Maximum(limit) => format!("<= {} {}", format_limit(limit), unit),
            Recommendation::Minimum(limit) => format!(">= {} {}", format_limit(limit), unit),
            Recommendation::Range(min, max) => {
                format!("{} - {} {}", format_limit(min), format_limit(max), unit)
            }
        };
        text.trim().to_string()
    }

    fn validate(&self, metric: EvaluatedMetric) -> Result<()> {
        let valid = match *self {
            Recommendation::Maximum(limit) | Recommendation::Minimum(limit) => limit.is_finite(),
            Recommendation::Range(min, max) => min.is_finite() && max.is_finite() && min <= max,
        };
        if valid {
            Ok(())
        } else {
            Err(AuditError::Config(format!("invalid recommendation for {}: {:?}", metric, self)))
        }
    }
}

fn relative_difference(value: f64, reference: f64) -> Option<f64> {
    (reference != 0.0).then(|| (value - reference).abs() / reference * 100.0)
}

fn format_limit(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

pub type RuleTable = BTreeMap<EvaluatedMetric, Recommendation>;

/// Default targets plus overrides keyed by bucket profile (`720p@30`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationRules {
    pub defaults: RuleTable,
    pub buckets: BTreeMap<String, RuleTable>,
}

impl Default for EvaluationRules {
    fn default() -> Self {
        use EvaluatedMetric::*;
        use Recommendation::*;

        let defaults = RuleTable::from([
            (MbPerMinute, Range(1.0, 8.0)),
            (BitsPerPixelFrame, Range(0.02, 0.12)),
            (KbpsTotal, Range(500.0, 8000.0)),
            (AudioSharePercent, Maximum(40.0)),
            (RatioVsBucketMedian, Range(0.7, 1.3)),
        ]);

        let profile = |mb: (f64, f64), kbps: (f64, f64), bppf: (f64, f64)| {
            RuleTable::from([
                (MbPerMinute, Range(mb.0, mb.1)),
                (KbpsTotal, Range(kbps.0, kbps.1)),
                (BitsPerPixelFrame, Range(bppf.0, bppf.1)),
            ])
        };
        let buckets = BTreeMap::from([
            ("360p@30".to_string(), profile((0.8, 2.5), (400.0, 1200.0), (0.015, 0.06))),
            ("480p@30".to_string(), profile((1.2, 3.5), (700.0, 2000.0), (0.02, 0.08))),
            ("720p@30".to_string(), profile((2.0, 5.0), (1200.0, 3500.0), (0.03, 0.1))),
            ("1080p@30".to_string(), profile((3.5, 8.5), (2500.0, 6000.0), (0.04, 0.12))),
            ("1080p@60".to_string(), profile((5.0, 10.0), (3500.0, 8000.0), (0.05, 0.14))),
            ("2160p@30".to_string(), profile((8.0, 20.0), (8000.0, 20000.0), (0.06, 0.16))),
        ]);

        Self { defaults, buckets }
    }
}

impl EvaluationRules {
    /// Override table key for a bucket: exact match first, then the part before `/`.
    pub fn resolve_bucket(&self, key: &BucketKey) -> Option<&str> {
        let find = |wanted: &str| {
            self.buckets
                .keys()
                .find(|k| k.eq_ignore_ascii_case(wanted))
                .map(String::as_str)
        };
        let full = key.as_str();
        find(full).or_else(|| full.split_once('/').and_then(|(base, _)| find(base)))
    }

    /// Defaults merged with the bucket's overrides.
    pub fn rules_for(&self, key: &BucketKey) -> RuleTable {
        let mut rules = self.defaults.clone();
        if let Some(overrides) = self.resolve_bucket(key).and_then(|k| self.buckets.get(k)) {
            rules.extend(overrides.iter().map(|(metric, rule)| (*metric, *rule)));
        }
        rules
    }

    pub fn validate(&self) -> Result<()> {
        let tables = std::iter::once(&self.defaults).chain(self.buckets.values());
        for table in tables {
            for (metric, rule) in table {
                rule.validate(*metric)?;
            }
        }
        Ok(())
    }
}

/// Values of one record, as seen by the rules.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EvaluatedValues {
    pub mb_per_minute: Option<f64>,
    pub bits_per_pixel_frame: Option<f64>,
    pub kbps_total: Option<f64>,
    pub audio_share_percent: Option<f64>,
    pub ratio_vs_bucket_median: Option<f64>,
}

impl EvaluatedValues {
    fn get(&self, metric: EvaluatedMetric) -> Option<f64> {
        match metric {
            EvaluatedMetric::MbPerMinute => self.mb_per_minute,
            EvaluatedMetric::BitsPerPixelFrame => self.bits_per_pixel_frame,
            EvaluatedMetric::KbpsTotal => self.kbps_total,
            EvaluatedMetric::AudioSharePercent => self.audio_share_percent,
            EvaluatedMetric::RatioVsBucketMedian => self.ratio_vs_bucket_median,
        }
        .filter(|v| v.is_finite())
    }
}

pub struct Evaluator<'a> {
    rules: &'a EvaluationRules,
}

impl<'a> Evaluator<'a> {
    pub fn new(rules: &'a EvaluationRules) -> Self {
        Self { rules }
    }

    /// One evaluation per applicable rule, in metric order.
    pub fn evaluate(&self, key: &BucketKey, values: &EvaluatedValues) -> Vec<Evaluation> {
        self.rules
            .rules_for(key)
            .into_iter()
            .map(|(metric, rule)| rule.evaluate(metric, values.get(metric)))
            .collect()
    }
}
