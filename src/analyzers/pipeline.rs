use std::collections::BTreeMap;
use std::path::PathBuf;
use rayon::prelude::*;
use serde::Serialize;
use crate::analyzers::bucket::{BucketAssigner, BucketKey};
use crate::analyzers::evaluate::{EvaluatedValues, Evaluation, EvaluationStatus, Evaluator};
use crate::analyzers::flags::{self, FlagSet};
use crate::analyzers::metrics::{DerivedMetrics, MeasuredFile, MetricsAnalyzer};
use crate::analyzers::outlier::{BucketSummary, OutlierAnalyzer, OutlierVerdict};
use crate::config::{AnalysisConfig, OutlierMetric};
use crate::video::normalize::{normalize, RawProbe};
use crate::{AudioStream, DataWarning, FileRecord, SkippedFile, VideoStream};

/// Final per-file output. Built once by the pipeline and not modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsRecord {
    #[serde(flatten)]
    pub file: FileRecord,
    pub video: Option<VideoStream>,
    pub audio: Vec<AudioStream>,
    #[serde(flatten)]
    pub metrics: DerivedMetrics,
    pub bucket_key: BucketKey,
    pub ratio_vs_bucket_median: Option<f64>,
    pub z_score: Option<f64>,
    pub flags: FlagSet,
    pub warnings: Vec<DataWarning>,
    /// Checks against the recommended values of the record's bucket.
    pub evaluations: Vec<Evaluation>,
}

impl AnalyticsRecord {
    fn assemble(
        measured: MeasuredFile,
        bucket_key: BucketKey,
        verdict: OutlierVerdict,
        evaluator: &Evaluator<'_>,
    ) -> Self {
        let MeasuredFile { probed, metrics, flags: file_flags } = measured;
        let values = EvaluatedValues {
            mb_per_minute: Some(metrics.mb_per_minute),
            bits_per_pixel_frame: metrics.bits_per_pixel_frame,
            kbps_total: Some(metrics.kbps_total as f64),
            audio_share_percent: metrics.audio_share_percent,
            ratio_vs_bucket_median: verdict.ratio_vs_median,
        };
        let evaluations = evaluator.evaluate(&bucket_key, &values);
        Self {
            file: probed.file,
            video: probed.video,
            audio: probed.audio,
            metrics,
            bucket_key,
            ratio_vs_bucket_median: verdict.ratio_vs_median,
            z_score: verdict.z_score,
            flags: flags::aggregate(&file_flags, &verdict.flags),
            warnings: probed.warnings,
            evaluations,
        }
    }

    pub fn metric(&self, metric: OutlierMetric) -> Option<f64> {
        metric_value(&self.metrics, metric)
    }

    pub fn evaluation_warnings(&self) -> impl Iterator<Item = &Evaluation> {
        self.evaluations.iter().filter(|e| e.status == EvaluationStatus::Warn)
    }
}

fn metric_value(metrics: &DerivedMetrics, metric: OutlierMetric) -> Option<f64> {
    match metric {
        OutlierMetric::MbPerMinute => Some(metrics.mb_per_minute).filter(|v| v.is_finite()),
        OutlierMetric::BitsPerPixelFrame => metrics.bits_per_pixel_frame,
    }
}

/// Everything a batch run produces. Records are ordered by bucket key, then path.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditReport {
    pub records: Vec<AnalyticsRecord>,
    pub buckets: Vec<BucketSummary>,
    pub skipped: Vec<SkippedFile>,
}

impl AuditReport {
    pub fn outliers(&self) -> impl Iterator<Item = &AnalyticsRecord> {
        self.records.iter().filter(|r| r.flags.has_outlier())
    }
}

pub struct AuditPipeline {
    config: AnalysisConfig,
}

impl AuditPipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Turns a batch of raw probes into analytics records.
    ///
    /// Normalization and per-file metrics run in parallel. Bucketing and outlier
    /// scoring wait for the whole batch, so every bucket statistic is computed
    /// from the complete set of its members.
    pub fn run(&self, batch: &[RawProbe]) -> AuditReport {
        log::info!(
            "Starting analysis of {} files using {} threads",
            batch.len(),
            rayon::current_num_threads()
        );

        let metrics = MetricsAnalyzer::new(&self.config);
        let staged: Vec<std::result::Result<MeasuredFile, SkippedFile>> = batch
            .par_iter()
            .map(|raw| normalize(raw).map(|probed| metrics.measure(probed)))
            .collect();

        let mut measured = Vec::with_capacity(staged.len());
        let mut skipped = Vec::new();
        for result in staged {
            match result {
                Ok(file) => measured.push(file),
                Err(skip) => {
                    log::warn!("{}", skip);
                    skipped.push(skip);
                }
            }
        }
        skipped.sort_by(|a, b| a.path.cmp(&b.path));

        let buckets = self.group_into_buckets(measured);
        log::info!(
            "Grouped {} files into {} buckets",
            buckets.values().map(Vec::len).sum::<usize>(),
            buckets.len()
        );

        let outliers = OutlierAnalyzer::new(&self.config);
        let mut report = AuditReport { skipped, ..AuditReport::default() };
        for (key, members) in buckets {
            let (summary, records) = self.analyze_bucket(&outliers, key, members);
            report.buckets.push(summary);
            report.records.extend(records);
        }

        log::info!(
            "Analysis complete: {} records, {} outliers, {} skipped",
            report.records.len(),
            report.outliers().count(),
            report.skipped.len()
        );
        report
    }

    fn group_into_buckets(
        &self,
        measured: Vec<MeasuredFile>,
    ) -> BTreeMap<BucketKey, Vec<MeasuredFile>> {
        let assigner = BucketAssigner::new(&self.config);
        let mut buckets: BTreeMap<BucketKey, Vec<MeasuredFile>> = BTreeMap::new();
        for file in measured {
            let key = assigner.assign(file.probed.video.as_ref());
            buckets.entry(key).or_default().push(file);
        }
        for members in buckets.values_mut() {
            members.sort_by(|a, b| a.probed.file.path.cmp(&b.probed.file.path));
        }
        buckets
    }

    fn analyze_bucket(
        &self,
        analyzer: &OutlierAnalyzer<'_>,
        key: BucketKey,
        members: Vec<MeasuredFile>,
    ) -> (BucketSummary, Vec<AnalyticsRecord>) {
        let metric = self.config.outlier_metric;
        let values: Vec<Option<f64>> =
            members.iter().map(|m| metric_value(&m.metrics, metric)).collect();
        let (statistics, verdicts) = analyzer.analyze(&values);
        let evaluator = Evaluator::new(&self.config.evaluation);

        let total_records = members.len();
        // Widened so saturated bitrates cannot overflow the sum.
        let mean_bitrate_bps = (total_records > 0).then(|| {
            let sum: u128 = members.iter().map(|m| u128::from(m.metrics.bitrate_total_bps)).sum();
            (sum / total_records as u128) as u64
        });

        let records: Vec<AnalyticsRecord> = members
            .into_iter()
            .zip(verdicts)
            .map(|(member, verdict)| {
                AnalyticsRecord::assemble(member, key.clone(), verdict, &evaluator)
            })
            .collect();

        let outliers: Vec<PathBuf> = records
            .iter()
            .filter(|r| r.flags.has_outlier())
            .map(|r| r.file.path.clone())
            .collect();

        log::debug!(
            "Bucket {}: {} files, median {:?}, MAD {:?}, {} outliers{}",
            key,
            total_records,
            statistics.median,
            statistics.mad,
            outliers.len(),
            if statistics.low_confidence { " (low confidence)" } else { "" }
        );

        let summary = BucketSummary {
            bucket_key: key,
            metric,
            total_records,
            statistics,
            mean_bitrate_bps,
            outliers,
        };
        (summary, records)
    }
}
