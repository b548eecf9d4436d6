use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use csv::Writer;
use crate::analyzers::outlier::BucketSummary;
use crate::analyzers::pipeline::{AnalyticsRecord, AuditReport};
use crate::{Result, SkippedFile};

pub const VIDEOS_REPORT: &str = "videos.csv";
pub const BUCKETS_REPORT: &str = "buckets.csv";
pub const OUTLIERS_REPORT: &str = "outliers.csv";
pub const SKIPPED_REPORT: &str = "skipped.csv";
pub const EVALUATIONS_REPORT: &str = "evaluations.csv";
pub const JSON_REPORT: &str = "report.json";

const RECORD_HEADER: [&str; 24] = [
    "path",
    "size_bytes",
    "modified_at",
    "container_format",
    "duration_seconds",
    "duration_category",
    "video_codec",
    "width",
    "height",
    "fps",
    "is_vfr",
    "is_hdr",
    "audio_streams",
    "bitrate_total_bps",
    "bitrate_source",
    "bitrate_is_estimated",
    "kbps_total",
    "kbps_video",
    "bits_per_pixel_frame",
    "mb_per_minute",
    "audio_share_percent",
    "bucket_key",
    "ratio_vs_bucket_median",
    "flags",
];

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn decimal(value: Option<f64>, places: usize) -> String {
    value.map(|v| format!("{:.*}", places, v)).unwrap_or_default()
}

pub struct Reporter;

impl Reporter {
    pub fn new() -> Self {
        Self
    }

    /// Writes every CSV report (and optionally JSON) into `output_dir`.
    pub fn generate_all(
        &self,
        report: &AuditReport,
        output_dir: impl AsRef<Path>,
        json: bool,
    ) -> Result<Vec<PathBuf>> {
        let dir = output_dir.as_ref();
        let mut written = vec![
            dir.join(VIDEOS_REPORT),
            dir.join(BUCKETS_REPORT),
            dir.join(OUTLIERS_REPORT),
            dir.join(SKIPPED_REPORT),
            dir.join(EVALUATIONS_REPORT),
        ];
        self.generate_records_report(&report.records, &written[0])?;
        self.generate_bucket_report(&report.buckets, &written[1])?;
        let outliers: Vec<&AnalyticsRecord> = report.outliers().collect();
        self.generate_records_report(outliers, &written[2])?;
        self.generate_skipped_report(&report.skipped, &written[3])?;
        self.generate_evaluation_report(&report.records, &written[4])?;

        if json {
            let path = dir.join(JSON_REPORT);
            self.generate_json_report(report, &path)?;
            written.push(path);
        }
        Ok(written)
    }

    pub fn generate_records_report<'a>(
        &self,
        records: impl IntoIterator<Item = &'a AnalyticsRecord>,
        output_path: impl AsRef<Path>,
    ) -> Result<()> {
        let output_path_ref = output_path.as_ref();
        let mut writer = Writer::from_path(output_path_ref)?;
        writer.write_record(RECORD_HEADER)?;

        let mut rows = 0;
        for record in records {
            let video = record.video.as_ref();
            let metrics = &record.metrics;
            writer.write_record(&[
                record.file.path.display().to_string(),
                record.file.size_bytes.to_string(),
                opt(record.file.modified_at.map(|t| t.to_rfc3339())),
                record.file.container_format.clone(),
                format!("{:.3}", record.file.duration_seconds),
                metrics.duration_category.to_string(),
                opt(video.map(|v| v.codec.as_str())),
                opt(video.map(|v| v.width)),
                opt(video.map(|v| v.height)),
                decimal(video.and_then(|v| v.fps), 3),
                opt(video.map(|v| v.is_variable_frame_rate)),
                opt(video.map(|v| v.is_hdr)),
                record.audio.len().to_string(),
                metrics.bitrate_total_bps.to_string(),
                metrics.bitrate_source.to_string(),
                metrics.bitrate_is_estimated.to_string(),
                metrics.kbps_total.to_string(),
                opt(metrics.kbps_video),
                decimal(metrics.bits_per_pixel_frame, 5),
                format!("{:.3}", metrics.mb_per_minute),
                decimal(metrics.audio_share_percent, 2),
                record.bucket_key.to_string(),
                decimal(record.ratio_vs_bucket_median, 3),
                record.flags.to_string(),
            ])?;
            rows += 1;
        }

        writer.flush()?;
        log::info!("Report generated: {} ({} rows)", output_path_ref.display(), rows);
        Ok(())
    }

    pub fn generate_bucket_report(
        &self,
        buckets: &[BucketSummary],
        output_path: impl AsRef<Path>,
    ) -> Result<()> {
        let output_path_ref = output_path.as_ref();
        let mut writer = Writer::from_path(output_path_ref)?;

        writer.write_record([
            "bucket_key",
            "metric",
            "total_records",
            "valid_records",
            "median",
            "mad",
            "mean",
            "std_dev",
            "mean_bitrate_bps",
            "low_confidence",
            "outliers",
        ])?;

        for bucket in buckets {
            let stats = &bucket.statistics;
            let outliers = bucket
                .outliers
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            writer.write_record(&[
                bucket.bucket_key.to_string(),
                bucket.metric.as_str().to_string(),
                bucket.total_records.to_string(),
                stats.valid_records.to_string(),
                decimal(stats.median, 5),
                decimal(stats.mad, 5),
                decimal(stats.mean, 5),
                decimal(stats.std_dev, 5),
                opt(bucket.mean_bitrate_bps),
                stats.low_confidence.to_string(),
                outliers,
            ])?;
        }

        writer.flush()?;
        log::info!("Bucket report generated: {}", output_path_ref.display());
        Ok(())
    }

    pub fn generate_skipped_report(
        &self,
        skipped: &[SkippedFile],
        output_path: impl AsRef<Path>,
    ) -> Result<()> {
        let output_path_ref = output_path.as_ref();
        let mut writer = Writer::from_path(output_path_ref)?;
        writer.write_record(["path", "reason"])?;
        for skip in skipped {
            writer.write_record(&[skip.path.display().to_string(), skip.reason.to_string()])?;
        }
        writer.flush()?;
        log::info!("Skipped files report generated: {}", output_path_ref.display());
        Ok(())
    }

    /// One row per record and checked metric.
    pub fn generate_evaluation_report(
        &self,
        records: &[AnalyticsRecord],
        output_path: impl AsRef<Path>,
    ) -> Result<()> {
        let output_path_ref = output_path.as_ref();
        let mut writer = Writer::from_path(output_path_ref)?;
        writer.write_record([
            "path",
            "bucket_key",
            "metric",
            "value",
            "recommended",
            "status",
            "difference_percent",
            "detail",
        ])?;

        let mut warnings = 0;
        for record in records {
            for evaluation in &record.evaluations {
                writer.write_record(&[
                    record.file.path.display().to_string(),
                    record.bucket_key.to_string(),
                    evaluation.metric.to_string(),
                    opt(evaluation.value),
                    evaluation.recommended.clone(),
                    evaluation.status.to_string(),
                    decimal(evaluation.difference_percent, 1),
                    evaluation.detail.clone(),
                ])?;
            }
            warnings += record.evaluation_warnings().count();
        }

        writer.flush()?;
        log::info!(
            "Evaluation report generated: {} ({} warnings)",
            output_path_ref.display(),
            warnings
        );
        Ok(())
    }

    pub fn generate_json_report(
        &self,
        report: &AuditReport,
        output_path: impl AsRef<Path>,
    ) -> Result<()> {
        let output_path_ref = output_path.as_ref();
        let writer = BufWriter::new(File::create(output_path_ref)?);
        serde_json::to_writer_pretty(writer, report)?;
        log::info!("JSON report generated: {}", output_path_ref.display());
        Ok(())
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::pipeline::AuditPipeline;
    use crate::config::AnalysisConfig;
    use crate::video::normalize::RawProbe;
    use serde_json::json;

    fn sample_report() -> AuditReport {
        let ok = RawProbe {
            path: PathBuf::from("/v/ok.mp4"),
            size_bytes: 5_000_000,
            modified_at: None,
            format: json!({"duration": "60", "format_name": "mp4", "bit_rate": "666666"}),
            video_stream: Some(json!({"codec_name": "h264", "width": 1280, "height": 720,
                                      "avg_frame_rate": "30/1", "r_frame_rate": "30/1"})),
            audio_streams: vec![],
        };
        let broken = RawProbe {
            path: PathBuf::from("/v/broken.mp4"),
            ..RawProbe::default()
        };
        AuditPipeline::new(AnalysisConfig::default()).run(&[ok, broken])
    }

    #[test]
    fn test_generate_all_writes_reports() {
        let dir = tempfile::tempdir().unwrap();
        let written = Reporter::new().generate_all(&sample_report(), dir.path(), true).unwrap();
        assert_eq!(written.len(), 6);
        assert!(written.iter().all(|p| p.is_file()));

        let mut reader = csv::Reader::from_path(dir.path().join(VIDEOS_REPORT)).unwrap();
        assert_eq!(reader.headers().unwrap().len(), RECORD_HEADER.len());
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "/v/ok.mp4");
        assert_eq!(&rows[0][21], "720p@30");
        assert_eq!(&rows[0][23], "BUCKET_PEQUENO");

        let mut reader = csv::Reader::from_path(dir.path().join(EVALUATIONS_REPORT)).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 5);
        let kbps = rows.iter().find(|r| &r[2] == "kbps_total").unwrap();
        assert_eq!(&kbps[3], "667");
        assert_eq!(&kbps[4], "1200 - 3500 kbps");
        assert_eq!(&kbps[5], "WARN");
        assert_eq!(&kbps[6], "44.4");

        let skipped = std::fs::read_to_string(dir.path().join(SKIPPED_REPORT)).unwrap();
        assert!(skipped.contains("/v/broken.mp4"));
        assert!(skipped.contains("duration missing"));

        let content = std::fs::read_to_string(dir.path().join(JSON_REPORT)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(json["records"].as_array().unwrap().len(), 1);
        assert_eq!(json["buckets"][0]["bucket_key"], "720p@30");
    }

    #[test]
    fn test_outlier_report_has_header_only_when_clean() {
        let dir = tempfile::tempdir().unwrap();
        Reporter::new().generate_all(&sample_report(), dir.path(), false).unwrap();
        let mut reader = csv::Reader::from_path(dir.path().join(OUTLIERS_REPORT)).unwrap();
        assert_eq!(reader.records().count(), 0);
        assert!(!dir.path().join(JSON_REPORT).exists());
    }
}
