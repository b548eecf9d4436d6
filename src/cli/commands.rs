use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use crate::config::{OutlierMetric, Settings};

#[derive(Parser)]
#[command(name = "video-library-auditor")]
#[command(version)]
#[command(
    about = "Audits a video library and flags files whose size or bitrate deviates from comparable peers",
    long_about = None
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan directories, probe every video with ffprobe and write the audit reports
    Audit {
        /// Directories to scan for video files
        #[arg(short = 'i', long = "input", required = true, num_args = 1..)]
        dirs: Vec<PathBuf>,

        /// Directory that receives the timestamped report folder
        #[arg(short = 'o', long = "output")]
        output: PathBuf,

        /// Path to the ffprobe executable
        #[arg(long)]
        ffprobe: Option<PathBuf>,

        /// Number of probing threads (defaults to all cores)
        #[arg(short = 't', long)]
        threads: Option<usize>,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },

    /// Analyze an already probed batch stored as a JSON array of raw probes
    Analyze {
        /// JSON file with the raw probe batch
        #[arg(short = 'i', long = "input")]
        input: PathBuf,

        /// Directory that receives the timestamped report folder
        #[arg(short = 'o', long = "output")]
        output: PathBuf,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },
}

/// Options shared by every command that runs the analysis.
#[derive(Args, Debug, Default)]
pub struct AnalysisArgs {
    /// TOML settings file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Metric compared within each bucket
    #[arg(short = 'm', long, value_enum)]
    pub metric: Option<OutlierMetric>,

    /// Split buckets by video codec
    #[arg(long)]
    pub by_codec: bool,

    /// Also write report.json
    #[arg(long)]
    pub json: bool,
}

impl AnalysisArgs {
    /// Loads the settings file if given, then applies command-line overrides.
    pub fn settings(&self) -> crate::Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };
        if let Some(metric) = self.metric {
            settings.analysis.outlier_metric = metric;
        }
        if self.by_codec {
            settings.analysis.bucket_by_codec = true;
        }
        Ok(settings)
    }
}
