use std::path::{Path, PathBuf};
use clap::Parser;
use video_library_auditor::{
    analyzers::pipeline::{AuditPipeline, AuditReport},
    cli::commands::{Cli, Commands},
    utils::{file_ops::FileManager, reporting::Reporter},
    video::probe::VideoProber,
    RawProbe, Result,
};

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Audit { dirs, output, ffprobe, threads, analysis } => {
            let mut settings = analysis.settings()?;
            if let Some(ffprobe) = ffprobe {
                settings.scan.ffprobe_bin = ffprobe;
            }
            if threads.is_some() {
                settings.scan.threads = threads;
            }
            settings.validate()?;

            println!("=== Starting Video Audit ===");
            for dir in &dirs {
                println!("  - {}", dir.display());
            }

            let prober = VideoProber::new(&settings.scan)?;
            let batch = prober.process_directories(&dirs)?;
            println!(
                "\nProbed {} video files ({} failed)",
                batch.probes.len(),
                batch.skipped.len()
            );

            let mut report = AuditPipeline::new(settings.analysis).run(&batch.probes);
            report.skipped.extend(batch.skipped);
            report.skipped.sort_by(|a, b| a.path.cmp(&b.path));

            let source = dirs.first().cloned().unwrap_or_default();
            write_reports(&report, &output, &source, analysis.json)
        }

        Commands::Analyze { input, output, analysis } => {
            let settings = analysis.settings()?;
            settings.validate()?;

            println!("=== Starting Analysis of {} ===", input.display());
            let content = std::fs::read_to_string(&input)?;
            let batch: Vec<RawProbe> = serde_json::from_str(&content)?;
            println!("Loaded {} raw probes", batch.len());

            let report = AuditPipeline::new(settings.analysis).run(&batch);
            write_reports(&report, &output, &input, analysis.json)
        }
    }
}

fn write_reports(report: &AuditReport, output: &Path, source: &Path, json: bool) -> Result<()> {
    print_summary(report);

    let run_dir: PathBuf =
        FileManager::new(output).create_run_directory(source, chrono::Local::now())?;
    let written = Reporter::new().generate_all(report, &run_dir, json)?;
    println!("\nReports saved to: {}", run_dir.display());
    for path in written {
        println!("  - {}", path.display());
    }

    println!("\n=== Audit Complete ===");
    Ok(())
}

fn print_summary(report: &AuditReport) {
    println!("\nAnalyzed files: {}", report.records.len());
    println!("Skipped files: {}", report.skipped.len());
    println!(
        "Recommended-value warnings: {}",
        report.records.iter().map(|r| r.evaluation_warnings().count()).sum::<usize>()
    );
    println!("\nBuckets:");
    for bucket in &report.buckets {
        println!(
            "  {}: {} files, {} outliers{}",
            bucket.bucket_key,
            bucket.total_records,
            bucket.outliers.len(),
            if bucket.statistics.low_confidence { " (small bucket)" } else { "" }
        );
    }

    let outliers: Vec<_> = report.outliers().collect();
    if !outliers.is_empty() {
        println!("\nOutliers:");
        for record in outliers {
            println!(
                "  {} [{}] ratio {}",
                record.file.path.display(),
                record.flags,
                record
                    .ratio_vs_bucket_median
                    .map(|r| format!("{:.2}x", r))
                    .unwrap_or_else(|| "n/a".into())
            );
        }
    }
}
