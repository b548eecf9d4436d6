use std::path::{Path, PathBuf};
use std::process::Command;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use regex::Regex;
use serde_json::Value;
use crate::config::ScanConfig;
use crate::utils::parallel::ParallelProcessor;
use crate::video::normalize::RawProbe;
use crate::{AuditError, Result, SkipReason, SkippedFile};

/// Raw probes for every file found, plus the files that could not be probed.
#[derive(Debug, Default)]
pub struct ProbeBatch {
    pub probes: Vec<RawProbe>,
    pub skipped: Vec<SkippedFile>,
}

impl ProbeBatch {
    fn extend(&mut self, other: ProbeBatch) {
        self.probes.extend(other.probes);
        self.skipped.extend(other.skipped);
    }
}

/// Finds video files and runs ffprobe on them.
pub struct VideoProber {
    ffprobe_bin: PathBuf,
    extensions: Vec<String>,
    exclude: Vec<Regex>,
    threads: Option<usize>,
}

impl ParallelProcessor for VideoProber {}

impl VideoProber {
    pub fn new(config: &ScanConfig) -> Result<Self> {
        let exclude = config
            .exclude
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    AuditError::Config(format!("invalid exclude pattern '{}': {}", pattern, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            ffprobe_bin: config.ffprobe_bin.clone(),
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            exclude,
            threads: config.threads,
        })
    }

    pub fn probe_file(&self, path: impl AsRef<Path>) -> Result<RawProbe> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        let modified_at = metadata.modified().ok().map(DateTime::<Utc>::from);
        let output = self.run_ffprobe(path)?;
        Ok(RawProbe::from_ffprobe_output(path, metadata.len(), modified_at, &output))
    }

    fn run_ffprobe(&self, path: &Path) -> Result<Value> {
        let mut cmd = Command::new(&self.ffprobe_bin);
        cmd.args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path);
        log::debug!("Running command: {:?}", cmd);

        let output = cmd.output().map_err(|e| {
            AuditError::Probe(format!("failed to start {}: {}", self.ffprobe_bin.display(), e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuditError::Probe(format!(
                "exit code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }

    fn is_video(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.iter().any(|accepted| accepted.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let text = path.to_string_lossy();
        self.exclude.iter().any(|pattern| pattern.is_match(&text))
    }

    pub fn collect_video_files(&self, dir_path: &Path) -> Result<Vec<PathBuf>> {
        if !dir_path.is_dir() {
            return Err(AuditError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("'{}' is not a directory", dir_path.display()),
            )));
        }

        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir_path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    log::warn!("Error accessing entry: {}", err);
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|path| {
                if !self.is_video(path) {
                    log::debug!("Skipping non-video file: {}", path.display());
                    return false;
                }
                if self.is_excluded(path) {
                    log::info!("Excluded by pattern: {}", path.display());
                    return false;
                }
                true
            })
            .collect();

        files.sort();
        Ok(files)
    }

    pub fn process_directories(&self, dirs: &[impl AsRef<Path>]) -> Result<ProbeBatch> {
        Self::init_parallel_processing(self.threads);
        let mut batch = ProbeBatch::default();

        for dir in dirs {
            log::info!("Processing directory: {}", dir.as_ref().display());
            let found = self.process_directory(dir)?;
            log::info!(
                "Probed {} files in directory, {} skipped",
                found.probes.len(),
                found.skipped.len()
            );
            batch.extend(found);
        }

        log::info!("Total video files probed: {}", batch.probes.len());
        Ok(batch)
    }

    pub fn process_directory(&self, dir: impl AsRef<Path>) -> Result<ProbeBatch> {
        let dir_ref = dir.as_ref();
        let dir_path = std::fs::canonicalize(dir_ref).unwrap_or_else(|_| dir_ref.to_path_buf());

        log::info!("Scanning directory structure: {}", dir_path.display());
        let paths = self.collect_video_files(&dir_path)?;
        log::info!("Found {} potential video files", paths.len());

        if paths.is_empty() {
            return Ok(ProbeBatch::default());
        }

        let progress = Self::get_progress_counter("ffprobe", paths.len());
        let results: Vec<std::result::Result<RawProbe, SkippedFile>> = paths
            .par_iter()
            .map(|path| {
                let result = self.probe_file(path).map_err(|e| SkippedFile {
                    path: path.clone(),
                    reason: SkipReason::ProbeFailed(e.to_string()),
                });
                if let Ok(ref probe) = result {
                    log::debug!(
                        "Probed file: {} ({} bytes)",
                        probe.path.display(),
                        probe.size_bytes
                    );
                }
                progress.tick();
                result
            })
            .collect();

        let mut batch = ProbeBatch::default();
        for result in results {
            match result {
                Ok(probe) => batch.probes.push(probe),
                Err(skipped) => {
                    log::warn!("{}", skipped);
                    batch.skipped.push(skipped);
                }
            }
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn prober(exclude: &[&str]) -> VideoProber {
        VideoProber::new(&ScanConfig {
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            ffprobe_bin: PathBuf::from("/nonexistent/bin/ffprobe"),
            ..ScanConfig::default()
        })
        .unwrap()
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"not really a video").unwrap();
    }

    #[test]
    fn test_collects_videos_by_extension_and_exclusion() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("b.MKV"));
        touch(&root.join("a.mp4"));
        touch(&root.join("notes.txt"));
        touch(&root.join("nested/c.mov"));
        touch(&root.join("trash/d.mp4"));

        let files = prober(&["/trash/"]).collect_video_files(root).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["a.mp4", "b.MKV", "nested/c.mov"]);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = prober(&[]).collect_video_files(&dir.path().join("missing"));
        assert!(matches!(result, Err(AuditError::Io(_))));
    }

    #[test]
    fn test_probe_failures_become_skipped_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.mp4"));
        touch(&dir.path().join("b.mp4"));

        let batch = prober(&[]).process_directory(dir.path()).unwrap();
        assert!(batch.probes.is_empty());
        assert_eq!(batch.skipped.len(), 2);
        assert!(batch
            .skipped
            .iter()
            .all(|s| matches!(s.reason, SkipReason::ProbeFailed(_))));
    }

    #[test]
    fn test_invalid_exclude_pattern() {
        let config = ScanConfig { exclude: vec!["(".into()], ..ScanConfig::default() };
        assert!(matches!(VideoProber::new(&config), Err(AuditError::Config(_))));
    }
}
