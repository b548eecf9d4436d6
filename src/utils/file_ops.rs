use std::path::{Path, PathBuf};
use std::fs;
use chrono::{DateTime, Local};
use crate::Result;

/// Lays out report files under a base output directory.
pub struct FileManager {
    output_dir: PathBuf,
}

impl FileManager {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Creates `<output>/<source>_<YYYYmmdd_HHMM>/` for one audit run.
    pub fn create_run_directory(
        &self,
        source: impl AsRef<Path>,
        now: DateTime<Local>,
    ) -> Result<PathBuf> {
        let name = format!("{}_{}", sanitize_path(source.as_ref()), now.format("%Y%m%d_%H%M"));
        let run_dir = self.output_dir.join(name);
        self.ensure_directory(&run_dir)?;
        Ok(run_dir)
    }

    pub fn ensure_directory(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::create_dir_all(path.as_ref())?;
        Ok(())
    }
}

/// Flattens a path into a single file-name component.
pub fn sanitize_path(path: &Path) -> String {
    let text: String = path
        .to_string_lossy()
        .chars()
        .map(|c| if matches!(c, ':' | '\\' | '/') { '-' } else { c })
        .collect();
    let text = text.trim_matches('-');
    if text.is_empty() {
        "metricas".to_string()
    } else {
        text.to_string()
    }
}
