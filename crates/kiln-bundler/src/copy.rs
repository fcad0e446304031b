//! Static copy stage.
//!
//! Copies a vendor asset directory byte for byte into a sub-path of the
//! output root. No rule runs on these files, and nothing is ever deleted.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::output::writer::{normalize_dir, validate_output_path, write_file_atomic};
use crate::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub files: usize,
    pub bytes: u64,
    /// Files whose destination already had identical content.
    pub unchanged: usize,
}

#[derive(Debug, Clone)]
pub struct CopyStage {
    from: PathBuf,
    /// Output root.
    out_dir: PathBuf,
    /// Sub-path of the output root.
    to: String,
}

impl CopyStage {
    pub fn new(from: impl Into<PathBuf>, out_dir: impl Into<PathBuf>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            out_dir: out_dir.into(),
            to: to.into(),
        }
    }

    pub fn destination(&self) -> PathBuf {
        self.out_dir.join(&self.to)
    }

    pub fn run(&self) -> Result<CopyReport> {
        let failure = |path: &Path, reason: String| Error::CopyFailure {
            path: path.to_path_buf(),
            reason,
        };

        if !self.from.is_dir() {
            return Err(failure(&self.from, "source directory does not exist".to_string()));
        }

        let out_dir = normalize_dir(&self.out_dir)?;
        let mut report = CopyReport::default();

        for entry in WalkDir::new(&self.from).sort_by_file_name() {
            let entry = entry.map_err(|e| failure(&self.from, e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let rel = entry
                .path()
                .strip_prefix(&self.from)
                .map_err(|e| failure(entry.path(), e.to_string()))?;
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let target = validate_output_path(&out_dir, &format!("{}/{}", self.to, rel))?;

            let content = fs::read(entry.path()).map_err(|e| failure(entry.path(), e.to_string()))?;
            report.files += 1;
            report.bytes += content.len() as u64;

            if fs::read(&target).is_ok_and(|existing| existing == content) {
                report.unchanged += 1;
                continue;
            }
            write_file_atomic(&target, &content)
                .map_err(|e| failure(entry.path(), e.to_string()))?;
        }

        tracing::info!(
            from = %self.from.display(),
            to = %self.destination().display(),
            files = report.files,
            unchanged = report.unchanged,
            "copied static assets"
        );
        Ok(report)
    }
}
