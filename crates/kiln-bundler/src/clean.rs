//! Clean stage: remove previously emitted output.
//!
//! Files under the output root matching the clean patterns are removed unless
//! they match a preserve pattern. Patterns are gitignore-style globs relative
//! to the output root. Directories left empty afterwards are removed too; the
//! root itself is kept.

use std::fs;
use std::path::{Path, PathBuf};

use ignore::overrides::{Override, OverrideBuilder};
use walkdir::WalkDir;

use crate::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub removed_files: usize,
    pub removed_dirs: usize,
    pub preserved: usize,
}

#[derive(Debug, Clone)]
pub struct CleanStage {
    root: PathBuf,
    patterns: Vec<String>,
    preserve: Vec<String>,
}

impl CleanStage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            patterns: vec!["**/*".to_string()],
            preserve: vec![".gitkeep".to_string()],
        }
    }

    pub fn patterns(mut self, patterns: Vec<String>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn preserve(mut self, preserve: Vec<String>) -> Self {
        self.preserve = preserve;
        self
    }

    fn build_matcher(&self, globs: &[String]) -> Result<Override> {
        let mut builder = OverrideBuilder::new(&self.root);
        for glob in globs {
            builder
                .add(glob)
                .map_err(|e| Error::InvalidConfig(format!("invalid clean pattern '{}': {}", glob, e)))?;
        }
        builder
            .build()
            .map_err(|e| Error::InvalidConfig(format!("invalid clean patterns: {}", e)))
    }

    pub fn run(&self) -> Result<CleanReport> {
        let mut report = CleanReport::default();
        if !self.root.exists() {
            tracing::debug!(root = %self.root.display(), "nothing to clean");
            return Ok(report);
        }

        let remove = self.build_matcher(&self.patterns)?;
        let keep = self.build_matcher(&self.preserve)?;
        let failure = |path: &Path, e: std::io::Error| Error::CleanFailure {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = entry.map_err(|e| Error::CleanFailure {
                path: self.root.clone(),
                reason: e.to_string(),
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let path = entry.path();
            if keep.matched(path, false).is_whitelist() {
                report.preserved += 1;
                continue;
            }
            if remove.matched(path, false).is_whitelist() {
                fs::remove_file(path).map_err(|e| failure(path, e))?;
                report.removed_files += 1;
            }
        }

        // Deepest first so parents are empty by the time they are visited.
        for entry in WalkDir::new(&self.root).min_depth(1).contents_first(true) {
            let Ok(entry) = entry else { continue };
            if entry.file_type().is_dir() && is_empty_dir(entry.path()) {
                fs::remove_dir(entry.path()).map_err(|e| failure(entry.path(), e))?;
                report.removed_dirs += 1;
            }
        }

        tracing::info!(
            root = %self.root.display(),
            removed = report.removed_files,
            preserved = report.preserved,
            "cleaned output"
        );
        Ok(report)
    }
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populate(root: &Path) {
        fs::create_dir_all(root.join("govuk/fonts")).unwrap();
        fs::write(root.join("index.js"), "js").unwrap();
        fs::write(root.join("index.js.map"), "{}").unwrap();
        fs::write(root.join("govuk/fonts/bold.woff2"), "font").unwrap();
        fs::write(root.join(".gitkeep"), "").unwrap();
    }

    #[test]
    fn removes_everything_but_preserved() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("dist");
        populate(&root);

        let report = CleanStage::new(&root).run().unwrap();
        assert_eq!(report.removed_files, 3);
        assert_eq!(report.preserved, 1);
        assert!(root.join(".gitkeep").exists());
        assert!(!root.join("index.js").exists());
        assert!(!root.join("govuk").exists());
    }

    #[test]
    fn clean_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("dist");
        populate(&root);

        let stage = CleanStage::new(&root);
        stage.run().unwrap();
        let second = stage.run().unwrap();
        assert_eq!(second.removed_files, 0);
        assert_eq!(second.removed_dirs, 0);
        assert!(root.join(".gitkeep").exists());
    }

    #[test]
    fn missing_root_is_noop() {
        let dir = TempDir::new().unwrap();
        let report = CleanStage::new(dir.path().join("absent")).run().unwrap();
        assert_eq!(report, CleanReport::default());
    }

    #[test]
    fn patterns_limit_what_is_removed() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("dist");
        populate(&root);

        CleanStage::new(&root)
            .patterns(vec!["*.map".to_string()])
            .run()
            .unwrap();
        assert!(root.join("index.js").exists());
        assert!(!root.join("index.js.map").exists());
    }

    #[test]
    fn invalid_pattern_is_config_error() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path()).unwrap();
        let err = CleanStage::new(dir.path())
            .patterns(vec!["a[".to_string()])
            .run()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
