//! Project file watcher.
//!
//! Watches the project root recursively and forwards changes to source files.
//! The output directory is always ignored so the vendor copy written by a
//! build never triggers the next one.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{CliError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Modified(PathBuf),
    Created(PathBuf),
    Removed(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Modified(p) | FileChange::Created(p) | FileChange::Removed(p) => p,
        }
    }
}

/// Which paths are worth a rebuild.
#[derive(Debug, Clone)]
pub struct WatchFilter {
    root: PathBuf,
    patterns: Vec<String>,
    ignored_dirs: Vec<PathBuf>,
}

impl WatchFilter {
    /// `patterns` are directory or file names (`node_modules`) or
    /// `*suffix` patterns (`*.map`), matched against every component of
    /// the path relative to `root`.
    pub fn new(root: PathBuf, patterns: Vec<String>) -> Self {
        Self {
            root,
            patterns,
            ignored_dirs: Vec::new(),
        }
    }

    pub fn ignore_dir(mut self, dir: PathBuf) -> Self {
        self.ignored_dirs.push(dir);
        self
    }

    pub fn should_ignore(&self, path: &Path) -> bool {
        let Ok(rel) = path.strip_prefix(&self.root) else {
            return true;
        };
        if self.ignored_dirs.iter().any(|dir| path.starts_with(dir)) {
            return true;
        }

        for component in rel.components() {
            let name = component.as_os_str().to_string_lossy();
            // Hidden files and directories (.git, editor swap files).
            if name.starts_with('.') && name != "." && name != ".." {
                return true;
            }
            for pattern in &self.patterns {
                let hit = match pattern.strip_prefix('*') {
                    Some(suffix) => name.ends_with(suffix),
                    None => *name == **pattern,
                };
                if hit {
                    return true;
                }
            }
        }

        // Atomic-write temp files.
        rel.to_string_lossy().ends_with(".tmp")
    }
}

pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    /// Start watching. Repeated events for one path inside `debounce_ms` are
    /// collapsed into one.
    pub fn new(filter: WatchFilter, debounce_ms: u64) -> Result<(Self, mpsc::Receiver<FileChange>)> {
        let root = filter.root.clone();
        if !root.exists() {
            return Err(CliError::FileNotFound(root));
        }

        let (tx, rx) = mpsc::channel(100);
        let debounce = Duration::from_millis(debounce_ms);
        let mut last_event: Option<(PathBuf, Instant)> = None;

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("watch error: {}", e);
                    return;
                }
            };
            for path in &event.paths {
                if filter.should_ignore(path) {
                    continue;
                }

                let now = Instant::now();
                if let Some((last_path, last_time)) = &last_event {
                    if last_path == path && now.duration_since(*last_time) < debounce {
                        continue;
                    }
                }
                last_event = Some((path.clone(), now));

                let change = match event.kind {
                    EventKind::Create(_) => FileChange::Created(path.clone()),
                    EventKind::Modify(_) => FileChange::Modified(path.clone()),
                    EventKind::Remove(_) => FileChange::Removed(path.clone()),
                    _ => continue,
                };
                // The receiver is gone once the server shuts down.
                let _ = tx.blocking_send(change);
            }
        })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;
        tracing::debug!(root = %root.display(), "watching for changes");

        Ok((
            Self {
                _watcher: watcher,
                root,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn filter() -> WatchFilter {
        WatchFilter::new(
            PathBuf::from("/project"),
            vec!["node_modules".into(), "*.map".into()],
        )
        .ignore_dir(PathBuf::from("/project/frontend/dist"))
    }

    #[test]
    fn test_ignores_named_directories() {
        let filter = filter();
        assert!(filter.should_ignore(Path::new("/project/node_modules/govuk-frontend/index.js")));
        assert!(filter.should_ignore(Path::new("/project/frontend/node_modules/x.js")));
        assert!(!filter.should_ignore(Path::new("/project/frontend/src/index.js")));
    }

    #[test]
    fn test_name_patterns_match_whole_components() {
        let filter = filter();
        assert!(!filter.should_ignore(Path::new("/project/src/node_modules_notes.js")));
    }

    #[test]
    fn test_ignores_suffix_patterns() {
        let filter = filter();
        assert!(filter.should_ignore(Path::new("/project/src/index.js.map")));
        assert!(!filter.should_ignore(Path::new("/project/src/index.js")));
    }

    #[test]
    fn test_ignores_output_dir_hidden_and_outside() {
        let filter = filter();
        assert!(filter.should_ignore(Path::new("/project/frontend/dist/govuk/logo.png")));
        assert!(filter.should_ignore(Path::new("/project/.git/HEAD")));
        assert!(filter.should_ignore(Path::new("/project/src/.index.js.swp")));
        assert!(filter.should_ignore(Path::new("/elsewhere/src/index.js")));
        assert!(filter.should_ignore(Path::new("/project/src/index.js.tmp")));
    }

    #[test]
    fn test_missing_root_is_error() {
        let dir = TempDir::new().unwrap();
        let filter = WatchFilter::new(dir.path().join("absent"), Vec::new());
        assert!(matches!(
            FileWatcher::new(filter, 100),
            Err(CliError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_watcher_starts_on_existing_root() {
        let dir = TempDir::new().unwrap();
        let filter = WatchFilter::new(dir.path().to_path_buf(), Vec::new());
        let (watcher, _rx) = FileWatcher::new(filter, 100).unwrap();
        assert_eq!(watcher.root(), dir.path());
    }
}
