//! Error types for the kiln CLI.
//!
//! `CliError` is what commands return. Configuration problems arrive as
//! [`kiln_config::ConfigError`], pipeline failures as [`BuildError`]; both
//! convert automatically. At the process boundary everything is rendered
//! through miette by [`cli_error_to_miette`].
//!
//! ```rust,no_run
//! use kiln_cli::error::{Result, ResultExt};
//! use std::path::Path;
//!
//! fn read_entry(path: &Path) -> Result<String> {
//!     std::fs::read_to_string(path)
//!         .with_path(path)
//!         .with_hint("Entries are resolved relative to --cwd")
//! }
//! ```

use std::path::PathBuf;

use thiserror::Error;

mod diagnostic;

pub use diagnostic::cli_error_to_miette;
pub use kiln_config::ConfigError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {0}")]
    Server(String),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Custom(String),
}

/// Failures of a build pass.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The pipeline rejected the build.
    #[error(transparent)]
    Pipeline(#[from] kiln_bundler::Error),

    #[error("Output directory is not writable: {}\n\nHint: Check directory permissions or pass a different --out-dir", .0.display())]
    OutputNotWritable(PathBuf),

    /// The blocking build task died.
    #[error("build task failed: {0}")]
    Task(String),
}

impl From<kiln_bundler::Error> for CliError {
    fn from(err: kiln_bundler::Error) -> Self {
        CliError::Build(BuildError::Pipeline(err))
    }
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Attach context to any error that converts into [`CliError`].
pub trait ResultExt<T> {
    /// Turn a not-found I/O error into [`CliError::FileNotFound`] for `path`.
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T>;

    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T>;

    fn context(self, msg: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<CliError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T> {
        self.map_err(|e| match e.into() {
            CliError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                CliError::FileNotFound(path.as_ref().to_path_buf())
            }
            other => other,
        })
    }

    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| CliError::Custom(format!("{}\n\nHint: {}", e.into(), hint)))
    }

    fn context(self, msg: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| CliError::Custom(format!("{}: {}", msg, e.into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundler_errors_become_build_errors() {
        let err: CliError = kiln_bundler::Error::InvalidConfig("no entries configured".into()).into();
        assert!(matches!(err, CliError::Build(BuildError::Pipeline(_))));
        assert!(err.to_string().contains("no entries configured"));
    }

    #[test]
    fn config_errors_convert() {
        let err: CliError = ConfigError::NoEntries.into();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn with_path_maps_not_found() {
        let result: std::io::Result<()> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = result.with_path("kiln.toml").unwrap_err();
        assert!(matches!(err, CliError::FileNotFound(p) if p == PathBuf::from("kiln.toml")));
    }

    #[test]
    fn with_hint_appends_hint() {
        let result: std::result::Result<(), ConfigError> = Err(ConfigError::NoEntries);
        let msg = result.with_hint("add [build.entries]").unwrap_err().to_string();
        assert!(msg.contains("no entries specified"));
        assert!(msg.contains("Hint: add [build.entries]"));
    }

    #[test]
    fn context_prefixes_message() {
        let result: std::result::Result<(), ConfigError> = Err(ConfigError::NoEntries);
        let msg = result.context("loading kiln.toml").unwrap_err().to_string();
        assert!(msg.starts_with("loading kiln.toml: "));
    }

    #[test]
    fn output_not_writable_has_hint() {
        let msg = BuildError::OutputNotWritable(PathBuf::from("/dist")).to_string();
        assert!(msg.contains("/dist"));
        assert!(msg.contains("Hint:"));
    }
}
