//! # kiln-bundler
//!
//! Rule-driven static asset pipeline. Source files reachable from a set of
//! named entries are routed through an ordered registry of transform rules,
//! linked into one script bundle per entry (plus an extracted stylesheet in
//! production), and committed as a numbered build with a manifest.
//!
//! ## Quick Start
//!
//! ```no_run
//! use kiln_bundler::{Mode, Pipeline, PipelineConfig, ServeContext};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::new(".", "frontend/dist")
//!     .entry("index", "frontend/src/index.js")
//!     .entry("style", "frontend/src/index.scss")
//!     .library("NSCR");
//!
//! let pipeline = Pipeline::new(config, Mode::Production, ServeContext::Build);
//! let output = pipeline.build()?;
//! output.write_to(pipeline.out_dir())?;
//!
//! for (entry, artifacts) in &output.manifest.entries {
//!     println!("{entry}: {} artifacts", artifacts.len());
//! }
//! # Ok(()) }
//! ```

pub mod asset;
pub mod clean;
pub mod copy;
pub mod manifest;
pub mod output;
pub mod pipeline;
pub mod profile;
pub mod router;
pub mod rules;
pub mod runtime;
pub mod transform;

pub use asset::{AssetClass, SourceAsset};
pub use clean::{CleanReport, CleanStage};
pub use copy::{CopyReport, CopyStage};
pub use manifest::{ArtifactKind, BuildManifest, Generation, OutputArtifact, Placement};
pub use output::{
    BuildOutput, DiskSink, HOT_EVENTS_PATH, HotModule, LinkOptions, MemorySink, OutputDiff, OutputFile,
    OutputSink,
};
pub use pipeline::{CleanConfig, CleanPolicy, CopyConfig, Pipeline, PipelineConfig};
pub use profile::{Mode, ModeProfile, PublicPath, RuleOverride, ServeContext};
pub use router::{Router, RoutedGraph, RoutedModule};
pub use rules::{
    FrozenRegistry, OptionsPatch, RuleOptions, RuleRegistry, StyleSink, TransformChain, TransformRule,
};
pub use runtime::{ImportKind, NativeRuntime, Runtime, RuntimeError};
pub use transform::{Payload, Transform, TransformContext};

use std::path::PathBuf;

/// Error types for kiln-bundler operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A source file could not be read.
    #[error("unreadable source {}: {reason}", .path.display())]
    UnreadableSource { path: PathBuf, reason: String },

    /// A declared entry point matched no transform rule.
    #[error("entry '{entry}' ({}) does not match any transform rule", .path.display())]
    UnmatchedEntry { entry: String, path: PathBuf },

    /// An import specifier could not be resolved to a file.
    #[error("cannot resolve '{specifier}' imported from {}: {reason}", .importer.display())]
    UnresolvedImport {
        specifier: String,
        importer: PathBuf,
        reason: String,
    },

    /// A transform stage reported an error.
    #[error("transform failed for {} (rule '{rule}', stage '{stage}'): {message}", .path.display())]
    TransformFailure {
        path: PathBuf,
        rule: String,
        stage: String,
        message: String,
    },

    /// The static copy stage failed.
    #[error("copy failed for {}: {reason}", .path.display())]
    CopyFailure { path: PathBuf, reason: String },

    /// The clean stage failed to remove a file.
    #[error("clean failed for {}: {reason}", .path.display())]
    CleanFailure { path: PathBuf, reason: String },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid output path (e.g., directory traversal attempt).
    #[error("Invalid output path: {0}")]
    InvalidOutputPath(String),

    /// File write operation failed.
    #[error("Write failure: {0}")]
    WriteFailure(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for kiln-bundler operations.
pub type Result<T> = std::result::Result<T, Error>;

impl miette::Diagnostic for Error {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        Some(Box::new(match self {
            Error::UnreadableSource { .. } => "kiln::unreadable_source",
            Error::UnmatchedEntry { .. } => "kiln::unmatched_entry",
            Error::UnresolvedImport { .. } => "kiln::unresolved_import",
            Error::TransformFailure { .. } => "kiln::transform_failure",
            Error::CopyFailure { .. } => "kiln::copy_failure",
            Error::CleanFailure { .. } => "kiln::clean_failure",
            Error::InvalidConfig(_) => "kiln::invalid_config",
            Error::InvalidOutputPath(_) => "kiln::invalid_output_path",
            Error::WriteFailure(_) => "kiln::write_failure",
            Error::Io(_) => "kiln::io",
        }))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            Error::UnmatchedEntry { path, .. } => Some(Box::new(format!(
                "No rule handles '{}'. Entries must be scripts, stylesheets or JSON.",
                path.display()
            ))),
            Error::UnresolvedImport { specifier, .. } => Some(Box::new(format!(
                "Check that '{}' exists. Bare script specifiers are looked up in node_modules; stylesheet and url() references are looked up next to the importing file first.",
                specifier
            ))),
            Error::CopyFailure { .. } => Some(Box::new(
                "Check that the [copy] source directory exists (is the vendor package installed?)",
            )),
            Error::InvalidOutputPath(path) => Some(Box::new(format!(
                "The output path '{}' is invalid. Ensure it's within the output directory and doesn't contain '..' components.",
                path
            ))),
            Error::WriteFailure(_) => Some(Box::new(
                "Failed to write file. Check disk space and permissions.",
            )),
            _ => None,
        }
    }
}
