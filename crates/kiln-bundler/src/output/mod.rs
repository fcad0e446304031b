//! Linked build output and the sinks it is committed to.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;

use crate::Result;
use crate::manifest::{ArtifactKind, BuildManifest};

mod linker;
mod sink;
pub mod writer;

pub use linker::{HOT_EVENTS_PATH, LinkOptions, link};
pub use sink::{DiskSink, MemorySink, OutputSink};

/// A file produced by a build, named relative to the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub name: String,
    pub kind: ArtifactKind,
    pub content: Arc<[u8]>,
    pub digest: String,
}

/// Factory of a hot-reloadable module, as pushed to connected pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HotModule {
    pub code: Arc<str>,
    pub deps: IndexMap<String, Option<String>>,
    #[serde(skip)]
    pub digest: String,
}

/// What changed between two committed builds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutputDiff {
    /// Files added, removed or changed.
    pub artifacts: Vec<String>,
    /// Hot modules added or changed.
    pub modules: Vec<String>,
}

impl OutputDiff {
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty() && self.modules.is_empty()
    }
}

/// Everything one generation produced. Immutable once committed.
#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    pub manifest: BuildManifest,
    pub files: BTreeMap<String, OutputFile>,
    pub hot_modules: BTreeMap<String, HotModule>,
}

impl BuildOutput {
    pub fn file(&self, name: &str) -> Option<&OutputFile> {
        self.files.get(name)
    }

    pub fn total_size(&self) -> u64 {
        self.files.values().map(|f| f.content.len() as u64).sum()
    }

    /// Write every file under `dir` in one atomic batch.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        let files: Vec<(&str, &[u8])> = self
            .files
            .values()
            .map(|f| (f.name.as_str(), &*f.content))
            .collect();
        writer::write_files(dir, &files)
    }

    /// Compare with the previously committed output by digest.
    pub fn diff(&self, previous: &BuildOutput) -> OutputDiff {
        let mut artifacts: Vec<String> = self
            .files
            .values()
            .filter(|f| previous.files.get(&f.name).is_none_or(|p| p.digest != f.digest))
            .map(|f| f.name.clone())
            .collect();
        artifacts.extend(
            previous
                .files
                .keys()
                .filter(|name| !self.files.contains_key(*name))
                .cloned(),
        );
        artifacts.sort();

        let modules = self
            .hot_modules
            .iter()
            .filter(|(id, m)| previous.hot_modules.get(*id).is_none_or(|p| p.digest != m.digest))
            .map(|(id, _)| id.clone())
            .collect();

        OutputDiff { artifacts, modules }
    }
}
