use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use super::BuildOutput;
use crate::Result;

/// Destination for committed builds.
pub trait OutputSink: Send + Sync {
    fn commit(&self, output: Arc<BuildOutput>) -> Result<()>;
}

/// Writes every committed build under a directory.
#[derive(Debug, Clone)]
pub struct DiskSink {
    dir: PathBuf,
}

impl DiskSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl OutputSink for DiskSink {
    fn commit(&self, output: Arc<BuildOutput>) -> Result<()> {
        output.write_to(&self.dir)?;
        tracing::debug!(
            dir = %self.dir.display(),
            files = output.files.len(),
            "wrote build to disk"
        );
        Ok(())
    }
}

/// Holds the latest committed build in memory. Readers take an `Arc`
/// snapshot; a later commit never changes a snapshot already taken.
#[derive(Debug, Default)]
pub struct MemorySink {
    current: RwLock<Option<Arc<BuildOutput>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<Arc<BuildOutput>> {
        self.current.read().clone()
    }
}

impl OutputSink for MemorySink {
    fn commit(&self, output: Arc<BuildOutput>) -> Result<()> {
        let mut current = self.current.write();
        // Generations only move forward.
        if current
            .as_ref()
            .is_some_and(|c| c.manifest.generation > output.manifest.generation)
        {
            tracing::debug!(
                generation = output.manifest.generation.0,
                "ignoring commit of an older generation"
            );
            return Ok(());
        }
        *current = Some(output);
        Ok(())
    }
}
