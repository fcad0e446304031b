//! Build manifests.
//!
//! A manifest maps each entry name to the artifacts that make it up. It is
//! assembled while a build runs and committed as a whole once linking
//! succeeds; nothing observes a half-built manifest.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one complete build pass. Strictly increasing within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Script,
    Stylesheet,
    SourceMap,
    /// An image or font referenced by a script or stylesheet.
    Asset,
}

/// Where an artifact's content lives.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Placement {
    /// Embedded in another artifact (a data URI, or CSS injected by a bundle).
    Inline { within: String },
    EmittedFile { file: String },
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputArtifact {
    /// Logical name: the output file name for emitted files, the source
    /// path for inlined content.
    pub name: String,
    pub kind: ArtifactKind,
    pub placement: Placement,
    pub size: u64,
    /// SHA-256 of the artifact bytes, lowercase hex.
    pub digest: String,
}

impl OutputArtifact {
    pub fn is_emitted(&self) -> bool {
        matches!(self.placement, Placement::EmittedFile { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    pub generation: Generation,
    pub mode: String,
    /// Entry name to its artifacts, sorted.
    pub entries: BTreeMap<String, Vec<OutputArtifact>>,
}

impl BuildManifest {
    pub fn artifacts(&self) -> impl Iterator<Item = (&str, &OutputArtifact)> {
        self.entries
            .iter()
            .flat_map(|(entry, list)| list.iter().map(move |a| (entry.as_str(), a)))
    }

    /// Emitted files across all entries, deduplicated by name.
    pub fn emitted_files(&self) -> Vec<&OutputArtifact> {
        let mut seen = BTreeMap::new();
        for (_, artifact) in self.artifacts() {
            if let Placement::EmittedFile { file } = &artifact.placement {
                seen.entry(file.as_str()).or_insert(artifact);
            }
        }
        seen.into_values().collect()
    }

    /// Same content regardless of generation.
    pub fn same_content(&self, other: &BuildManifest) -> bool {
        self.mode == other.mode && self.entries == other.entries
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Collects artifacts per entry while a build runs.
#[derive(Debug, Default)]
pub(crate) struct ManifestBuilder {
    entries: BTreeMap<String, Vec<OutputArtifact>>,
}

impl ManifestBuilder {
    pub fn push(&mut self, entry: &str, artifact: OutputArtifact) {
        let list = self.entries.entry(entry.to_string()).or_default();
        if !list.contains(&artifact) {
            list.push(artifact);
        }
    }

    pub fn commit(mut self, generation: Generation, mode: &str) -> BuildManifest {
        for list in self.entries.values_mut() {
            list.sort();
        }
        BuildManifest {
            generation,
            mode: mode.to_string(),
            entries: self.entries,
        }
    }
}
