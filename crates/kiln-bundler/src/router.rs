//! Asset router: breadth-first traversal of the import graph.
//!
//! Starting from the declared entries, every reachable file is matched
//! against the frozen registry and run through its rule's chain. The
//! transforms of one layer run in parallel; their results are merged back in
//! discovery order so the resulting graph never depends on scheduling.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use path_clean::PathClean;
use rayon::prelude::*;
use rustc_hash::FxHashSet;

use crate::asset::{SourceAsset, relative_id};
use crate::rules::FrozenRegistry;
use crate::runtime::Runtime;
use crate::transform::{EmittedAsset, Payload, run_chain};
use crate::{Error, Result};

/// A file that went through a rule's chain.
#[derive(Debug, Clone)]
pub struct RoutedModule {
    /// Project-relative path, also the module id.
    pub id: String,
    pub path: PathBuf,
    pub rule: String,
    pub payload: Payload,
    /// Import specifier to module id, in import order. `None` when the
    /// target matched no rule and was skipped.
    pub deps: IndexMap<String, Option<String>>,
    pub emitted: Vec<EmittedAsset>,
    pub hot: bool,
    /// Original file content.
    pub source: Arc<[u8]>,
}

#[derive(Debug, Default)]
pub struct RoutedGraph {
    pub modules: IndexMap<String, RoutedModule>,
    /// Entry name to module id, in declaration order.
    pub entries: Vec<(String, String)>,
}

impl RoutedGraph {
    pub fn get(&self, id: &str) -> Option<&RoutedModule> {
        self.modules.get(id)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

struct Visit {
    path: PathBuf,
    entry: Option<String>,
}

struct Processed {
    module: RoutedModule,
    targets: Vec<PathBuf>,
}

pub struct Router {
    root: PathBuf,
    registry: FrozenRegistry,
    runtime: Arc<dyn Runtime>,
}

impl Router {
    pub fn new(root: impl Into<PathBuf>, registry: FrozenRegistry, runtime: Arc<dyn Runtime>) -> Self {
        Self {
            root: root.into(),
            registry,
            runtime,
        }
    }

    /// Route everything reachable from `entries` (name, path relative to the root).
    pub fn route(&self, entries: &[(String, PathBuf)]) -> Result<RoutedGraph> {
        let mut graph = RoutedGraph::default();
        let mut visited: FxHashSet<PathBuf> = FxHashSet::default();
        let mut layer = Vec::new();

        for (name, path) in entries {
            let path = self.canonical_entry(path)?;
            graph
                .entries
                .push((name.clone(), relative_id(&self.root, &path)));
            if visited.insert(path.clone()) {
                layer.push(Visit {
                    path,
                    entry: Some(name.clone()),
                });
            }
        }

        let mut depth = 0usize;
        while !layer.is_empty() {
            let results: Vec<Result<Option<Processed>>> =
                layer.par_iter().map(|visit| self.process(visit)).collect();

            let mut next = Vec::new();
            for result in results {
                let Some(processed) = result? else {
                    continue;
                };
                for target in processed.targets {
                    if visited.insert(target.clone()) {
                        next.push(Visit {
                            path: target,
                            entry: None,
                        });
                    }
                }
                graph
                    .modules
                    .insert(processed.module.id.clone(), processed.module);
            }

            tracing::debug!(depth, modules = graph.modules.len(), "routed layer");
            depth += 1;
            layer = next;
        }

        // Targets that matched no rule were skipped; drop their ids.
        let known: FxHashSet<String> = graph.modules.keys().cloned().collect();
        for module in graph.modules.values_mut() {
            for target in module.deps.values_mut() {
                if target.as_ref().is_some_and(|id| !known.contains(id)) {
                    *target = None;
                }
            }
        }

        Ok(graph)
    }

    fn canonical_entry(&self, path: &Path) -> Result<PathBuf> {
        let joined = self.root.join(path).clean();
        std::fs::canonicalize(&joined).map_err(|e| Error::UnreadableSource {
            path: joined,
            reason: e.to_string(),
        })
    }

    fn process(&self, visit: &Visit) -> Result<Option<Processed>> {
        let path = &visit.path;
        let rel = relative_id(&self.root, path);

        let Some(rule) = self.registry.match_path(&rel) else {
            return match &visit.entry {
                Some(entry) => Err(Error::UnmatchedEntry {
                    entry: entry.clone(),
                    path: path.clone(),
                }),
                None => {
                    tracing::debug!(path = %rel, "no rule matches, skipping");
                    Ok(None)
                }
            };
        };

        let content = self
            .runtime
            .read_file(path)
            .map_err(|e| Error::UnreadableSource {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        let asset = SourceAsset::new(path.clone(), rel.clone(), content);

        let failure = |stage: &str, message: String| Error::TransformFailure {
            path: path.clone(),
            rule: rule.id.clone(),
            stage: stage.to_string(),
            message,
        };

        let (payload, imports, emitted, hot) =
            run_chain(rule.chain.stages(), &asset, &rule.id, &rule.options)
                .map_err(|(stage, e)| failure(&stage, format!("{:#}", e)))?;

        match &payload {
            Payload::Bytes(_) => {
                return Err(failure(
                    "link",
                    "chain ended without producing a script, stylesheet or url".to_string(),
                ));
            }
            Payload::Style(style) if style.sink.is_none() => {
                return Err(failure("link", "stylesheet chain has no sink stage".to_string()));
            }
            _ => {}
        }

        let resolved: Vec<(String, PathBuf)> = imports
            .par_iter()
            .map(|import| {
                self.runtime
                    .resolve(&import.specifier, path, import.kind)
                    .map(|target| (import.specifier.clone(), target.clean()))
                    .map_err(|e| Error::UnresolvedImport {
                        specifier: import.specifier.clone(),
                        importer: path.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<_>>()?;

        let deps = resolved
            .iter()
            .map(|(spec, target)| (spec.clone(), Some(relative_id(&self.root, target))))
            .collect();
        let targets = resolved.into_iter().map(|(_, target)| target).collect();

        tracing::debug!(
            path = %rel,
            rule = %rule.id,
            payload = payload.kind_name(),
            imports = imports.len(),
            hot,
            "routed module"
        );

        Ok(Some(Processed {
            module: RoutedModule {
                id: rel,
                path: path.clone(),
                rule: rule.id.clone(),
                payload,
                deps,
                emitted,
                hot,
                source: asset.content.clone(),
            },
            targets,
        }))
    }
}
