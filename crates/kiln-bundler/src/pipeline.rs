//! One build pass: clean, freeze the registry, route and copy, link.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use path_clean::PathClean;

use crate::clean::CleanStage;
use crate::copy::{CopyReport, CopyStage};
use crate::manifest::Generation;
use crate::output::{BuildOutput, LinkOptions, OutputSink, link};
use crate::profile::{self, Mode, ModeProfile, ServeContext};
use crate::router::Router;
use crate::rules::default_registry;
use crate::runtime::{NativeRuntime, Runtime};
use crate::{Error, Result};

/// When the clean stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanPolicy {
    /// Before every generation.
    #[default]
    EveryBuild,
    /// Before the first generation of this pipeline only.
    OncePerProcess,
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyConfig {
    /// Source directory, relative to the project root.
    pub from: PathBuf,
    /// Sub-path of the output root.
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanConfig {
    pub patterns: Vec<String>,
    pub preserve: Vec<String>,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            patterns: vec!["**/*".to_string()],
            preserve: vec![".gitkeep".to_string()],
        }
    }
}

/// Build inputs, independent of mode.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub root: PathBuf,
    /// Output root, relative to `root` unless absolute.
    pub out_dir: PathBuf,
    /// Entry name to source path, in declaration order.
    pub entries: Vec<(String, PathBuf)>,
    pub library: Option<String>,
    pub public_path: String,
    pub inline_limit: u64,
    pub sourcemap: bool,
    pub manifest: bool,
    pub extensions: Vec<String>,
    pub copy: Option<CopyConfig>,
    pub clean: Option<CleanConfig>,
    pub clean_policy: CleanPolicy,
}

impl PipelineConfig {
    pub fn new(root: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            out_dir: out_dir.into(),
            entries: Vec::new(),
            library: None,
            public_path: "/".to_string(),
            inline_limit: 10 * 1024,
            sourcemap: true,
            manifest: false,
            extensions: vec![".js".to_string(), ".json".to_string()],
            copy: None,
            clean: Some(CleanConfig::default()),
            clean_policy: CleanPolicy::default(),
        }
    }

    pub fn entry(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.entries.push((name.into(), path.into()));
        self
    }

    pub fn library(mut self, name: impl Into<String>) -> Self {
        self.library = Some(name.into());
        self
    }

    pub fn public_path(mut self, path: impl Into<String>) -> Self {
        self.public_path = path.into();
        self
    }

    pub fn inline_limit(mut self, limit: u64) -> Self {
        self.inline_limit = limit;
        self
    }

    pub fn sourcemap(mut self, enabled: bool) -> Self {
        self.sourcemap = enabled;
        self
    }

    pub fn manifest(mut self, enabled: bool) -> Self {
        self.manifest = enabled;
        self
    }

    pub fn extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn copy(mut self, from: impl Into<PathBuf>, to: impl Into<String>) -> Self {
        self.copy = Some(CopyConfig {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    pub fn clean(mut self, clean: Option<CleanConfig>) -> Self {
        self.clean = clean;
        self
    }

    pub fn clean_policy(mut self, policy: CleanPolicy) -> Self {
        self.clean_policy = policy;
        self
    }
}

/// Runs generations of one build configuration.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    profile: ModeProfile,
    mode: Mode,
    context: ServeContext,
    runtime: Arc<dyn Runtime>,
    out_dir: PathBuf,
    generation: AtomicU64,
    cleaned: AtomicBool,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, mode: Mode, context: ServeContext) -> Self {
        let runtime = Arc::new(NativeRuntime::new(&config.extensions));
        Self::with_runtime(config, mode, context, runtime)
    }

    pub fn with_runtime(
        config: PipelineConfig,
        mode: Mode,
        context: ServeContext,
        runtime: Arc<dyn Runtime>,
    ) -> Self {
        let out_dir = config.root.join(&config.out_dir).clean();
        Self {
            profile: ModeProfile::select(mode, context),
            config,
            mode,
            context,
            runtime,
            out_dir,
            generation: AtomicU64::new(0),
            cleaned: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn profile(&self) -> ModeProfile {
        self.profile
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Last generation number handed out (0 before the first build).
    pub fn generation(&self) -> Generation {
        Generation(self.generation.load(Ordering::SeqCst))
    }

    /// Run one generation. Nothing but the clean and copy stages touches the
    /// disk; the caller commits the returned output to a sink.
    pub fn build(&self) -> Result<BuildOutput> {
        let generation = Generation(self.generation.fetch_add(1, Ordering::SeqCst) + 1);
        tracing::info!(
            generation = generation.0,
            profile = self.profile.name(),
            "starting build"
        );

        if self.config.entries.is_empty() {
            return Err(Error::InvalidConfig("no entries configured".to_string()));
        }

        let root = std::fs::canonicalize(&self.config.root).map_err(|e| Error::UnreadableSource {
            path: self.config.root.clone(),
            reason: e.to_string(),
        })?;

        check_out_dir(&root, &self.config)?;
        self.clean()?;

        let registry = profile::select(
            default_registry(self.config.inline_limit, self.config.sourcemap)?,
            self.mode,
            self.context,
        )?;
        let router = Router::new(&root, registry, Arc::clone(&self.runtime));

        let (graph, copied) = thread::scope(|scope| {
            let copy = self.config.copy.as_ref().map(|copy| {
                let from = root.join(&copy.from);
                let stage = CopyStage::new(from, &self.out_dir, copy.to.clone());
                scope.spawn(move || stage.run())
            });
            let graph = router.route(&self.config.entries);
            let copied = match copy {
                Some(handle) => Some(handle.join().map_err(|_| Error::CopyFailure {
                    path: self.out_dir.clone(),
                    reason: "copy thread panicked".to_string(),
                })),
                None => None,
            };
            (graph, copied)
        });
        let graph = graph?;
        if let Some(copied) = copied {
            let report: CopyReport = copied??;
            tracing::debug!(files = report.files, "copy stage finished");
        }

        let options = LinkOptions {
            library: self.config.library.clone(),
            public_path: self.profile.public_path(&self.config.public_path),
            hot: matches!(self.profile, ModeProfile::DevelopmentWithServer { hot: true }),
            source_map: self.config.sourcemap,
            manifest: self.config.manifest,
            mode: self.profile.name().to_string(),
        };
        link(&graph, &options, generation)
    }

    /// Build and commit to `sink`.
    pub fn build_into(&self, sink: &dyn OutputSink) -> Result<Arc<BuildOutput>> {
        let output = Arc::new(self.build()?);
        sink.commit(Arc::clone(&output))?;
        Ok(output)
    }

    fn clean(&self) -> Result<()> {
        let Some(clean) = &self.config.clean else {
            return Ok(());
        };
        let run = match self.config.clean_policy {
            CleanPolicy::EveryBuild => true,
            CleanPolicy::OncePerProcess => !self.cleaned.swap(true, Ordering::SeqCst),
            CleanPolicy::Never => false,
        };
        if !run {
            tracing::debug!("skipping clean");
            return Ok(());
        }
        CleanStage::new(&self.out_dir)
            .patterns(clean.patterns.clone())
            .preserve(clean.preserve.clone())
            .run()?;
        Ok(())
    }
}

/// The clean stage deletes under the output root, so it must sit strictly
/// inside the project root and must not overlap an entry or the copy source.
fn check_out_dir(root: &Path, config: &PipelineConfig) -> Result<()> {
    let out = root.join(&config.out_dir).clean();
    let reject = |reason: String| {
        Err(Error::InvalidConfig(format!(
            "output directory {} {}",
            out.display(),
            reason
        )))
    };

    if out == root || !out.starts_with(root) {
        return reject(format!("must be a subdirectory of {}", root.display()));
    }
    for (name, path) in &config.entries {
        if root.join(path).clean().starts_with(&out) {
            return reject(format!("contains entry '{}'", name));
        }
    }
    if let Some(copy) = &config.copy {
        let from = root.join(&copy.from).clean();
        if from.starts_with(&out) || out.starts_with(&from) {
            return reject(format!("overlaps the copy source {}", from.display()));
        }
    }
    Ok(())
}
