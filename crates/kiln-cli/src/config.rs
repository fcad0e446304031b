//! Turn command-line arguments into a validated configuration and a
//! pipeline configuration.
//!
//! Layering (lowest to highest): defaults, `kiln.toml` or `package.json#kiln`,
//! `KILN_` environment variables, command-line flags.

use std::path::{Path, PathBuf};

use kiln_bundler::{CleanConfig, CleanPolicy, PipelineConfig};
use kiln_config::{
    BuildOverrides, ConfigDiscovery, ConfigOverrides, DevOverrides, KilnConfig,
};

use crate::cli::{BuildArgs, ProjectArgs, ServeArgs};
use crate::error::{CliError, Result};

/// Resolve `--cwd` against the process working directory.
pub fn project_root(project: &ProjectArgs) -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    let root = match &project.cwd {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => cwd.join(dir),
        None => cwd,
    };
    if !root.is_dir() {
        return Err(CliError::FileNotFound(root));
    }
    // Watcher events carry canonical paths.
    Ok(std::fs::canonicalize(&root)?)
}

pub fn build_overrides(args: &BuildArgs) -> ConfigOverrides {
    ConfigOverrides {
        build: BuildOverrides {
            entries: args.entries.iter().cloned().collect(),
            out_dir: args.out_dir.clone(),
            inline_limit: args.inline_limit,
            sourcemap: args.no_sourcemap.then_some(false),
            ..BuildOverrides::default()
        },
        dev: DevOverrides::default(),
    }
}

pub fn serve_overrides(args: &ServeArgs) -> ConfigOverrides {
    ConfigOverrides {
        build: BuildOverrides::default(),
        dev: DevOverrides {
            host: args.host.clone(),
            port: args.port,
            cors: args.no_cors.then_some(false),
            hot: args.no_hot.then_some(false),
        },
    }
}

/// Load every layer and validate the result against the project root.
pub fn load(root: &Path, project: &ProjectArgs, overrides: &ConfigOverrides) -> Result<KilnConfig> {
    let config = ConfigDiscovery::new(root).load(project.config.as_deref(), overrides)?;
    config.validate()?;
    config.validate_fs(root)?;
    tracing::debug!(
        entries = config.build.entries.len(),
        out_dir = %config.build.out_dir.display(),
        "configuration loaded"
    );
    Ok(config)
}

/// Pipeline inputs for `config`. `public_path` is the batch public path for
/// `build` and the dev mount point for `serve`.
pub fn pipeline_config(
    config: &KilnConfig,
    root: &Path,
    public_path: &str,
    clean_policy: CleanPolicy,
) -> PipelineConfig {
    let build = &config.build;
    let mut pipeline = PipelineConfig::new(root, &build.out_dir)
        .public_path(public_path)
        .inline_limit(build.inline_limit)
        .sourcemap(build.sourcemap)
        .manifest(build.manifest)
        .extensions(build.extensions.clone())
        .clean_policy(clean_policy)
        .clean(config.clean.enabled.then(|| CleanConfig {
            patterns: config.clean.patterns.clone(),
            preserve: config.clean.preserve.clone(),
        }));

    if let Some(library) = &build.library {
        pipeline = pipeline.library(library);
    }
    if let Some(copy) = &config.copy {
        pipeline = pipeline.copy(&copy.from, url_path(&copy.to));
    }
    for (name, path) in &build.entries {
        pipeline = pipeline.entry(name, path);
    }
    pipeline
}

fn url_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
