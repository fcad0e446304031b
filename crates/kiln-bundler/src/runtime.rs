//! File access and module resolution.
//!
//! The router never touches the filesystem directly; it goes through a
//! [`Runtime`] so resolution rules live in one place. [`NativeRuntime`] reads
//! from disk and resolves specifiers with `oxc_resolver` using node semantics
//! (relative paths, extension probing, directory `index` files, `node_modules`).

use std::path::{Path, PathBuf};

use oxc_resolver::{ResolveOptions, Resolver};

/// How a specifier was referenced. Stylesheet imports resolve with
/// stylesheet extensions and package fields, and fall back to `_partial`
/// file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Script,
    Stylesheet,
    /// `url()` reference to an image or font.
    Asset,
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("{0}")]
    Io(String),

    #[error("cannot resolve '{specifier}' from {}: {reason}", .from.display())]
    ResolutionFailed {
        specifier: String,
        from: PathBuf,
        reason: String,
    },
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

pub trait Runtime: Send + Sync + std::fmt::Debug {
    fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>>;

    fn exists(&self, path: &Path) -> bool;

    /// Resolve `specifier` as imported from the file `from`.
    fn resolve(&self, specifier: &str, from: &Path, kind: ImportKind) -> RuntimeResult<PathBuf>;
}

/// Filesystem-backed runtime.
#[derive(Debug)]
pub struct NativeRuntime {
    scripts: Resolver,
    styles: Resolver,
}

impl NativeRuntime {
    /// Create a runtime that probes `extensions` for extensionless script imports.
    pub fn new(extensions: &[String]) -> Self {
        let scripts = Resolver::new(ResolveOptions {
            extensions: extensions.to_vec(),
            condition_names: vec![
                "browser".into(),
                "import".into(),
                "require".into(),
                "default".into(),
            ],
            main_fields: vec!["browser".into(), "module".into(), "main".into()],
            ..Default::default()
        });

        let styles = Resolver::new(ResolveOptions {
            extensions: vec![".scss".into(), ".css".into()],
            condition_names: vec!["sass".into(), "style".into(), "default".into()],
            main_fields: vec!["sass".into(), "style".into(), "main".into()],
            ..Default::default()
        });

        Self { scripts, styles }
    }
}

impl Default for NativeRuntime {
    fn default() -> Self {
        Self::new(&[".js".to_string(), ".json".to_string()])
    }
}

impl Runtime for NativeRuntime {
    fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>> {
        std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RuntimeError::FileNotFound(path.to_path_buf())
            } else {
                RuntimeError::Io(format!("Failed to read {}: {}", path.display(), e))
            }
        })
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn resolve(&self, specifier: &str, from: &Path, kind: ImportKind) -> RuntimeResult<PathBuf> {
        let from_dir = if from.is_dir() {
            from
        } else {
            from.parent().unwrap_or(from)
        };

        let resolver = match kind {
            ImportKind::Script | ImportKind::Asset => &self.scripts,
            ImportKind::Stylesheet => &self.styles,
        };

        // The literal specifier's error is the one reported.
        let mut failure = None;
        for candidate in candidates(specifier, kind) {
            match resolver.resolve(from_dir, &candidate) {
                Ok(res) => return Ok(res.path().to_path_buf()),
                Err(e) if candidate == specifier || failure.is_none() => failure = Some(e),
                Err(_) => {}
            }
        }

        Err(RuntimeError::ResolutionFailed {
            specifier: specifier.to_string(),
            from: from.to_path_buf(),
            reason: failure.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
        || Path::new(specifier).is_absolute()
}

/// Specifiers to try, in order.
///
/// Scripts use node semantics as written. Stylesheet and `url()` references
/// look next to the importing file before `node_modules`, and stylesheet
/// imports also try the `_partial` spelling of each candidate.
fn candidates(specifier: &str, kind: ImportKind) -> Vec<String> {
    let mut bases = Vec::with_capacity(2);
    if kind != ImportKind::Script && !is_relative(specifier) {
        bases.push(format!("./{}", specifier));
    }
    bases.push(specifier.to_string());
    if kind != ImportKind::Stylesheet {
        return bases;
    }
    bases
        .into_iter()
        .flat_map(|base| {
            let partial = partial_specifier(&base);
            std::iter::once(base).chain(partial)
        })
        .collect()
}

/// `dir/name` -> `dir/_name`, the sass partial naming convention.
fn partial_specifier(specifier: &str) -> Option<String> {
    let (dir, name) = match specifier.rsplit_once('/') {
        Some((dir, name)) => (Some(dir), name),
        None => (None, specifier),
    };
    if name.is_empty() || name.starts_with('_') || name.starts_with('.') {
        return None;
    }
    Some(match dir {
        Some(dir) => format!("{}/_{}", dir, name),
        None => format!("_{}", name),
    })
}
