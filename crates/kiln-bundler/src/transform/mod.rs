//! Transform stages.
//!
//! A rule's chain is an ordered list of [`Transform`] stages. Each stage takes
//! the [`Payload`] produced by the previous one (the first stage receives the
//! raw file bytes) and may record imports, emit files or mark the module as
//! hot-reloadable through the [`TransformContext`].
//!
//! A chain must end in a linkable payload: a script, a stylesheet with a
//! chosen sink, or a URL.

use std::fmt;
use std::sync::Arc;

use oxc_sourcemap::SourceMap;

use crate::asset::SourceAsset;
use crate::rules::{RuleOptions, StyleSink};
use crate::runtime::ImportKind;

mod hot;
mod image;
mod json;
mod script;
mod style;
mod url;

pub use hot::HotReload;
pub use image::OptimiseImages;
pub use json::JsonModule;
pub use script::{ScriptTransform, REQUIRE_IDENT};
pub use style::{StyleExtract, StyleInject, StylesheetTransform, PUBLIC_PATH_PLACEHOLDER};
pub use url::{SvgUrlInline, UrlInline, emitted_file_name};

pub(crate) use script::js_string;
pub(crate) use style::{is_external, replace_urls, strip_suffix};

/// A single transform capability.
pub trait Transform: Send + Sync + fmt::Debug {
    /// Stage name, unique within a chain. Profile overrides address stages by name.
    fn name(&self) -> &'static str;

    fn apply(&self, input: Payload, cx: &mut TransformContext<'_>) -> anyhow::Result<Payload>;
}

/// Value flowing through a transform chain.
#[derive(Debug, Clone)]
pub enum Payload {
    Bytes(Arc<[u8]>),
    Script(ScriptModule),
    Style(StyleModule),
    Url(UrlModule),
}

impl Payload {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Payload::Bytes(_) => "bytes",
            Payload::Script(_) => "script",
            Payload::Style(_) => "stylesheet",
            Payload::Url(_) => "url",
        }
    }
}

/// Factory body of a script module, already rewritten to use the bundle's
/// module runtime.
#[derive(Clone)]
pub struct ScriptModule {
    pub code: String,
    /// Maps `code` back to the original source, line for line when not minified.
    pub map: Option<SourceMap>,
}

impl fmt::Debug for ScriptModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptModule")
            .field("code_len", &self.code.len())
            .field("has_map", &self.map.is_some())
            .finish()
    }
}

/// A processed stylesheet. `urls` are the raw `url()` specifiers found in
/// `css`, substituted with final asset URLs at link time.
#[derive(Debug, Clone)]
pub struct StyleModule {
    pub css: String,
    pub urls: Vec<String>,
    /// Unset until a sink stage runs.
    pub sink: Option<StyleSink>,
}

/// Where a URL asset ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlPlacement {
    /// Complete `data:` URI.
    Inline(String),
    /// File name relative to the output root.
    Emitted(String),
}

#[derive(Debug, Clone)]
pub struct UrlModule {
    pub placement: UrlPlacement,
    /// Size of the (possibly optimised) asset bytes.
    pub size: u64,
    pub digest: String,
}

/// A file emitted next to the bundles, e.g. a large image.
#[derive(Debug, Clone)]
pub struct EmittedAsset {
    pub file_name: String,
    pub content: Arc<[u8]>,
}

/// An import discovered by a stage, resolved by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub specifier: String,
    pub kind: ImportKind,
}

/// Per-asset state shared by the stages of one chain run.
pub struct TransformContext<'a> {
    pub asset: &'a SourceAsset,
    pub rule_id: &'a str,
    pub options: &'a RuleOptions,
    imports: Vec<Import>,
    emitted: Vec<EmittedAsset>,
    hot: bool,
}

impl<'a> TransformContext<'a> {
    pub fn new(asset: &'a SourceAsset, rule_id: &'a str, options: &'a RuleOptions) -> Self {
        Self {
            asset,
            rule_id,
            options,
            imports: Vec::new(),
            emitted: Vec::new(),
            hot: false,
        }
    }

    /// Record an import. Duplicates are ignored, first occurrence order is kept.
    pub fn add_import(&mut self, specifier: impl Into<String>, kind: ImportKind) {
        let import = Import {
            specifier: specifier.into(),
            kind,
        };
        if !self.imports.contains(&import) {
            self.imports.push(import);
        }
    }

    pub fn emit(&mut self, file_name: impl Into<String>, content: Arc<[u8]>) {
        self.emitted.push(EmittedAsset {
            file_name: file_name.into(),
            content,
        });
    }

    pub fn mark_hot(&mut self) {
        self.hot = true;
    }

    pub fn imports(&self) -> &[Import] {
        &self.imports
    }

    pub(crate) fn finish(self) -> (Vec<Import>, Vec<EmittedAsset>, bool) {
        (self.imports, self.emitted, self.hot)
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(bytes);
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Run `chain` over `asset`, returning the final payload and the context output.
pub(crate) fn run_chain(
    chain: &[Arc<dyn Transform>],
    asset: &SourceAsset,
    rule_id: &str,
    options: &RuleOptions,
) -> std::result::Result<(Payload, Vec<Import>, Vec<EmittedAsset>, bool), (String, anyhow::Error)> {
    let mut cx = TransformContext::new(asset, rule_id, options);
    let mut payload = Payload::Bytes(asset.content.clone());

    for stage in chain {
        payload = stage
            .apply(payload, &mut cx)
            .map_err(|e| (stage.name().to_string(), e))?;
    }

    let (imports, emitted, hot) = cx.finish();
    Ok((payload, imports, emitted, hot))
}
