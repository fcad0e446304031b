//! Mode profiles.
//!
//! A build invocation (mode plus build-or-serve context) maps to exactly one
//! [`ModeProfile`], whose overrides are applied to the registry once, before
//! routing, producing a [`FrozenRegistry`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::rules::{FrozenRegistry, IMAGES, OptionsPatch, RuleRegistry, SCRIPTS, STYLES, SVG};
use crate::transform::{HotReload, StyleExtract, Transform};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Production,
    Development,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Production => write!(f, "production"),
            Mode::Development => write!(f, "development"),
        }
    }
}

/// Whether the build feeds a one-off write or the dev server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeContext {
    Build,
    Server { hot: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeProfile {
    Production,
    Development,
    DevelopmentWithServer { hot: bool },
}

impl ModeProfile {
    pub fn select(mode: Mode, context: ServeContext) -> Self {
        match (mode, context) {
            (Mode::Production, _) => ModeProfile::Production,
            (Mode::Development, ServeContext::Build) => ModeProfile::Development,
            (Mode::Development, ServeContext::Server { hot }) => {
                ModeProfile::DevelopmentWithServer { hot }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModeProfile::Production => "production",
            ModeProfile::Development => "development",
            ModeProfile::DevelopmentWithServer { .. } => "development-with-server",
        }
    }

    pub fn public_path(&self, fixed: &str) -> PublicPath {
        match self {
            ModeProfile::DevelopmentWithServer { .. } => PublicPath::ScriptRelative {
                fallback: fixed.to_string(),
            },
            _ => PublicPath::Fixed(fixed.to_string()),
        }
    }
}

/// How bundles locate emitted files at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicPath {
    /// Prefix every URL with this path.
    Fixed(String),
    /// Derive the prefix from the URL the bundle script was loaded from, so
    /// assets come from the dev server origin. `fallback` is used when the
    /// script URL is unavailable.
    ScriptRelative { fallback: String },
}

impl PublicPath {
    /// Prefix used where no runtime is available (extracted CSS).
    pub fn static_prefix(&self) -> &str {
        match self {
            PublicPath::Fixed(p) => p,
            PublicPath::ScriptRelative { fallback } => fallback,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RuleOverride {
    Options {
        rule: &'static str,
        patch: OptionsPatch,
    },
    ReplaceStage {
        rule: &'static str,
        stage: &'static str,
        with: Arc<dyn Transform>,
    },
    AppendStage {
        rule: &'static str,
        stage: Arc<dyn Transform>,
    },
}

/// Overrides for a build invocation. Pure: the same inputs always yield the
/// same list.
pub fn overrides(mode: Mode, context: ServeContext) -> Vec<RuleOverride> {
    profile_overrides(ModeProfile::select(mode, context))
}

fn profile_overrides(profile: ModeProfile) -> Vec<RuleOverride> {
    match profile {
        ModeProfile::Production => {
            let optimise = OptionsPatch {
                optimise_images: Some(true),
                ..OptionsPatch::default()
            };
            let minify = OptionsPatch {
                minify: Some(true),
                ..OptionsPatch::default()
            };
            vec![
                RuleOverride::Options {
                    rule: IMAGES,
                    patch: optimise.clone(),
                },
                RuleOverride::Options {
                    rule: SVG,
                    patch: optimise,
                },
                RuleOverride::ReplaceStage {
                    rule: STYLES,
                    stage: "style-inject",
                    with: Arc::new(StyleExtract),
                },
                RuleOverride::Options {
                    rule: SCRIPTS,
                    patch: minify.clone(),
                },
                RuleOverride::Options {
                    rule: STYLES,
                    patch: minify,
                },
            ]
        }
        ModeProfile::Development => Vec::new(),
        ModeProfile::DevelopmentWithServer { hot: false } => Vec::new(),
        ModeProfile::DevelopmentWithServer { hot: true } => {
            let hot = OptionsPatch {
                hot: Some(true),
                ..OptionsPatch::default()
            };
            [SCRIPTS, STYLES]
                .into_iter()
                .flat_map(|rule| {
                    [
                        RuleOverride::AppendStage {
                            rule,
                            stage: Arc::new(HotReload),
                        },
                        RuleOverride::Options {
                            rule,
                            patch: hot.clone(),
                        },
                    ]
                })
                .collect()
        }
    }
}

/// Apply the invocation's overrides to `registry` and freeze the result.
pub fn select(registry: RuleRegistry, mode: Mode, context: ServeContext) -> Result<FrozenRegistry> {
    let profile = ModeProfile::select(mode, context);
    let list = profile_overrides(profile);
    let count = list.len();

    let mut registry = registry;
    for item in list {
        registry = match item {
            RuleOverride::Options { rule, patch } => registry.override_rule(rule, &patch)?,
            RuleOverride::ReplaceStage { rule, stage, with } => {
                registry.replace_stage(rule, stage, with)?
            }
            RuleOverride::AppendStage { rule, stage } => registry.append_stage(rule, stage)?,
        };
    }

    let summary = |id: &str| {
        registry
            .get(id)
            .map(|r| r.chain.stage_names().join(">"))
            .unwrap_or_default()
    };
    tracing::info!(
        profile = profile.name(),
        overrides = count,
        scripts = %summary(SCRIPTS),
        styles = %summary(STYLES),
        optimise_images = registry.get(IMAGES).is_some_and(|r| r.options.optimise_images),
        "selected build profile"
    );

    Ok(registry.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::default_registry;

    fn frozen(mode: Mode, context: ServeContext) -> FrozenRegistry {
        select(default_registry(10240, true).unwrap(), mode, context).unwrap()
    }

    #[test]
    fn production_extracts_and_minifies() {
        let registry = frozen(Mode::Production, ServeContext::Build);
        let styles = registry.get(STYLES).unwrap();
        assert_eq!(styles.chain.stage_names(), vec!["stylesheet", "style-extract"]);
        assert!(styles.options.minify);
        assert!(registry.get(SCRIPTS).unwrap().options.minify);
        assert!(registry.get(IMAGES).unwrap().options.optimise_images);
        assert!(registry.get(SVG).unwrap().options.optimise_images);
    }

    #[test]
    fn development_changes_nothing() {
        let registry = frozen(Mode::Development, ServeContext::Build);
        let base = default_registry(10240, true).unwrap();
        for rule in base.iter() {
            let frozen = registry.get(&rule.id).unwrap();
            assert_eq!(frozen.options, rule.options);
            assert_eq!(frozen.chain.stage_names(), rule.chain.stage_names());
        }
    }

    #[test]
    fn server_appends_hot_stage() {
        let registry = frozen(Mode::Development, ServeContext::Server { hot: true });
        assert_eq!(registry.get(SCRIPTS).unwrap().chain.stage_names(), vec!["script", "hot"]);
        assert_eq!(
            registry.get(STYLES).unwrap().chain.stage_names(),
            vec!["stylesheet", "style-inject", "hot"]
        );
        assert!(registry.get(SCRIPTS).unwrap().options.hot);
        assert!(!registry.get(IMAGES).unwrap().options.optimise_images);
    }

    #[test]
    fn production_serve_is_production() {
        assert_eq!(
            ModeProfile::select(Mode::Production, ServeContext::Server { hot: true }),
            ModeProfile::Production
        );
        let registry = frozen(Mode::Production, ServeContext::Server { hot: true });
        assert!(!registry.get(SCRIPTS).unwrap().chain.contains("hot"));
    }

    #[test]
    fn server_public_path_is_script_relative() {
        let profile = ModeProfile::select(Mode::Development, ServeContext::Server { hot: true });
        assert_eq!(
            profile.public_path("/static/"),
            PublicPath::ScriptRelative {
                fallback: "/static/".into()
            }
        );
        assert_eq!(
            ModeProfile::Production.public_path("/dist/"),
            PublicPath::Fixed("/dist/".into())
        );
    }

    #[test]
    fn overrides_are_pure() {
        let a = overrides(Mode::Production, ServeContext::Build);
        let b = overrides(Mode::Production, ServeContext::Build);
        assert_eq!(a.len(), b.len());
        assert_eq!(a.len(), 5);
        assert!(overrides(Mode::Development, ServeContext::Build).is_empty());
        assert!(overrides(Mode::Development, ServeContext::Server { hot: false }).is_empty());
    }
}
