//! Transform rules and the ordered rule registry.
//!
//! A [`RuleRegistry`] is built up with [`RuleRegistry::register`] and is only
//! ever changed by producing a new registry. Routing accepts a
//! [`FrozenRegistry`], which the profile selector produces after applying its
//! overrides exactly once.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::transform::Transform;
use crate::{Error, Result};

mod defaults;

pub use defaults::{
    FONTS, IMAGES, JSON, SCRIPTS, STYLES, SVG, default_registry, extension_predicate,
};

/// Where a stylesheet's CSS ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleSink {
    /// Injected into the page by the script bundle.
    Inject,
    /// Written to the entry's `.css` file.
    Extract,
}

/// Per-rule options read by the stages of its chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleOptions {
    /// Assets strictly smaller than this many bytes are inlined. `None`
    /// emits every asset as a file.
    pub inline_limit: Option<u64>,
    pub optimise_images: bool,
    pub minify: bool,
    pub hot: bool,
    pub source_map: bool,
}

/// Partial update of [`RuleOptions`]. Unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionsPatch {
    pub inline_limit: Option<u64>,
    pub optimise_images: Option<bool>,
    pub minify: Option<bool>,
    pub hot: Option<bool>,
    pub source_map: Option<bool>,
}

impl OptionsPatch {
    pub fn apply(&self, options: &RuleOptions) -> RuleOptions {
        RuleOptions {
            inline_limit: self.inline_limit.or(options.inline_limit),
            optimise_images: self.optimise_images.unwrap_or(options.optimise_images),
            minify: self.minify.unwrap_or(options.minify),
            hot: self.hot.unwrap_or(options.hot),
            source_map: self.source_map.unwrap_or(options.source_map),
        }
    }
}

/// Ordered, immutable list of stages.
#[derive(Clone)]
pub struct TransformChain(Arc<[Arc<dyn Transform>]>);

impl TransformChain {
    pub fn new(stages: Vec<Arc<dyn Transform>>) -> Self {
        Self(stages.into())
    }

    pub fn stages(&self) -> &[Arc<dyn Transform>] {
        &self.0
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.0.iter().map(|s| s.name()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|s| s.name() == name)
    }

    /// New chain with the stage called `name` swapped for `with`.
    pub fn with_stage_replaced(&self, name: &str, with: Arc<dyn Transform>) -> Result<Self> {
        if !self.contains(name) {
            return Err(Error::InvalidConfig(format!(
                "chain has no stage named '{}' (stages: {})",
                name,
                self.stage_names().join(", ")
            )));
        }
        let stages = self
            .0
            .iter()
            .map(|s| {
                if s.name() == name {
                    with.clone()
                } else {
                    s.clone()
                }
            })
            .collect();
        Ok(Self::new(stages))
    }

    /// New chain with `stage` appended.
    pub fn with_stage_appended(&self, stage: Arc<dyn Transform>) -> Self {
        let mut stages = self.0.to_vec();
        stages.push(stage);
        Self::new(stages)
    }
}

impl fmt::Debug for TransformChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.stage_names()).finish()
    }
}

/// A predicate over project-relative paths paired with a chain and options.
#[derive(Debug, Clone)]
pub struct TransformRule {
    pub id: String,
    pub predicate: Regex,
    pub chain: TransformChain,
    pub options: RuleOptions,
}

impl TransformRule {
    pub fn new(
        id: impl Into<String>,
        predicate: Regex,
        stages: Vec<Arc<dyn Transform>>,
        options: RuleOptions,
    ) -> Self {
        Self {
            id: id.into(),
            predicate,
            chain: TransformChain::new(stages),
            options,
        }
    }

    pub fn matches(&self, rel: &str) -> bool {
        self.predicate.is_match(rel)
    }
}

/// Rules in registration order. First match wins.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<TransformRule>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule. Rule ids are unique.
    pub fn register(&mut self, rule: TransformRule) -> Result<()> {
        if self.get(&rule.id).is_some() {
            return Err(Error::InvalidConfig(format!(
                "rule '{}' is already registered",
                rule.id
            )));
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn match_path(&self, rel: &str) -> Option<&TransformRule> {
        self.rules.iter().find(|r| r.matches(rel))
    }

    pub fn get(&self, id: &str) -> Option<&TransformRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransformRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn update(
        &self,
        id: &str,
        f: impl FnOnce(&TransformRule) -> Result<TransformRule>,
    ) -> Result<RuleRegistry> {
        let index = self
            .rules
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown rule '{}'", id)))?;
        let mut rules = self.rules.clone();
        rules[index] = f(&self.rules[index])?;
        Ok(RuleRegistry { rules })
    }

    /// New registry with rule `id`'s options patched.
    pub fn override_rule(&self, id: &str, patch: &OptionsPatch) -> Result<RuleRegistry> {
        self.update(id, |rule| {
            Ok(TransformRule {
                options: patch.apply(&rule.options),
                ..rule.clone()
            })
        })
    }

    /// New registry with stage `stage` of rule `id` replaced.
    pub fn replace_stage(
        &self,
        id: &str,
        stage: &str,
        with: Arc<dyn Transform>,
    ) -> Result<RuleRegistry> {
        self.update(id, |rule| {
            Ok(TransformRule {
                chain: rule.chain.with_stage_replaced(stage, with)?,
                ..rule.clone()
            })
        })
    }

    /// New registry with `stage` appended to rule `id`'s chain.
    pub fn append_stage(&self, id: &str, stage: Arc<dyn Transform>) -> Result<RuleRegistry> {
        self.update(id, |rule| {
            Ok(TransformRule {
                chain: rule.chain.with_stage_appended(stage),
                ..rule.clone()
            })
        })
    }

    pub(crate) fn freeze(self) -> FrozenRegistry {
        FrozenRegistry {
            rules: self.rules.into(),
        }
    }
}

/// Registry with the mode profile applied. Cheap to clone and share across
/// router threads; cannot be modified.
#[derive(Debug, Clone)]
pub struct FrozenRegistry {
    rules: Arc<[TransformRule]>,
}

impl FrozenRegistry {
    pub fn match_path(&self, rel: &str) -> Option<&TransformRule> {
        self.rules.iter().find(|r| r.matches(rel))
    }

    pub fn get(&self, id: &str) -> Option<&TransformRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransformRule> {
        self.rules.iter()
    }
}
