use std::sync::Arc;

use regex::Regex;

use super::{RuleOptions, RuleRegistry, TransformRule};
use crate::Result;
use crate::transform::{
    JsonModule, OptimiseImages, ScriptTransform, StyleInject, StylesheetTransform, SvgUrlInline,
    UrlInline,
};

pub const SCRIPTS: &str = "scripts";
pub const JSON: &str = "json";
pub const IMAGES: &str = "images";
pub const FONTS: &str = "fonts";
pub const SVG: &str = "svg";
pub const STYLES: &str = "styles";

/// Case-insensitive match on the file extension.
pub fn extension_predicate(extensions: &[&str]) -> Regex {
    let alternatives = extensions
        .iter()
        .map(|e| regex::escape(e))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\.(?:{})$", alternatives)).expect("escaped extensions form a valid regex")
}

/// The standard rule set, in match order.
pub fn default_registry(inline_limit: u64, source_map: bool) -> Result<RuleRegistry> {
    let code = RuleOptions {
        source_map,
        ..RuleOptions::default()
    };
    let asset = RuleOptions {
        inline_limit: Some(inline_limit),
        ..RuleOptions::default()
    };

    let rules = [
        TransformRule::new(
            SCRIPTS,
            extension_predicate(&["js", "mjs"]),
            vec![Arc::new(ScriptTransform)],
            code.clone(),
        ),
        TransformRule::new(
            JSON,
            extension_predicate(&["json"]),
            vec![Arc::new(JsonModule)],
            code.clone(),
        ),
        TransformRule::new(
            IMAGES,
            extension_predicate(&["gif", "png", "jpg", "jpeg"]),
            vec![Arc::new(OptimiseImages), Arc::new(UrlInline)],
            asset.clone(),
        ),
        TransformRule::new(
            FONTS,
            extension_predicate(&["eot", "ttf", "woff", "woff2"]),
            vec![Arc::new(UrlInline)],
            asset.clone(),
        ),
        TransformRule::new(
            SVG,
            extension_predicate(&["svg"]),
            vec![Arc::new(OptimiseImages), Arc::new(SvgUrlInline)],
            asset,
        ),
        TransformRule::new(
            STYLES,
            extension_predicate(&["css", "scss"]),
            vec![Arc::new(StylesheetTransform), Arc::new(StyleInject)],
            code,
        ),
    ];

    let mut registry = RuleRegistry::new();
    for rule in rules {
        registry.register(rule)?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_cover_asset_classes() {
        let registry = default_registry(10240, true).unwrap();
        let id = |path: &str| registry.match_path(path).map(|r| r.id.clone());

        assert_eq!(id("frontend/src/index.js").as_deref(), Some(SCRIPTS));
        assert_eq!(id("lib/esm.mjs").as_deref(), Some(SCRIPTS));
        assert_eq!(id("data/areas.json").as_deref(), Some(JSON));
        assert_eq!(id("images/Crown.PNG").as_deref(), Some(IMAGES));
        assert_eq!(id("fonts/bold.woff2").as_deref(), Some(FONTS));
        assert_eq!(id("icons/tick.svg").as_deref(), Some(SVG));
        assert_eq!(id("frontend/src/index.scss").as_deref(), Some(STYLES));
        assert_eq!(id("README.md"), None);
        assert_eq!(id("index.js.map"), None);
    }

    #[test]
    fn default_chains() {
        let registry = default_registry(10240, true).unwrap();
        let stages = |id: &str| registry.get(id).unwrap().chain.stage_names();

        assert_eq!(stages(SCRIPTS), vec!["script"]);
        assert_eq!(stages(IMAGES), vec!["optimise-images", "url-inline"]);
        assert_eq!(stages(FONTS), vec!["url-inline"]);
        assert_eq!(stages(SVG), vec!["optimise-images", "svg-url-inline"]);
        assert_eq!(stages(STYLES), vec!["stylesheet", "style-inject"]);
    }

    #[test]
    fn asset_rules_carry_inline_limit() {
        let registry = default_registry(4096, false).unwrap();
        for id in [IMAGES, FONTS, SVG] {
            assert_eq!(registry.get(id).unwrap().options.inline_limit, Some(4096));
        }
        assert_eq!(registry.get(SCRIPTS).unwrap().options.inline_limit, None);
        assert_eq!(registry.len(), 6);
    }
}
