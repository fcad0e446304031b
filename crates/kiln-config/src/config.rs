//! Top-level configuration structure for kiln.
//!
//! `KilnConfig` mirrors the layout of `kiln.toml`. Every section has sensible
//! defaults so an empty file (or no file at all, when entries come from the
//! command line) still produces a usable configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default inlining threshold: assets strictly smaller than 10 KiB become data URIs.
pub const DEFAULT_INLINE_LIMIT: u64 = 10 * 1024;

/// Global the entry exports are assigned to unless configured otherwise.
pub const DEFAULT_LIBRARY: &str = "NSCR";

/// Default dev server port.
pub const DEFAULT_DEV_PORT: u16 = 8080;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KilnConfig {
    #[serde(default)]
    pub build: BuildSection,

    /// Vendor directory copied verbatim into the output root.
    #[serde(default)]
    pub copy: Option<CopySection>,

    #[serde(default)]
    pub clean: CleanSection,

    #[serde(default)]
    pub dev: DevSection,
}

/// `[build]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSection {
    /// Entry name to source path. Output files are named after the entry name.
    #[serde(default)]
    pub entries: BTreeMap<String, PathBuf>,

    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    /// URL prefix under which emitted files are referenced by batch builds.
    #[serde(default = "default_public_path")]
    pub public_path: String,

    /// Global variable the entry exports are assigned to.
    #[serde(default = "default_library")]
    pub library: Option<String>,

    #[serde(default = "default_inline_limit")]
    pub inline_limit: u64,

    #[serde(default = "default_true")]
    pub sourcemap: bool,

    /// Also write `manifest.json` next to the bundles.
    #[serde(default)]
    pub manifest: bool,

    /// Extensions probed when a specifier omits one.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            out_dir: default_out_dir(),
            public_path: default_public_path(),
            library: default_library(),
            inline_limit: default_inline_limit(),
            sourcemap: true,
            manifest: false,
            extensions: default_extensions(),
        }
    }
}

/// `[copy]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopySection {
    pub from: PathBuf,

    /// Sub-path of the output root that receives the copy.
    #[serde(default = "default_copy_to")]
    pub to: PathBuf,
}

/// `[clean]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Gitignore-style globs, relative to the output root, selecting files to remove.
    #[serde(default = "default_clean_patterns")]
    pub patterns: Vec<String>,

    /// Globs that are never removed even when a clean pattern matches.
    #[serde(default = "default_preserve")]
    pub preserve: Vec<String>,
}

impl Default for CleanSection {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: default_clean_patterns(),
            preserve: default_preserve(),
        }
    }
}

/// `[dev]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// URL prefix the dev server mounts the build output under.
    #[serde(default = "default_dev_public_path")]
    pub public_path: String,

    #[serde(default = "default_true")]
    pub cors: bool,

    #[serde(default = "default_true")]
    pub hot: bool,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_watch_ignore")]
    pub watch_ignore: Vec<String>,
}

impl Default for DevSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_path: default_dev_public_path(),
            cors: true,
            hot: true,
            debounce_ms: default_debounce_ms(),
            watch_ignore: default_watch_ignore(),
        }
    }
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_public_path() -> String {
    "/".to_string()
}

fn default_library() -> Option<String> {
    Some(DEFAULT_LIBRARY.to_string())
}

fn default_inline_limit() -> u64 {
    DEFAULT_INLINE_LIMIT
}

fn default_true() -> bool {
    true
}

fn default_extensions() -> Vec<String> {
    vec![".js".to_string(), ".json".to_string()]
}

fn default_copy_to() -> PathBuf {
    PathBuf::from("vendor")
}

fn default_clean_patterns() -> Vec<String> {
    vec!["**/*".to_string()]
}

fn default_preserve() -> Vec<String> {
    vec![".gitkeep".to_string()]
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_DEV_PORT
}

fn default_dev_public_path() -> String {
    "/static/".to_string()
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_watch_ignore() -> Vec<String> {
    vec![
        "node_modules".to_string(),
        "dist".to_string(),
        "*.map".to_string(),
    ]
}

impl KilnConfig {
    /// Create from serde_json::Value (for programmatic config)
    ///
    /// # Example
    ///
    /// ```
    /// use kiln_config::KilnConfig;
    /// use serde_json::json;
    /// use std::path::PathBuf;
    ///
    /// let value = json!({
    ///     "build": {
    ///         "entries": { "index": "src/index.js" },
    ///         "inline_limit": 2048
    ///     }
    /// });
    ///
    /// let config = KilnConfig::from_value(value).unwrap();
    /// assert_eq!(config.build.entries["index"], PathBuf::from("src/index.js"));
    /// assert_eq!(config.build.inline_limit, 2048);
    /// ```
    pub fn from_value(value: serde_json::Value) -> crate::Result<Self> {
        serde_json::from_value(value).map_err(|e| crate::ConfigError::InvalidValue {
            field: "config".to_string(),
            hint: Some(e.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = KilnConfig::default();
        assert_eq!(config.build.inline_limit, 10 * 1024);
        assert!(config.build.sourcemap);
        assert!(!config.build.manifest);
        assert_eq!(config.build.library.as_deref(), Some("NSCR"));
        assert_eq!(config.build.extensions, vec![".js", ".json"]);
        assert_eq!(config.clean.patterns, vec!["**/*"]);
        assert_eq!(config.clean.preserve, vec![".gitkeep"]);
        assert_eq!(config.dev.port, 8080);
        assert_eq!(config.dev.public_path, "/static/");
        assert!(config.dev.cors);
        assert!(config.copy.is_none());
    }

    #[test]
    fn copy_target_defaults_when_omitted() {
        let config = KilnConfig::from_value(serde_json::json!({
            "copy": { "from": "node_modules/govuk-frontend/dist/govuk/assets" }
        }))
        .unwrap();
        let copy = config.copy.unwrap();
        assert_eq!(copy.to, PathBuf::from("vendor"));
    }

    #[test]
    fn unknown_field_types_are_rejected() {
        let result = KilnConfig::from_value(serde_json::json!({
            "build": { "inline_limit": "ten" }
        }));
        assert!(result.is_err());
    }
}
