//! File-based config discovery for CLI use
//!
//! Finds `kiln.toml` (or a `kiln` field in `package.json`) and layers it with
//! environment variables and command-line overrides through figment.
//!
//! Precedence, lowest to highest: built-in defaults, config file,
//! `KILN_`-prefixed environment variables, command-line overrides.

use std::fs;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml};
use serde_json::Value;

use crate::config::KilnConfig;
use crate::error::{ConfigError, Result};
use crate::overrides::ConfigOverrides;

/// Environment variable prefix. Nested keys use a double underscore:
/// `KILN_BUILD__OUT_DIR=public`.
pub const ENV_PREFIX: &str = "KILN_";

/// Name of the configuration file searched for in the project root.
pub const CONFIG_FILE_NAME: &str = "kiln.toml";

/// Where a configuration document came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Toml(PathBuf),
    Json(PathBuf),
    /// The `kiln` field of a `package.json`.
    PackageJson(PathBuf),
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::Toml(p) | ConfigSource::Json(p) | ConfigSource::PackageJson(p) => p,
        }
    }

    fn from_explicit(path: PathBuf) -> Self {
        let is_package_json = path.file_name() == Some(std::ffi::OsStr::new("package.json"));
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        if is_package_json {
            ConfigSource::PackageJson(path)
        } else if is_json {
            ConfigSource::Json(path)
        } else {
            ConfigSource::Toml(path)
        }
    }
}

/// File-based configuration discovery
///
/// # Example
///
/// ```no_run
/// use kiln_config::{ConfigDiscovery, ConfigOverrides};
///
/// let discovery = ConfigDiscovery::new(".");
/// let config = discovery.load(None, &ConfigOverrides::default()).unwrap();
/// ```
pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    /// Create a new config discovery with a root directory
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Find a config file in the root directory
    ///
    /// Searches in this order:
    /// 1. TOML config: kiln.toml
    /// 2. package.json (kiln field)
    pub fn find(&self) -> Option<ConfigSource> {
        let toml_path = self.root.join(CONFIG_FILE_NAME);
        if toml_path.is_file() {
            return Some(ConfigSource::Toml(toml_path));
        }

        let pkg_path = self.root.join("package.json");
        if pkg_path.is_file() {
            if let Ok(content) = fs::read_to_string(&pkg_path) {
                if let Ok(parsed) = serde_json::from_str::<Value>(&content) {
                    if parsed.get("kiln").is_some_and(|v| !v.is_null()) {
                        return Some(ConfigSource::PackageJson(pkg_path));
                    }
                }
            }
        }

        None
    }

    /// Build the layered figment without extracting it.
    ///
    /// An explicit path that does not exist is an error; a missing discovered
    /// file simply means defaults + environment + overrides.
    pub fn figment(
        &self,
        explicit: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<(Figment, Option<ConfigSource>)> {
        let source = match explicit {
            Some(path) => {
                let path = if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    self.root.join(path)
                };
                if !path.is_file() {
                    return Err(ConfigError::FileNotFound(path));
                }
                Some(ConfigSource::from_explicit(path))
            }
            None => self.find(),
        };

        let mut figment = Figment::from(Serialized::defaults(KilnConfig::default()));

        match &source {
            Some(ConfigSource::Toml(path)) => figment = figment.merge(Toml::file(path)),
            Some(ConfigSource::Json(path)) => figment = figment.merge(Json::file(path)),
            Some(ConfigSource::PackageJson(path)) => {
                figment = figment.merge(Figment::from(Json::file(path)).focus("kiln"))
            }
            None => {}
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        if !overrides.is_empty() {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        Ok((figment, source))
    }

    /// Load the configuration with every layer applied.
    pub fn load(&self, explicit: Option<&Path>, overrides: &ConfigOverrides) -> Result<KilnConfig> {
        let (figment, source) = self.figment(explicit, overrides)?;
        match &source {
            Some(source) => tracing::debug!("loading config from {}", source.path().display()),
            None => tracing::debug!("no config file found in {}", self.root.display()),
        }
        Ok(figment.extract()?)
    }
}

/// Discover and load config from the current directory (convenience function)
pub fn discover() -> Result<KilnConfig> {
    let root = std::env::current_dir()?;
    ConfigDiscovery::new(&root).load(None, &ConfigOverrides::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn find_returns_none_when_no_config() {
        let dir = TempDir::new().unwrap();
        let discovery = ConfigDiscovery::new(dir.path());
        assert!(discovery.find().is_none());
    }

    #[test]
    fn find_discovers_toml_config() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("kiln.toml");
        fs::write(&config_path, "[build]\nentries = { index = \"src/index.js\" }\n").unwrap();

        let discovery = ConfigDiscovery::new(dir.path());
        assert_eq!(discovery.find(), Some(ConfigSource::Toml(config_path)));
    }

    #[test]
    fn package_json_without_kiln_field_is_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), r#"{ "name": "site" }"#).unwrap();

        let discovery = ConfigDiscovery::new(dir.path());
        assert!(discovery.find().is_none());
    }

    #[test]
    #[serial]
    fn load_parses_toml_config() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("kiln.toml"),
            r#"
[build]
entries = { index = "frontend/src/index.js", style = "frontend/src/index.scss" }
out_dir = "frontend/dist"
library = "NSCR"
"#,
        )
        .unwrap();

        let config = ConfigDiscovery::new(dir.path())
            .load(None, &ConfigOverrides::default())
            .unwrap();
        assert_eq!(config.build.entries.len(), 2);
        assert_eq!(config.build.out_dir, PathBuf::from("frontend/dist"));
        assert_eq!(config.build.library.as_deref(), Some("NSCR"));
        assert_eq!(config.build.inline_limit, 10 * 1024);
    }

    #[test]
    #[serial]
    fn load_from_package_json() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{
                "name": "test",
                "kiln": {
                    "build": {
                        "entries": { "index": "index.js" }
                    }
                }
            }"#,
        )
        .unwrap();

        let config = ConfigDiscovery::new(dir.path())
            .load(None, &ConfigOverrides::default())
            .unwrap();
        assert_eq!(config.build.entries["index"], PathBuf::from("index.js"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = ConfigDiscovery::new(dir.path())
            .load(Some(Path::new("missing.toml")), &ConfigOverrides::default());
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }
}
