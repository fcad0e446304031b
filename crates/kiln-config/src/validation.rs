//! Configuration validation.
//!
//! `validate` checks the document on its own; `validate_fs` additionally checks
//! that entry files exist relative to a project root.

use std::path::Path;

use path_clean::PathClean;

use crate::config::KilnConfig;
use crate::error::{ConfigError, Result};

impl KilnConfig {
    pub fn validate(&self) -> Result<()> {
        if self.build.entries.is_empty() {
            return Err(ConfigError::NoEntries);
        }

        for name in self.build.entries.keys() {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(ConfigError::InvalidValue {
                    field: format!("build.entries.{name}"),
                    hint: Some("entry names become file names and may not contain path separators".into()),
                });
            }
        }

        if self.build.inline_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "build.inline_limit".to_string(),
                hint: Some("must be greater than zero".to_string()),
            });
        }

        check_url_prefix("build.public_path", &self.build.public_path)?;
        check_url_prefix("dev.public_path", &self.dev.public_path)?;

        if self.dev.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dev.port".to_string(),
                hint: Some("port must be between 1 and 65535".to_string()),
            });
        }

        if let Some(copy) = &self.copy {
            if copy.to.is_absolute()
                || copy
                    .to
                    .components()
                    .any(|c| matches!(c, std::path::Component::ParentDir))
            {
                return Err(ConfigError::InvalidValue {
                    field: "copy.to".to_string(),
                    hint: Some("must be a relative path inside the output directory".to_string()),
                });
            }
        }

        Ok(())
    }

    /// Validate against the filesystem. Entries must exist relative to `root`,
    /// and the output directory must be a strict subdirectory of `root` that
    /// holds no entry and does not overlap the copy source.
    pub fn validate_fs(&self, root: &Path) -> Result<()> {
        self.check_out_dir(root)?;
        for (name, path) in &self.build.entries {
            let full = root.join(path);
            if !full.is_file() {
                return Err(ConfigError::EntryNotFound {
                    name: name.clone(),
                    path: full,
                });
            }
        }
        Ok(())
    }

    fn check_out_dir(&self, root: &Path) -> Result<()> {
        let root = root.clean();
        let out = root.join(&self.build.out_dir).clean();
        let reject = |hint: String| {
            Err(ConfigError::InvalidValue {
                field: "build.out_dir".to_string(),
                hint: Some(hint),
            })
        };

        if out == root || !out.starts_with(&root) {
            return reject(format!(
                "'{}' must be a subdirectory of the project root; the clean step empties it",
                self.build.out_dir.display()
            ));
        }
        for (name, path) in &self.build.entries {
            if root.join(path).clean().starts_with(&out) {
                return reject(format!("'{}' contains entry '{}'", self.build.out_dir.display(), name));
            }
        }
        if let Some(copy) = &self.copy {
            let from = root.join(&copy.from).clean();
            if from.starts_with(&out) || out.starts_with(&from) {
                return reject(format!(
                    "'{}' overlaps the copy source '{}'",
                    self.build.out_dir.display(),
                    copy.from.display()
                ));
            }
        }
        Ok(())
    }
}

fn check_url_prefix(field: &str, value: &str) -> Result<()> {
    if value.starts_with('/') && value.ends_with('/') {
        return Ok(());
    }
    // Absolute URLs are accepted as long as they end in a slash.
    if (value.starts_with("http://") || value.starts_with("https://")) && value.ends_with('/') {
        return Ok(());
    }
    Err(ConfigError::InvalidValue {
        field: field.to_string(),
        hint: Some(format!("'{value}' must start and end with '/'")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn with_entry() -> KilnConfig {
        let mut config = KilnConfig::default();
        config
            .build
            .entries
            .insert("index".to_string(), PathBuf::from("src/index.js"));
        config
    }

    #[test]
    fn empty_entries_fail() {
        assert!(matches!(
            KilnConfig::default().validate(),
            Err(ConfigError::NoEntries)
        ));
    }

    #[test]
    fn default_with_entry_is_valid() {
        assert!(with_entry().validate().is_ok());
    }

    #[test]
    fn zero_inline_limit_fails() {
        let mut config = with_entry();
        config.build.inline_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn public_path_needs_slashes() {
        let mut config = with_entry();
        config.build.public_path = "static".to_string();
        assert!(config.validate().is_err());

        config.build.public_path = "https://cdn.example.com/assets/".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn entry_names_cannot_be_paths() {
        let mut config = with_entry();
        config
            .build
            .entries
            .insert("nested/name".to_string(), PathBuf::from("a.js"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn copy_target_cannot_escape_output() {
        let mut config = with_entry();
        config.copy = Some(crate::CopySection {
            from: PathBuf::from("vendor"),
            to: PathBuf::from("../outside"),
        });
        assert!(config.validate().is_err());
    }

    fn out_dir_error(config: &KilnConfig, root: &Path) -> Option<String> {
        match config.validate_fs(root) {
            Err(ConfigError::InvalidValue { field, .. }) => Some(field),
            _ => None,
        }
    }

    #[test]
    fn out_dir_must_be_below_the_root() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/index.js"), "").unwrap();

        let mut config = with_entry();
        for out_dir in [".", "..", "src/..", "/"] {
            config.build.out_dir = PathBuf::from(out_dir);
            assert_eq!(out_dir_error(&config, dir.path()).as_deref(), Some("build.out_dir"), "{out_dir}");
        }

        config.build.out_dir = PathBuf::from("frontend/dist");
        assert!(config.validate_fs(dir.path()).is_ok());
    }

    #[test]
    fn out_dir_cannot_hold_sources() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/index.js"), "").unwrap();

        let mut config = with_entry();
        config.build.out_dir = PathBuf::from("src");
        assert_eq!(out_dir_error(&config, dir.path()).as_deref(), Some("build.out_dir"));

        config.build.out_dir = PathBuf::from("vendor");
        config.copy = Some(crate::CopySection {
            from: PathBuf::from("vendor/assets"),
            to: PathBuf::from("govuk"),
        });
        assert_eq!(out_dir_error(&config, dir.path()).as_deref(), Some("build.out_dir"));
    }

    #[test]
    fn validate_fs_reports_missing_entry() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = with_entry().validate_fs(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::EntryNotFound { ref name, .. } if name == "index"));
    }
}
