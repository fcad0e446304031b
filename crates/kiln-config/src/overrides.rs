//! Command-line overrides layered on top of file and environment configuration.
//!
//! Only fields that were explicitly set are serialized, so merging an
//! `ConfigOverrides` through figment never resets a value to its default.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "BuildOverrides::is_empty")]
    pub build: BuildOverrides,

    #[serde(skip_serializing_if = "DevOverrides::is_empty")]
    pub dev: DevOverrides,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildOverrides {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub entries: BTreeMap<String, PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_limit: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sourcemap: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<bool>,
}

impl BuildOverrides {
    fn is_empty(&self) -> bool {
        self.entries.is_empty()
            && self.out_dir.is_none()
            && self.public_path.is_none()
            && self.inline_limit.is_none()
            && self.sourcemap.is_none()
            && self.manifest.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DevOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hot: Option<bool>,
}

impl DevOverrides {
    fn is_empty(&self) -> bool {
        self.host.is_none() && self.port.is_none() && self.cors.is_none() && self.hot.is_none()
    }
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.build.is_empty() && self.dev.is_empty()
    }
}
