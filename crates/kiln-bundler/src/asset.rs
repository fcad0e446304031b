//! Source assets and their extension classes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Coarse classification of a source file by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Script,
    Stylesheet,
    Image,
    Vector,
    Font,
    Data,
    Other,
}

impl AssetClass {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "js" | "mjs" | "cjs" => AssetClass::Script,
            "css" | "scss" => AssetClass::Stylesheet,
            "png" | "jpg" | "jpeg" | "gif" => AssetClass::Image,
            "svg" => AssetClass::Vector,
            "eot" | "ttf" | "woff" | "woff2" => AssetClass::Font,
            "json" => AssetClass::Data,
            _ => AssetClass::Other,
        }
    }

    /// MIME type used for data URIs and HTTP responses.
    pub fn mime_for(path: &Path) -> &'static str {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "js" | "mjs" | "cjs" => "application/javascript",
            "json" | "map" => "application/json",
            "css" => "text/css",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "svg" => "image/svg+xml",
            "woff" => "font/woff",
            "woff2" => "font/woff2",
            "ttf" => "font/ttf",
            "eot" => "application/vnd.ms-fontobject",
            "html" => "text/html; charset=utf-8",
            "ico" => "image/x-icon",
            _ => "application/octet-stream",
        }
    }
}

/// A file read from the source tree. Immutable once read.
#[derive(Debug, Clone)]
pub struct SourceAsset {
    /// Absolute, normalized path.
    pub path: PathBuf,
    /// Path relative to the project root, with forward slashes. Used as the
    /// module id and as the key for deterministic naming.
    pub rel: String,
    pub content: Arc<[u8]>,
    pub class: AssetClass,
}

impl SourceAsset {
    pub fn new(path: PathBuf, rel: String, content: Vec<u8>) -> Self {
        let class = AssetClass::from_path(&path);
        Self {
            path,
            rel,
            content: content.into(),
            class,
        }
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    /// Content as UTF-8 text, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

/// Project-relative id for `path`, falling back to the full path for files
/// outside the root (e.g. a hoisted `node_modules`).
pub fn relative_id(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .filter(|s| s != "/" && s != "\\")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_follow_extensions() {
        assert_eq!(AssetClass::from_path(Path::new("a/index.js")), AssetClass::Script);
        assert_eq!(AssetClass::from_path(Path::new("a/index.scss")), AssetClass::Stylesheet);
        assert_eq!(AssetClass::from_path(Path::new("a/logo.JPG")), AssetClass::Image);
        assert_eq!(AssetClass::from_path(Path::new("a/icon.svg")), AssetClass::Vector);
        assert_eq!(AssetClass::from_path(Path::new("a/font.woff2")), AssetClass::Font);
        assert_eq!(AssetClass::from_path(Path::new("a/data.json")), AssetClass::Data);
        assert_eq!(AssetClass::from_path(Path::new("README")), AssetClass::Other);
    }

    #[test]
    fn relative_id_uses_forward_slashes() {
        let root = Path::new("/project");
        assert_eq!(
            relative_id(root, Path::new("/project/frontend/src/index.js")),
            "frontend/src/index.js"
        );
    }

    #[test]
    fn size_is_byte_length() {
        let asset = SourceAsset::new(
            PathBuf::from("/p/a.png"),
            "a.png".to_string(),
            vec![0u8; 42],
        );
        assert_eq!(asset.size(), 42);
        assert_eq!(asset.class, AssetClass::Image);
    }
}
