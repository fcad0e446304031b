//! URL stages: inline small assets as data URIs, emit the rest as files.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::bail;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use regex::Regex;
use sha2::{Digest, Sha256};

use super::{Payload, Transform, TransformContext, UrlModule, UrlPlacement, digest};
use crate::asset::AssetClass;

/// Deterministic output name for an emitted asset: `stem-<hash8>.ext`, where
/// the hash is SHA-256 of the project-relative source path.
pub fn emitted_file_name(rel: &str) -> String {
    let path = Path::new(rel);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("asset");
    let hash = Sha256::digest(rel.as_bytes());
    let short: String = hash.iter().take(4).map(|b| format!("{:02x}", b)).collect();
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}-{}.{}", stem, short, ext),
        None => format!("{}-{}", stem, short),
    }
}

fn source_bytes(input: Payload, stage: &str) -> anyhow::Result<std::sync::Arc<[u8]>> {
    match input {
        Payload::Bytes(bytes) => Ok(bytes),
        other => bail!("{} stage expects asset bytes, got {}", stage, other.kind_name()),
    }
}

/// Emit or inline depending on size. Without a limit everything is emitted.
fn place(
    bytes: std::sync::Arc<[u8]>,
    cx: &mut TransformContext<'_>,
    inline: impl FnOnce(&[u8]) -> String,
) -> Payload {
    let size = bytes.len() as u64;
    let digest = digest(&bytes);
    let placement = match cx.options.inline_limit {
        Some(limit) if size < limit => UrlPlacement::Inline(inline(&bytes)),
        _ => {
            let file_name = emitted_file_name(&cx.asset.rel);
            cx.emit(file_name.clone(), bytes);
            UrlPlacement::Emitted(file_name)
        }
    };
    tracing::debug!(path = %cx.asset.rel, size, ?placement, "placed url asset");
    Payload::Url(UrlModule {
        placement,
        size,
        digest,
    })
}

/// Base64 data URI below `inline_limit`, emitted file otherwise.
#[derive(Debug, Default)]
pub struct UrlInline;

impl Transform for UrlInline {
    fn name(&self) -> &'static str {
        "url-inline"
    }

    fn apply(&self, input: Payload, cx: &mut TransformContext<'_>) -> anyhow::Result<Payload> {
        let bytes = source_bytes(input, self.name())?;
        let mime = AssetClass::mime_for(&cx.asset.path);
        Ok(place(bytes, cx, |b| {
            format!("data:{};base64,{}", mime, STANDARD.encode(b))
        }))
    }
}

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// URL-encoded (not base64) SVG data URI below `inline_limit`. Double quotes
/// become single quotes so the URI can sit inside a quoted CSS `url()`.
#[derive(Debug, Default)]
pub struct SvgUrlInline;

impl Transform for SvgUrlInline {
    fn name(&self) -> &'static str {
        "svg-url-inline"
    }

    fn apply(&self, input: Payload, cx: &mut TransformContext<'_>) -> anyhow::Result<Payload> {
        let bytes = source_bytes(input, self.name())?;
        Ok(place(bytes, cx, svg_data_uri))
    }
}

fn svg_data_uri(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = WHITESPACE.replace_all(text.trim(), " ");
    let mut out = String::from("data:image/svg+xml,");
    for c in text.chars() {
        match c {
            '"' => out.push('\''),
            '%' => out.push_str("%25"),
            '#' => out.push_str("%23"),
            '<' => out.push_str("%3C"),
            '>' => out.push_str("%3E"),
            '{' => out.push_str("%7B"),
            '}' => out.push_str("%7D"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::SourceAsset;
    use crate::rules::RuleOptions;
    use crate::transform::EmittedAsset;
    use std::path::PathBuf;

    fn run(
        stage: &dyn Transform,
        rel: &str,
        bytes: Vec<u8>,
        limit: Option<u64>,
    ) -> (UrlModule, Vec<EmittedAsset>) {
        let asset = SourceAsset::new(PathBuf::from("/p").join(rel), rel.to_string(), bytes);
        let options = RuleOptions {
            inline_limit: limit,
            ..RuleOptions::default()
        };
        let mut cx = TransformContext::new(&asset, "images", &options);
        let out = stage
            .apply(Payload::Bytes(asset.content.clone()), &mut cx)
            .unwrap();
        let (_, emitted, _) = cx.finish();
        match out {
            Payload::Url(url) => (url, emitted),
            other => panic!("expected url, got {:?}", other),
        }
    }

    #[test]
    fn small_assets_are_inlined() {
        let (url, emitted) = run(&UrlInline, "img/dot.png", vec![1, 2, 3], Some(10));
        assert_eq!(url.placement, UrlPlacement::Inline("data:image/png;base64,AQID".into()));
        assert_eq!(url.size, 3);
        assert!(emitted.is_empty());
    }

    #[test]
    fn limit_is_exclusive() {
        let (url, emitted) = run(&UrlInline, "img/dot.png", vec![0; 10], Some(10));
        assert!(matches!(url.placement, UrlPlacement::Emitted(_)));
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].content.len(), 10);
    }

    #[test]
    fn emitted_names_are_stable() {
        let a = emitted_file_name("frontend/images/banner.jpg");
        let b = emitted_file_name("frontend/images/banner.jpg");
        let c = emitted_file_name("other/banner.jpg");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("banner-"));
        assert!(a.ends_with(".jpg"));
        assert_eq!(a.len(), "banner-".len() + 8 + ".jpg".len());
    }

    #[test]
    fn svg_uri_is_url_encoded() {
        let svg = b"<svg xmlns=\"http://www.w3.org/2000/svg\">\n  <path fill=\"#fff\"/>\n</svg>";
        let (url, _) = run(&SvgUrlInline, "icons/a.svg", svg.to_vec(), Some(1024));
        assert_eq!(
            url.placement,
            UrlPlacement::Inline(
                "data:image/svg+xml,%3Csvg xmlns='http://www.w3.org/2000/svg'%3E %3Cpath fill='%23fff'/%3E %3C/svg%3E"
                    .into()
            )
        );
    }
}
