//! Lossless image optimisation.
//!
//! Strips metadata that browsers never read: ancillary PNG chunks, JPEG
//! application segments and comments, SVG comments/prologs/metadata and
//! inter-tag whitespace. Pixel data is never touched. Input that does not
//! parse as its format passes through unchanged.

use std::sync::{Arc, LazyLock};

use anyhow::bail;
use regex::Regex;

use super::{Payload, Transform, TransformContext};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Ancillary chunks that affect rendering and are kept.
const PNG_KEEP: &[&[u8; 4]] = &[b"tRNS", b"gAMA", b"sRGB", b"PLTE", b"cHRM", b"iCCP"];

#[derive(Debug, Default)]
pub struct OptimiseImages;

impl Transform for OptimiseImages {
    fn name(&self) -> &'static str {
        "optimise-images"
    }

    fn apply(&self, input: Payload, cx: &mut TransformContext<'_>) -> anyhow::Result<Payload> {
        let Payload::Bytes(bytes) = input else {
            bail!("image optimisation expects source bytes, got {}", input.kind_name());
        };
        if !cx.options.optimise_images {
            return Ok(Payload::Bytes(bytes));
        }

        let ext = cx
            .asset
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let optimised = match ext.as_str() {
            "png" => optimise_png(&bytes),
            "jpg" | "jpeg" => optimise_jpeg(&bytes),
            "svg" => std::str::from_utf8(&bytes)
                .ok()
                .map(|text| optimise_svg(text).into_bytes()),
            _ => None,
        };

        match optimised {
            Some(out) if out.len() < bytes.len() => {
                tracing::debug!(
                    path = %cx.asset.rel,
                    before = bytes.len(),
                    after = out.len(),
                    "optimised image"
                );
                Ok(Payload::Bytes(Arc::from(out)))
            }
            Some(_) => Ok(Payload::Bytes(bytes)),
            None => {
                tracing::debug!(path = %cx.asset.rel, "image not optimised, passing through");
                Ok(Payload::Bytes(bytes))
            }
        }
    }
}

/// Keep critical chunks and the rendering-relevant ancillary ones.
fn optimise_png(data: &[u8]) -> Option<Vec<u8>> {
    let mut rest = data.strip_prefix(PNG_SIGNATURE)?;
    let mut out = Vec::with_capacity(data.len());
    out.extend_from_slice(PNG_SIGNATURE);

    while !rest.is_empty() {
        if rest.len() < 12 {
            return None;
        }
        let len = u32::from_be_bytes(rest[0..4].try_into().ok()?) as usize;
        let total = len.checked_add(12)?;
        if rest.len() < total {
            return None;
        }
        let kind: &[u8; 4] = rest[4..8].try_into().ok()?;
        // Uppercase first letter marks a critical chunk.
        let critical = kind[0].is_ascii_uppercase();
        if critical || PNG_KEEP.contains(&kind) {
            out.extend_from_slice(&rest[..total]);
        }
        let done = kind == b"IEND";
        rest = &rest[total..];
        if done {
            break;
        }
    }
    Some(out)
}

/// Drop APP1..APP13, APP15 and COM segments. APP0 (JFIF) and APP14 (Adobe
/// colour transform) are kept.
fn optimise_jpeg(data: &[u8]) -> Option<Vec<u8>> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }
    let mut out = Vec::with_capacity(data.len());
    out.extend_from_slice(&data[..2]);
    let mut pos = 2;

    loop {
        if pos + 4 > data.len() || data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        // Start of scan: the rest is entropy-coded data.
        if marker == 0xDA {
            out.extend_from_slice(&data[pos..]);
            return Some(out);
        }
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let end = pos + 2 + len;
        if len < 2 || end > data.len() {
            return None;
        }
        let strip = matches!(marker, 0xE1..=0xED | 0xEF | 0xFE);
        if !strip {
            out.extend_from_slice(&data[pos..end]);
        }
        pos = end;
    }
}

static SVG_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static SVG_PROLOG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<\?xml.*?\?>|<!DOCTYPE[^>]*>").expect("valid regex"));
static SVG_METADATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<metadata\b.*?</metadata>").expect("valid regex"));
static SVG_BETWEEN_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s+<").expect("valid regex"));

fn optimise_svg(text: &str) -> String {
    let text = SVG_COMMENT.replace_all(text, "");
    let text = SVG_PROLOG.replace_all(&text, "");
    let text = SVG_METADATA.replace_all(&text, "");
    let text = SVG_BETWEEN_TAGS.replace_all(&text, "><");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::SourceAsset;
    use crate::rules::RuleOptions;
    use std::path::PathBuf;

    fn chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = (data.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        out.extend_from_slice(&[0, 0, 0, 0]);
        out
    }

    fn png() -> Vec<u8> {
        let mut out = PNG_SIGNATURE.to_vec();
        out.extend(chunk(b"IHDR", &[0; 13]));
        out.extend(chunk(b"tEXt", b"Comment\0made with an editor"));
        out.extend(chunk(b"gAMA", &[0, 0, 0xB1, 0x8F]));
        out.extend(chunk(b"IDAT", &[1, 2, 3]));
        out.extend(chunk(b"IEND", &[]));
        out
    }

    fn run(rel: &str, bytes: Vec<u8>, optimise: bool) -> Vec<u8> {
        let asset = SourceAsset::new(PathBuf::from("/p").join(rel), rel.to_string(), bytes);
        let options = RuleOptions {
            optimise_images: optimise,
            ..RuleOptions::default()
        };
        let mut cx = TransformContext::new(&asset, "images", &options);
        match OptimiseImages
            .apply(Payload::Bytes(asset.content.clone()), &mut cx)
            .unwrap()
        {
            Payload::Bytes(b) => b.to_vec(),
            other => panic!("expected bytes, got {:?}", other),
        }
    }

    #[test]
    fn png_text_chunks_are_stripped() {
        let input = png();
        let out = optimise_png(&input).unwrap();
        assert!(out.len() < input.len());
        assert!(!out.windows(4).any(|w| w == b"tEXt"));
        assert!(out.windows(4).any(|w| w == b"gAMA"));
        assert!(out.windows(4).any(|w| w == b"IDAT"));
    }

    #[test]
    fn jpeg_exif_is_stripped() {
        let mut input = vec![0xFF, 0xD8];
        input.extend([0xFF, 0xE0, 0x00, 0x04, 0xAA, 0xBB]);
        input.extend([0xFF, 0xE1, 0x00, 0x06, 1, 2, 3, 4]);
        input.extend([0xFF, 0xFE, 0x00, 0x03, b'x']);
        input.extend([0xFF, 0xDA, 0x00, 0x02, 9, 9, 0xFF, 0xD9]);

        let out = optimise_jpeg(&input).unwrap();
        assert_eq!(
            out,
            vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0xAA, 0xBB, 0xFF, 0xDA, 0x00, 0x02, 9, 9, 0xFF, 0xD9]
        );
    }

    #[test]
    fn svg_metadata_is_stripped() {
        let svg = "<?xml version=\"1.0\"?>\n<!-- editor -->\n<svg xmlns=\"http://www.w3.org/2000/svg\">\n  <metadata>x</metadata>\n  <path d=\"M0 0\"/>\n</svg>\n";
        assert_eq!(
            optimise_svg(svg),
            "<svg xmlns=\"http://www.w3.org/2000/svg\"><path d=\"M0 0\"/></svg>"
        );
    }

    #[test]
    fn disabled_optimisation_passes_through() {
        let input = png();
        assert_eq!(run("logo.png", input.clone(), false), input);
        assert!(run("logo.png", input.clone(), true).len() < input.len());
    }

    #[test]
    fn corrupt_input_passes_through() {
        let input = b"not a png".to_vec();
        assert_eq!(run("broken.png", input.clone(), true), input);
    }
}
