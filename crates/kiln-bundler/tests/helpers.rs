//! Shared fixtures for kiln-bundler integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use kiln_bundler::{BuildOutput, OutputArtifact, PipelineConfig};
use tempfile::TempDir;

pub const INLINE_LIMIT: u64 = 10 * 1024;

/// PNG with `pixels` bytes of image data and `comment` bytes of text metadata.
pub fn png(pixels: usize, comment: usize) -> Vec<u8> {
    fn chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        out.extend_from_slice(&[0, 0, 0, 0]);
    }
    let mut out = b"\x89PNG\r\n\x1a\n".to_vec();
    chunk(&mut out, b"IHDR", &[0; 13]);
    chunk(&mut out, b"tEXt", &vec![b'x'; comment]);
    chunk(&mut out, b"IDAT", &vec![7; pixels]);
    chunk(&mut out, b"IEND", &[]);
    out
}

pub fn write(root: &Path, rel: &str, content: impl AsRef<[u8]>) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("fixture has a parent")).expect("create fixture dir");
    fs::write(path, content).expect("write fixture");
}

/// Entry `index` importing a stylesheet and two images of 5 KB and 20 KB.
pub fn scenario_project() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    let root = dir.path();
    write(
        root,
        "frontend/src/index.js",
        r#"import './main.css';
import small from './img/small.png';
import large from './img/large.png';

export function images() {
    return [small, large];
}
"#,
    );
    write(
        root,
        "frontend/src/main.css",
        ".hero {\n  color: red;\n}\n\n.footer {\n  margin: 0 auto;\n}\n",
    );
    write(root, "frontend/src/img/small.png", png(4500, 500));
    write(root, "frontend/src/img/large.png", png(19000, 1000));
    dir
}

pub fn scenario_config(root: &Path) -> PipelineConfig {
    PipelineConfig::new(root, "frontend/dist")
        .entry("index", "frontend/src/index.js")
        .library("NSCR")
        .public_path("/frontend/dist/")
        .inline_limit(INLINE_LIMIT)
}

pub fn text(output: &BuildOutput, name: &str) -> String {
    let file = output
        .file(name)
        .unwrap_or_else(|| panic!("missing output file {name}"));
    String::from_utf8_lossy(&file.content).into_owned()
}

pub fn artifact<'a>(output: &'a BuildOutput, entry: &str, name: &str) -> &'a OutputArtifact {
    output.manifest.entries[entry]
        .iter()
        .find(|a| a.name == name)
        .unwrap_or_else(|| panic!("missing artifact {name}"))
}
