//! End-to-end tests for `kiln build`, run against the real binary.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn kiln() -> Command {
    let mut cmd = cargo_bin_cmd!("kiln");
    cmd.arg("--no-color").env_remove("RUST_LOG");
    cmd
}

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(
        root,
        "frontend/src/index.js",
        b"import './main.css';\nimport logo from './img/logo.svg';\nexport const src = logo;\n",
    );
    write(root, "frontend/src/main.css", b".govuk-header { color: #0b0c0c; }\n");
    write(
        root,
        "frontend/src/img/logo.svg",
        b"<svg xmlns=\"http://www.w3.org/2000/svg\"><rect width=\"1\" height=\"1\"/></svg>",
    );
    write(root, "vendor/assets/fonts/bold.woff2", b"font");
    write(
        root,
        "kiln.toml",
        b"[build]\n\
          entries = { index = \"frontend/src/index.js\" }\n\
          out_dir = \"frontend/dist\"\n\
          public_path = \"/frontend/dist/\"\n\
          \n\
          [copy]\n\
          from = \"vendor/assets\"\n\
          to = \"govuk\"\n",
    );
    dir
}

#[test]
fn help_lists_commands() {
    kiln()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build").and(predicate::str::contains("serve")));
}

#[test]
fn production_build_writes_bundle_stylesheet_and_copy() {
    let dir = project();
    kiln()
        .args(["build", "--cwd"])
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Build Summary"));

    let dist = dir.path().join("frontend/dist");
    let js = fs::read_to_string(dist.join("index.js")).unwrap();
    assert!(js.contains("var NSCR"));
    assert!(dist.join("index.css").is_file());
    assert!(dist.join("index.js.map").is_file());
    assert_eq!(fs::read(dist.join("govuk/fonts/bold.woff2")).unwrap(), b"font");
}

#[test]
fn development_build_injects_css() {
    let dir = project();
    kiln()
        .args(["build", "--mode", "development", "--no-sourcemap", "--cwd"])
        .arg(dir.path())
        .assert()
        .success();

    let dist = dir.path().join("frontend/dist");
    assert!(dist.join("index.js").is_file());
    assert!(!dist.join("index.css").exists());
    assert!(!dist.join("index.js.map").exists());
}

#[test]
fn entry_and_out_dir_flags_override_config() {
    let dir = project();
    write(dir.path(), "frontend/src/other.js", b"export default 1;\n");
    kiln()
        .args(["build", "--entry", "other=frontend/src/other.js", "--out-dir", "out", "--cwd"])
        .arg(dir.path())
        .assert()
        .success();

    let out = dir.path().join("out");
    assert!(out.join("other.js").is_file());
    assert!(out.join("index.js").is_file());
    assert!(!dir.path().join("frontend/dist/index.js").exists());
}

#[test]
fn environment_overrides_file() {
    let dir = project();
    kiln()
        .args(["build", "--cwd"])
        .arg(dir.path())
        .env("KILN_BUILD__OUT_DIR", "env-dist")
        .assert()
        .success();
    assert!(dir.path().join("env-dist/index.js").is_file());
}

#[test]
fn clean_removes_stale_output_but_keeps_gitkeep() {
    let dir = project();
    write(dir.path(), "frontend/dist/stale.js", b"old");
    write(dir.path(), "frontend/dist/.gitkeep", b"");

    kiln().args(["build", "--cwd"]).arg(dir.path()).assert().success();

    let dist = dir.path().join("frontend/dist");
    assert!(!dist.join("stale.js").exists());
    assert!(dist.join(".gitkeep").exists());
}

#[test]
fn missing_entries_fail_with_help() {
    let dir = TempDir::new().unwrap();
    kiln()
        .args(["build", "--cwd"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no entries specified"));
}

#[test]
fn out_dir_at_project_root_is_refused() {
    let dir = project();
    kiln()
        .args(["build", "--out-dir", ".", "--cwd"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("build.out_dir"));

    assert!(dir.path().join("kiln.toml").exists());
    assert!(dir.path().join("frontend/src/index.js").exists());
}

#[test]
fn missing_entry_file_is_reported() {
    let dir = TempDir::new().unwrap();
    kiln()
        .args(["build", "--entry", "index=src/nope.js", "--cwd"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("src/nope.js"));
}

#[test]
fn unresolved_import_fails_the_build() {
    let dir = project();
    write(dir.path(), "frontend/src/index.js", b"import './missing.js';\n");
    kiln()
        .args(["build", "--cwd"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("kiln::unresolved_import"));
}

#[test]
fn invalid_mode_is_rejected_by_clap() {
    kiln()
        .args(["build", "--mode", "staging"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("staging"));
}
