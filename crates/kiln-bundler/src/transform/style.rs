//! Stylesheet stages.
//!
//! `stylesheet` parses and prints the sheet with lightningcss, records local
//! `@import`/`@use` references as stylesheet imports (the router concatenates
//! them before the importer) and `url()` references as asset imports.
//! `style-inject` and `style-extract` pick where the linked CSS ends up.

use std::sync::LazyLock;

use anyhow::{Context, anyhow, bail};
use lightningcss::{
    printer::PrinterOptions,
    stylesheet::{MinifyOptions, ParserOptions, StyleSheet},
};
use regex::Regex;

use super::{Payload, StyleModule, Transform, TransformContext};
use crate::rules::StyleSink;
use crate::runtime::ImportKind;

/// Stands in for the public path inside inlined CSS. The bundle runtime
/// substitutes it when the sheet is injected.
pub const PUBLIC_PATH_PLACEHOLDER: &str = "__KILN_PUBLIC_PATH__";

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@(?:import|use)\s+(?:url\(\s*)?["']([^"']+)["']\s*\)?[^;]*;"#)
        .expect("valid import regex")
});

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*(?:"([^"]*)"|'([^']*)'|([^)\s"']*))\s*\)"#).expect("valid url regex")
});

/// True for references that are never resolved: remote, protocol-relative,
/// data URIs, fragments and absolute paths.
pub(crate) fn is_external(spec: &str) -> bool {
    let lower = spec.to_ascii_lowercase();
    spec.is_empty()
        || lower.starts_with("data:")
        || lower.starts_with("http:")
        || lower.starts_with("https:")
        || spec.starts_with("//")
        || spec.starts_with('#')
        || spec.starts_with('/')
}

/// Sass built-in modules (`sass:math`, `sass:color`, ...) have no file behind them.
fn is_sass_builtin(spec: &str) -> bool {
    spec.starts_with("sass:")
}

/// Remove `/* */` comments and whole-line `//` comments, leaving quoted
/// strings alone. Newlines inside comments are kept so line numbers hold.
pub(crate) fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut quote: Option<char> = None;
    let mut line_start = true;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == q || c == '\n' {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                quote = Some(c);
                out.push(c);
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    if n == '\n' {
                        out.push('\n');
                    }
                    prev = n;
                }
                continue;
            }
            '/' if line_start && chars.peek() == Some(&'/') => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        out.push('\n');
                        break;
                    }
                }
                continue;
            }
            _ => out.push(c),
        }
        if c == '\n' {
            line_start = true;
        } else if !c.is_whitespace() {
            line_start = false;
        }
    }
    out
}

/// Drop `?query` and `#hash` suffixes (e.g. `font.eot?#iefix`).
pub(crate) fn strip_suffix(spec: &str) -> &str {
    spec.split(['?', '#']).next().unwrap_or(spec)
}

/// Visit every `url()` reference in `css`, replacing it with the closure's
/// result. `None` keeps the original text.
pub(crate) fn replace_urls(css: &str, mut f: impl FnMut(&str) -> Option<String>) -> String {
    URL_RE
        .replace_all(css, |caps: &regex::Captures<'_>| {
            let raw = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match f(raw) {
                Some(url) => format!("url({})", quote_url(&url)),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn quote_url(url: &str) -> String {
    if url.contains(['"', '(', ')', ' ', '\'']) {
        format!("\"{}\"", url.replace('"', "\\\""))
    } else {
        url.to_string()
    }
}

#[derive(Debug, Default)]
pub struct StylesheetTransform;

impl Transform for StylesheetTransform {
    fn name(&self) -> &'static str {
        "stylesheet"
    }

    fn apply(&self, input: Payload, cx: &mut TransformContext<'_>) -> anyhow::Result<Payload> {
        let Payload::Bytes(bytes) = input else {
            bail!("stylesheet stage expects source bytes, got {}", input.kind_name());
        };
        let source = std::str::from_utf8(&bytes).context("stylesheet is not valid UTF-8")?;

        let source = strip_comments(source);
        let mut stripped = String::with_capacity(source.len());
        let mut last = 0;
        for caps in IMPORT_RE.captures_iter(&source) {
            let (whole, spec) = (&caps[0], &caps[1]);
            if is_external(spec) {
                continue;
            }
            let m = caps.get(0).map(|m| m.range()).unwrap_or_default();
            stripped.push_str(&source[last..m.start]);
            last = m.end;
            if is_sass_builtin(spec) {
                tracing::trace!(import = %whole, "dropped sass built-in module");
                continue;
            }
            cx.add_import(spec, ImportKind::Stylesheet);
            tracing::trace!(import = %whole, "hoisted stylesheet import");
        }
        stripped.push_str(&source[last..]);

        let css = print(&stripped, cx)?;

        let mut urls = Vec::new();
        replace_urls(&css, |raw| {
            if !is_external(raw) {
                let spec = strip_suffix(raw).to_string();
                if !urls.contains(&spec) {
                    urls.push(spec);
                }
            }
            None
        });
        for spec in &urls {
            cx.add_import(spec.clone(), ImportKind::Asset);
        }

        Ok(Payload::Style(StyleModule {
            css,
            urls,
            sink: None,
        }))
    }
}

fn print(source: &str, cx: &TransformContext<'_>) -> anyhow::Result<String> {
    let filename = cx.asset.path.to_string_lossy().to_string();
    let minify = cx.options.minify;

    let mut stylesheet = StyleSheet::parse(
        source,
        ParserOptions {
            filename,
            // Preprocessor syntax is dropped rule by rule instead of failing the sheet.
            error_recovery: cx.asset.rel.ends_with(".scss"),
            ..Default::default()
        },
    )
    .map_err(|e| anyhow!("failed to parse stylesheet: {}", e))?;

    if minify {
        stylesheet
            .minify(MinifyOptions::default())
            .map_err(|e| anyhow!("failed to minify stylesheet: {}", e))?;
    }

    let result = stylesheet
        .to_css(PrinterOptions {
            minify,
            ..Default::default()
        })
        .map_err(|e| anyhow!("failed to print stylesheet: {}", e))?;

    Ok(result.code)
}

fn with_sink(input: Payload, sink: StyleSink, stage: &str) -> anyhow::Result<Payload> {
    match input {
        Payload::Style(mut style) => {
            style.sink = Some(sink);
            Ok(Payload::Style(style))
        }
        other => bail!("{} stage expects a stylesheet, got {}", stage, other.kind_name()),
    }
}

/// Inject the stylesheet into the page at runtime.
#[derive(Debug, Default)]
pub struct StyleInject;

impl Transform for StyleInject {
    fn name(&self) -> &'static str {
        "style-inject"
    }

    fn apply(&self, input: Payload, _cx: &mut TransformContext<'_>) -> anyhow::Result<Payload> {
        with_sink(input, StyleSink::Inject, self.name())
    }
}

/// Extract the stylesheet into the entry's `.css` file.
#[derive(Debug, Default)]
pub struct StyleExtract;

impl Transform for StyleExtract {
    fn name(&self) -> &'static str {
        "style-extract"
    }

    fn apply(&self, input: Payload, _cx: &mut TransformContext<'_>) -> anyhow::Result<Payload> {
        with_sink(input, StyleSink::Extract, self.name())
    }
}
