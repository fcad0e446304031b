//! Links a routed graph into per-entry bundles.
//!
//! Each entry gets `name.js`: the module runtime applied to a table of module
//! factories, in dependency-first order. Extracted stylesheets are
//! concatenated into `name.css` in the same order, which keeps `@import`ed
//! sheets ahead of their importers. Entries are linked in parallel and their
//! artifacts collected into one manifest.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use oxc_sourcemap::{ConcatSourceMapBuilder, SourceMapBuilder};
use parking_lot::Mutex;
use rayon::prelude::*;
use rustc_hash::FxHashSet;

use super::{BuildOutput, HotModule, OutputFile};
use crate::Result;
use crate::manifest::{ArtifactKind, Generation, ManifestBuilder, OutputArtifact, Placement};
use crate::profile::PublicPath;
use crate::router::{RoutedGraph, RoutedModule};
use crate::rules::StyleSink;
use crate::transform::{
    PUBLIC_PATH_PLACEHOLDER, Payload, REQUIRE_IDENT, UrlPlacement, digest, is_external,
    js_string, replace_urls, strip_suffix,
};

/// Server-sent events endpoint the hot client connects to.
pub const HOT_EVENTS_PATH: &str = "/__kiln__/events";

const RUNTIME: &str = include_str!("../../assets/runtime.js");
const HOT_CLIENT: &str = include_str!("../../assets/hot-client.js");
const HOT_CLIENT_SLOT: &str = "  /*__KILN_HOT_CLIENT__*/\n";

#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub library: Option<String>,
    pub public_path: PublicPath,
    pub hot: bool,
    pub source_map: bool,
    pub manifest: bool,
    pub mode: String,
}

/// Link `graph` into a committed [`BuildOutput`] for `generation`.
pub fn link(graph: &RoutedGraph, options: &LinkOptions, generation: Generation) -> Result<BuildOutput> {
    let builder = Mutex::new(ManifestBuilder::default());
    let header = bundle_header(options);

    let linked: Vec<EntryOutput> = graph
        .entries
        .par_iter()
        .map(|(name, id)| {
            let out = link_entry(graph, name, id, &header, options)?;
            let mut manifest = builder.lock();
            for artifact in &out.artifacts {
                manifest.push(name, artifact.clone());
            }
            Ok(out)
        })
        .collect::<Result<_>>()?;

    let mut files = BTreeMap::new();
    let mut hot_modules = BTreeMap::new();
    for entry in linked {
        for file in entry.files {
            files.entry(file.name.clone()).or_insert(file);
        }
        hot_modules.extend(entry.hot_modules);
    }

    let manifest = builder.into_inner().commit(generation, &options.mode);

    if options.manifest {
        let json = manifest
            .to_json()
            .map_err(|e| crate::Error::WriteFailure(format!("Failed to serialize manifest: {}", e)))?;
        let content: Arc<[u8]> = json.into_bytes().into();
        files.insert(
            "manifest.json".to_string(),
            OutputFile {
                name: "manifest.json".to_string(),
                kind: ArtifactKind::Asset,
                digest: digest(&content),
                content,
            },
        );
    }

    tracing::info!(
        generation = generation.0,
        entries = graph.entries.len(),
        modules = graph.modules.len(),
        files = files.len(),
        "linked build"
    );

    Ok(BuildOutput {
        manifest,
        files,
        hot_modules,
    })
}

struct EntryOutput {
    files: Vec<OutputFile>,
    artifacts: Vec<OutputArtifact>,
    hot_modules: BTreeMap<String, HotModule>,
}

fn bundle_header(options: &LinkOptions) -> String {
    let runtime = if options.hot {
        RUNTIME.replace(HOT_CLIENT_SLOT, &format!("{}\n", HOT_CLIENT.trim_end()))
    } else {
        RUNTIME.replace(HOT_CLIENT_SLOT, "")
    };
    match &options.library {
        Some(library) => format!("var {} = {}", library, runtime.trim_end()),
        None => runtime.trim_end().to_string(),
    }
}

fn public_path_expr(public_path: &PublicPath) -> String {
    match public_path {
        PublicPath::Fixed(path) => js_string(path),
        PublicPath::ScriptRelative { fallback } => format!(
            "(function () {{ var s = typeof document !== \"undefined\" && document.currentScript; \
             return s && s.src ? s.src.replace(/[^\\/?#]*(?:[?#].*)?$/, \"\") : {}; }})()",
            js_string(fallback)
        ),
    }
}

/// Dependency-first order of the modules reachable from `entry`.
fn collect<'g>(graph: &'g RoutedGraph, entry: &str) -> Vec<&'g RoutedModule> {
    let mut order = Vec::new();
    let Some(root) = graph.get(entry) else {
        return order;
    };
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    seen.insert(&root.id);
    let mut stack = vec![(root, 0usize)];

    while let Some(top) = stack.last_mut() {
        let module = top.0;
        let next = module.deps.values().filter_map(|d| d.as_deref()).nth(top.1);
        top.1 += 1;
        match next {
            Some(dep) => {
                if seen.insert(dep) {
                    if let Some(dep) = graph.get(dep) {
                        stack.push((dep, 0));
                    }
                }
            }
            None => {
                order.push(module);
                stack.pop();
            }
        }
    }
    order
}

fn url_target<'g>(graph: &'g RoutedGraph, module: &RoutedModule, spec: &str) -> Option<&'g UrlPlacement> {
    let id = module.deps.get(spec)?.as_deref()?;
    match &graph.get(id)?.payload {
        Payload::Url(url) => Some(&url.placement),
        _ => None,
    }
}

/// CSS of a style module with `url()` references pointing at final locations.
fn resolve_css(graph: &RoutedGraph, module: &RoutedModule, css: &str, prefix: &str) -> String {
    replace_urls(css, |raw| {
        if is_external(raw) {
            return None;
        }
        Some(match url_target(graph, module, strip_suffix(raw))? {
            UrlPlacement::Inline(data) => data.clone(),
            UrlPlacement::Emitted(file) => format!("{}{}", prefix, file),
        })
    })
}

/// Body of the module's factory function.
fn factory_body(graph: &RoutedGraph, module: &RoutedModule) -> String {
    match &module.payload {
        Payload::Script(script) => script.code.clone(),
        Payload::Style(style) => match style.sink {
            Some(StyleSink::Inject) => {
                let mut body = String::new();
                for (spec, id) in &module.deps {
                    let is_style = id
                        .as_deref()
                        .and_then(|id| graph.get(id))
                        .is_some_and(|m| matches!(m.payload, Payload::Style(_)));
                    if is_style {
                        body.push_str(&format!("{}({}); ", REQUIRE_IDENT, js_string(spec)));
                    }
                }
                let css = resolve_css(graph, module, &style.css, PUBLIC_PATH_PLACEHOLDER);
                body.push_str(&format!(
                    "{}.s({}, {});",
                    REQUIRE_IDENT,
                    js_string(&css),
                    js_string(&module.id)
                ));
                if module.hot {
                    body.push_str(" if (module.hot) { module.hot.accept(); }");
                }
                body
            }
            _ => String::new(),
        },
        Payload::Url(url) => match &url.placement {
            UrlPlacement::Inline(data) => format!("module.exports = {};", js_string(data)),
            UrlPlacement::Emitted(file) => {
                format!("module.exports = {}.p + {};", REQUIRE_IDENT, js_string(file))
            }
        },
        Payload::Bytes(_) => String::new(),
    }
}

fn deps_json(module: &RoutedModule) -> String {
    serde_json::to_string(&module.deps).unwrap_or_else(|_| "{}".to_string())
}

fn artifact(name: &str, kind: ArtifactKind, content: &[u8]) -> OutputArtifact {
    OutputArtifact {
        name: name.to_string(),
        kind,
        placement: Placement::EmittedFile {
            file: name.to_string(),
        },
        size: content.len() as u64,
        digest: digest(content),
    }
}

fn output_file(name: String, kind: ArtifactKind, content: String) -> OutputFile {
    let content: Arc<[u8]> = content.into_bytes().into();
    OutputFile {
        digest: digest(&content),
        name,
        kind,
        content,
    }
}

fn line_count(s: &str) -> u32 {
    s.bytes().filter(|b| *b == b'\n').count() as u32
}

fn link_entry(
    graph: &RoutedGraph,
    name: &str,
    entry_id: &str,
    header: &str,
    options: &LinkOptions,
) -> Result<EntryOutput> {
    let modules = collect(graph, entry_id);
    let js_name = format!("{}.js", name);
    let css_name = format!("{}.css", name);

    let mut files = Vec::new();
    let mut artifacts = Vec::new();
    let mut hot_modules = BTreeMap::new();

    // Script bundle.
    let mut js = String::with_capacity(header.len() + 1024);
    js.push_str(header);
    js.push_str("({\n");
    let mut maps = ConcatSourceMapBuilder::default();

    for module in &modules {
        let body = factory_body(graph, module);
        js.push_str(&format!(
            "{}: [function (module, exports, {}) {{\n",
            js_string(&module.id),
            REQUIRE_IDENT
        ));
        if let Payload::Script(script) = &module.payload {
            if let (true, Some(map)) = (options.source_map, &script.map) {
                maps.add_sourcemap(map, line_count(&js));
            }
        }
        js.push_str(&body);
        js.push_str(&format!("\n}}, {}],\n", deps_json(module)));

        if module.hot {
            let code: Arc<str> = Arc::from(body.as_str());
            hot_modules.insert(
                module.id.clone(),
                HotModule {
                    digest: digest(format!("{}\n{}", body, deps_json(module)).as_bytes()),
                    code,
                    deps: module.deps.clone(),
                },
            );
        }
    }

    let hot_endpoint = if options.hot {
        js_string(HOT_EVENTS_PATH)
    } else {
        "null".to_string()
    };
    js.push_str(&format!(
        "}}, {}, {}, {});\n",
        js_string(entry_id),
        public_path_expr(&options.public_path),
        hot_endpoint
    ));

    if options.source_map {
        let map_name = format!("{}.map", js_name);
        js.push_str(&format!("//# sourceMappingURL={}\n", map_name));
        let map = maps.into_sourcemap().to_json_string();
        artifacts.push(artifact(&map_name, ArtifactKind::SourceMap, map.as_bytes()));
        files.push(output_file(map_name, ArtifactKind::SourceMap, map));
    }
    artifacts.push(artifact(&js_name, ArtifactKind::Script, js.as_bytes()));
    files.push(output_file(js_name.clone(), ArtifactKind::Script, js));

    // Extracted stylesheet.
    let mut css = String::new();
    let mut css_map = SourceMapBuilder::default();
    let prefix = options.public_path.static_prefix();
    for module in &modules {
        let Payload::Style(style) = &module.payload else {
            continue;
        };
        match style.sink {
            Some(StyleSink::Extract) => {
                let line = line_count(&css);
                let source = String::from_utf8_lossy(&module.source);
                let id = css_map.set_source_and_content(&module.id, &source);
                css_map.add_token(line, 0, 0, 0, Some(id), None);
                css.push_str(&resolve_css(graph, module, &style.css, prefix));
                css.push('\n');
            }
            _ => {
                artifacts.push(OutputArtifact {
                    name: module.id.clone(),
                    kind: ArtifactKind::Stylesheet,
                    placement: Placement::Inline {
                        within: format!("{}.js", name),
                    },
                    size: style.css.len() as u64,
                    digest: digest(style.css.as_bytes()),
                });
            }
        }
    }
    let has_css = !css.is_empty();
    if has_css {
        if options.source_map {
            let map_name = format!("{}.map", css_name);
            css.push_str(&format!("/*# sourceMappingURL={} */\n", map_name));
            let map = css_map.into_sourcemap().to_json_string();
            artifacts.push(artifact(&map_name, ArtifactKind::SourceMap, map.as_bytes()));
            files.push(output_file(map_name, ArtifactKind::SourceMap, map));
        }
        artifacts.push(artifact(&css_name, ArtifactKind::Stylesheet, css.as_bytes()));
        files.push(output_file(css_name.clone(), ArtifactKind::Stylesheet, css));
    }

    // Images and fonts.
    let in_css: FxHashSet<&str> = modules
        .iter()
        .filter(|m| {
            matches!(&m.payload, Payload::Style(s) if s.sink == Some(StyleSink::Extract))
        })
        .flat_map(|m| m.deps.values().filter_map(|d| d.as_deref()))
        .collect();

    for module in &modules {
        let Payload::Url(url) = &module.payload else {
            continue;
        };
        match &url.placement {
            UrlPlacement::Inline(_) => {
                let within = if has_css && in_css.contains(module.id.as_str()) {
                    css_name.clone()
                } else {
                    format!("{}.js", name)
                };
                artifacts.push(OutputArtifact {
                    name: module.id.clone(),
                    kind: ArtifactKind::Asset,
                    placement: Placement::Inline { within },
                    size: url.size,
                    digest: url.digest.clone(),
                });
            }
            UrlPlacement::Emitted(file) => {
                artifacts.push(OutputArtifact {
                    name: file.clone(),
                    kind: ArtifactKind::Asset,
                    placement: Placement::EmittedFile { file: file.clone() },
                    size: url.size,
                    digest: url.digest.clone(),
                });
            }
        }
        for emitted in &module.emitted {
            files.push(OutputFile {
                name: emitted.file_name.clone(),
                kind: ArtifactKind::Asset,
                digest: digest(&emitted.content),
                content: emitted.content.clone(),
            });
        }
    }

    tracing::debug!(
        entry = name,
        modules = modules.len(),
        artifacts = artifacts.len(),
        "linked entry"
    );

    Ok(EntryOutput {
        files,
        artifacts,
        hot_modules,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{ScriptModule, StyleModule, UrlModule};
    use std::path::PathBuf;

    fn module(id: &str, payload: Payload, deps: &[(&str, &str)]) -> RoutedModule {
        RoutedModule {
            id: id.to_string(),
            path: PathBuf::from("/p").join(id),
            rule: "test".to_string(),
            payload,
            deps: deps
                .iter()
                .map(|(s, id)| (s.to_string(), Some(id.to_string())))
                .collect::<IndexMap<_, _>>(),
            emitted: Vec::new(),
            hot: false,
            source: Arc::from(&b""[..]),
        }
    }

    fn script(code: &str) -> Payload {
        Payload::Script(ScriptModule {
            code: code.to_string(),
            map: None,
        })
    }

    fn style(css: &str, sink: StyleSink) -> Payload {
        Payload::Style(StyleModule {
            css: css.to_string(),
            urls: Vec::new(),
            sink: Some(sink),
        })
    }

    fn graph(modules: Vec<RoutedModule>, entry: &str) -> RoutedGraph {
        RoutedGraph {
            entries: vec![("index".to_string(), entry.to_string())],
            modules: modules.into_iter().map(|m| (m.id.clone(), m)).collect(),
        }
    }

    fn options() -> LinkOptions {
        LinkOptions {
            library: Some("NSCR".to_string()),
            public_path: PublicPath::Fixed("/dist/".to_string()),
            hot: false,
            source_map: false,
            manifest: false,
            mode: "production".to_string(),
        }
    }

    #[test]
    fn dependencies_come_first() {
        let g = graph(
            vec![
                module("a.js", script(""), &[("./b", "b.js"), ("./c", "c.js")]),
                module("b.js", script(""), &[("./c", "c.js")]),
                module("c.js", script(""), &[("./a", "a.js")]),
            ],
            "a.js",
        );
        let ids: Vec<_> = collect(&g, "a.js").iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["c.js", "b.js", "a.js"]);
    }

    #[test]
    fn bundle_is_library_iife() {
        let g = graph(vec![module("src/index.js", script("exports.x = 1;"), &[])], "src/index.js");
        let out = link(&g, &options(), Generation(1)).unwrap();
        let js = std::str::from_utf8(&out.file("index.js").unwrap().content).unwrap().to_string();

        assert!(js.starts_with("var NSCR = (function (modules, entry, publicPath, hotEndpoint)"));
        assert!(js.contains("\"src/index.js\": [function (module, exports, __kiln_require__) {\nexports.x = 1;\n}, {}],"));
        assert!(js.contains("}, \"src/index.js\", \"/dist/\", null);"));
        assert!(!js.contains("__KILN_HOT_CLIENT__"));
        assert!(!js.contains("EventSource"));
    }

    #[test]
    fn extracted_css_resolves_urls() {
        let emitted = Payload::Url(UrlModule {
            placement: UrlPlacement::Emitted("big-0123abcd.png".to_string()),
            size: 20_000,
            digest: "d".to_string(),
        });
        let inline = Payload::Url(UrlModule {
            placement: UrlPlacement::Inline("data:image/png;base64,AA==".to_string()),
            size: 1,
            digest: "e".to_string(),
        });
        let g = graph(
            vec![
                module("src/index.js", script("__kiln_require__(\"./a.css\");"), &[("./a.css", "src/a.css")]),
                module(
                    "src/a.css",
                    style(".a{background:url(./big.png)}.b{background:url(./small.png)}", StyleSink::Extract),
                    &[("./big.png", "src/big.png"), ("./small.png", "src/small.png")],
                ),
                module("src/big.png", emitted, &[]),
                module("src/small.png", inline, &[]),
            ],
            "src/index.js",
        );

        let out = link(&g, &options(), Generation(1)).unwrap();
        let css = std::str::from_utf8(&out.file("index.css").unwrap().content).unwrap().to_string();
        assert!(css.contains("url(/dist/big-0123abcd.png)"));
        assert!(css.contains("url(data:image/png;base64,AA==)"));

        let artifacts = &out.manifest.entries["index"];
        let small = artifacts.iter().find(|a| a.name == "src/small.png").unwrap();
        assert_eq!(small.placement, Placement::Inline { within: "index.css".to_string() });
        assert!(artifacts.iter().any(|a| a.name == "big-0123abcd.png" && a.is_emitted()));
    }

    #[test]
    fn injected_css_uses_placeholder_and_stays_inline() {
        let g = graph(
            vec![
                module("src/index.js", script(""), &[("./a.css", "src/a.css")]),
                module("src/a.css", style(".a{color:red}", StyleSink::Inject), &[]),
            ],
            "src/index.js",
        );
        let out = link(&g, &options(), Generation(1)).unwrap();
        assert!(out.file("index.css").is_none());
        let js = std::str::from_utf8(&out.file("index.js").unwrap().content).unwrap().to_string();
        assert!(js.contains("__kiln_require__.s(\".a{color:red}\", \"src/a.css\");"));

        let inline = out.manifest.entries["index"]
            .iter()
            .find(|a| a.kind == ArtifactKind::Stylesheet)
            .unwrap();
        assert_eq!(inline.placement, Placement::Inline { within: "index.js".to_string() });
    }

    #[test]
    fn hot_build_embeds_client_and_records_modules() {
        let mut m = module("src/index.js", script("exports.x = 1;"), &[]);
        m.hot = true;
        let g = graph(vec![m], "src/index.js");
        let opts = LinkOptions {
            hot: true,
            public_path: PublicPath::ScriptRelative {
                fallback: "/static/".to_string(),
            },
            ..options()
        };
        let out = link(&g, &opts, Generation(1)).unwrap();
        let js = std::str::from_utf8(&out.file("index.js").unwrap().content).unwrap().to_string();
        assert!(js.contains("EventSource"));
        assert!(js.contains("document.currentScript"));
        assert!(js.contains("\"/__kiln__/events\");"));
        assert_eq!(&*out.hot_modules["src/index.js"].code, "exports.x = 1;");
    }

    #[test]
    fn source_maps_are_emitted_with_comment() {
        let g = graph(vec![module("src/index.js", script("exports.x = 1;"), &[])], "src/index.js");
        let opts = LinkOptions {
            source_map: true,
            manifest: true,
            ..options()
        };
        let out = link(&g, &opts, Generation(4)).unwrap();
        let js = std::str::from_utf8(&out.file("index.js").unwrap().content).unwrap().to_string();
        assert!(js.ends_with("//# sourceMappingURL=index.js.map\n"));
        assert!(out.file("index.js.map").is_some());

        let manifest: serde_json::Value =
            serde_json::from_slice(&out.file("manifest.json").unwrap().content).unwrap();
        assert_eq!(manifest["generation"], 4);
    }
}
