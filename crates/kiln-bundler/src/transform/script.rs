//! Script stage: ES module and CommonJS sources become module factories.
//!
//! Import and export declarations are rewritten in place to calls on the
//! bundle runtime's `__kiln_require__`. Every replacement stays on the line of
//! the text it replaces, so an unminified factory maps to its source line for
//! line. Imported bindings are copies taken when the import statement runs.

use std::path::PathBuf;

use anyhow::{Context, bail};
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, BindingPatternKind, CallExpression, Declaration, ExportDefaultDeclarationKind,
    Expression, ImportDeclarationSpecifier, ImportExpression, ModuleDeclaration, ModuleExportName,
    Program,
};
use oxc_ast_visit::{Visit, walk};
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_sourcemap::{SourceMap, SourceMapBuilder};
use oxc_span::{GetSpan, SourceType};

use super::{Payload, ScriptModule, Transform, TransformContext};
use crate::runtime::ImportKind;

/// Name of the require function passed to every module factory.
pub const REQUIRE_IDENT: &str = "__kiln_require__";

const DEFAULT_LOCAL: &str = "__kiln_default__";

#[derive(Debug, Default)]
pub struct ScriptTransform;

impl Transform for ScriptTransform {
    fn name(&self) -> &'static str {
        "script"
    }

    fn apply(&self, input: Payload, cx: &mut TransformContext<'_>) -> anyhow::Result<Payload> {
        let source = match &input {
            Payload::Bytes(bytes) => std::str::from_utf8(bytes)
                .context("script source is not valid UTF-8")?
                .to_string(),
            other => bail!("script stage expects source bytes, got {}", other.kind_name()),
        };

        let rewritten = rewrite_module(&source, cx)?;

        let (code, map) = if cx.options.minify {
            minify(&rewritten, &cx.asset.rel, cx.options.source_map)?
        } else {
            let map = cx
                .options
                .source_map
                .then(|| line_map(&cx.asset.rel, &source, &rewritten));
            (rewritten, map)
        };

        Ok(Payload::Script(ScriptModule { code, map }))
    }
}

struct Edit {
    start: u32,
    end: u32,
    text: String,
}

/// Rewrite module syntax, recording every import on `cx`.
fn rewrite_module(source: &str, cx: &mut TransformContext<'_>) -> anyhow::Result<String> {
    let allocator = Allocator::default();
    let mut ret = Parser::new(&allocator, source, SourceType::mjs()).parse();

    // Legacy scripts (UMD wrappers, sloppy mode) fail as modules.
    if ret.panicked || !ret.errors.is_empty() {
        let retry = Parser::new(&allocator, source, SourceType::cjs()).parse();
        if retry.panicked || !retry.errors.is_empty() {
            let messages: Vec<String> = ret.errors.iter().map(|e| e.to_string()).collect();
            bail!("parse error: {}", messages.join(", "));
        }
        ret = retry;
    }

    let mut rewriter = Rewriter::default();
    rewriter.module_declarations(&ret.program);
    walk::walk_program(&mut rewriter, &ret.program);

    for specifier in &rewriter.imports {
        cx.add_import(specifier.clone(), ImportKind::Script);
    }

    Ok(rewriter.apply(source))
}

#[derive(Default)]
struct Rewriter {
    edits: Vec<Edit>,
    imports: Vec<String>,
    /// `(exported name, getter expression)` pairs for the export table.
    exports: Vec<(String, String)>,
    reexport_all: bool,
    counter: usize,
}

impl Rewriter {
    fn binding(&mut self) -> String {
        let name = format!("__kiln_i{}", self.counter);
        self.counter += 1;
        name
    }

    fn require(&mut self, specifier: &str) -> String {
        self.imports.push(specifier.to_string());
        format!("{}({})", REQUIRE_IDENT, js_string(specifier))
    }

    fn replace(&mut self, start: u32, end: u32, text: impl Into<String>) {
        self.edits.push(Edit {
            start,
            end,
            text: text.into(),
        });
    }

    fn module_declarations(&mut self, program: &Program<'_>) {
        for stmt in &program.body {
            let Some(decl) = stmt.as_module_declaration() else {
                continue;
            };

            match decl {
                ModuleDeclaration::ImportDeclaration(import) => {
                    let require = self.require(import.source.value.as_str());
                    let specifiers = import.specifiers.as_ref().filter(|s| !s.is_empty());

                    let text = match specifiers {
                        None => format!("{};", require),
                        Some(specifiers) => {
                            let module = self.binding();
                            let mut parts = vec![format!("{} = {}", module, require)];
                            for spec in specifiers {
                                match spec {
                                    ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                                        parts.push(format!(
                                            "{} = {}.d({})",
                                            s.local.name, REQUIRE_IDENT, module
                                        ));
                                    }
                                    ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                                        parts.push(format!("{} = {}", s.local.name, module));
                                    }
                                    ImportDeclarationSpecifier::ImportSpecifier(s) => {
                                        let imported = export_name(&s.imported);
                                        let access = if imported == "default" {
                                            format!("{}.d({})", REQUIRE_IDENT, module)
                                        } else {
                                            format!("{}[{}]", module, js_string(&imported))
                                        };
                                        parts.push(format!("{} = {}", s.local.name, access));
                                    }
                                }
                            }
                            format!("var {};", parts.join(", "))
                        }
                    };
                    self.replace(import.span.start, import.span.end, text);
                }
                ModuleDeclaration::ExportNamedDeclaration(export) => {
                    if let Some(declaration) = &export.declaration {
                        for name in declared_names(declaration) {
                            self.exports.push((name.clone(), name));
                        }
                        // Drop the `export` keyword, keep the declaration.
                        self.replace(export.span.start, declaration.span().start, "");
                    } else if let Some(source) = &export.source {
                        let module = self.binding();
                        let require = self.require(source.value.as_str());
                        for spec in &export.specifiers {
                            let local = export_name(&spec.local);
                            let exported = export_name(&spec.exported);
                            let access = if local == "default" {
                                format!("{}.d({})", REQUIRE_IDENT, module)
                            } else {
                                format!("{}[{}]", module, js_string(&local))
                            };
                            self.exports.push((exported, access));
                        }
                        self.replace(
                            export.span.start,
                            export.span.end,
                            format!("var {} = {};", module, require),
                        );
                    } else {
                        for spec in &export.specifiers {
                            self.exports
                                .push((export_name(&spec.exported), export_name(&spec.local)));
                        }
                        self.replace(export.span.start, export.span.end, "");
                    }
                }
                ModuleDeclaration::ExportDefaultDeclaration(export) => {
                    let body_start = export.declaration.span().start;
                    let named = match &export.declaration {
                        ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                            func.id.as_ref().map(|id| id.name.to_string())
                        }
                        ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                            class.id.as_ref().map(|id| id.name.to_string())
                        }
                        _ => None,
                    };

                    match named {
                        Some(local) => {
                            self.exports.push(("default".to_string(), local));
                            self.replace(export.span.start, body_start, "");
                        }
                        None => {
                            self.exports
                                .push(("default".to_string(), DEFAULT_LOCAL.to_string()));
                            self.replace(
                                export.span.start,
                                body_start,
                                format!("var {} = ", DEFAULT_LOCAL),
                            );
                        }
                    }
                }
                ModuleDeclaration::ExportAllDeclaration(export) => {
                    let require = self.require(export.source.value.as_str());
                    match &export.exported {
                        Some(name) => {
                            let module = self.binding();
                            self.exports.push((export_name(name), module.clone()));
                            self.replace(
                                export.span.start,
                                export.span.end,
                                format!("var {} = {};", module, require),
                            );
                        }
                        None => {
                            self.reexport_all = true;
                            self.replace(
                                export.span.start,
                                export.span.end,
                                format!("{}.r(exports, {});", REQUIRE_IDENT, require),
                            );
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn apply(mut self, source: &str) -> String {
        let mut out = source.to_string();

        if !self.exports.is_empty() || self.reexport_all {
            let getters: Vec<String> = self
                .exports
                .iter()
                .map(|(name, expr)| format!("{}: function () {{ return {}; }}", js_string(name), expr))
                .collect();
            self.edits.push(Edit {
                start: 0,
                end: 0,
                text: format!("{}.e(exports, {{{}}}); ", REQUIRE_IDENT, getters.join(", ")),
            });
        }

        // Apply back to front so earlier offsets stay valid. Overlapping edits
        // (a rewrite nested in one already applied) are skipped.
        self.edits.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));
        let mut floor = u32::MAX;
        for edit in self.edits {
            if edit.end > floor {
                continue;
            }
            out.replace_range(edit.start as usize..edit.end as usize, &edit.text);
            floor = edit.start;
        }
        out
    }
}

impl<'a> Visit<'a> for Rewriter {
    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Expression::Identifier(ident) = &call.callee {
            if ident.name == "require" && call.arguments.len() == 1 {
                if let Some(Argument::StringLiteral(lit)) = call.arguments.first() {
                    self.imports.push(lit.value.to_string());
                    self.replace(ident.span.start, ident.span.end, REQUIRE_IDENT);
                }
            }
        }
        walk::walk_call_expression(self, call);
    }

    fn visit_import_expression(&mut self, expr: &ImportExpression<'a>) {
        if let Expression::StringLiteral(lit) = &expr.source {
            let require = self.require(lit.value.as_str());
            self.replace(
                expr.span.start,
                expr.span.end,
                format!("Promise.resolve().then(function () {{ return {}; }})", require),
            );
        }
        walk::walk_import_expression(self, expr);
    }
}

fn export_name(name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
    }
}

fn declared_names(declaration: &Declaration<'_>) -> Vec<String> {
    match declaration {
        Declaration::FunctionDeclaration(func) => {
            func.id.iter().map(|id| id.name.to_string()).collect()
        }
        Declaration::ClassDeclaration(class) => {
            class.id.iter().map(|id| id.name.to_string()).collect()
        }
        Declaration::VariableDeclaration(var) => var
            .declarations
            .iter()
            .filter_map(|decl| match &decl.id.kind {
                BindingPatternKind::BindingIdentifier(ident) => Some(ident.name.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Quote `value` as a JavaScript string literal.
pub(crate) fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

fn minify(code: &str, rel: &str, source_map: bool) -> anyhow::Result<(String, Option<SourceMap>)> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, SourceType::cjs()).parse();
    if ret.panicked || !ret.errors.is_empty() {
        let messages: Vec<String> = ret.errors.iter().map(|e| e.to_string()).collect();
        bail!("minifier could not parse rewritten module: {}", messages.join(", "));
    }

    let mut program = ret.program;
    let minified = Minifier::new(MinifierOptions::default()).minify(&allocator, &mut program);

    let options = CodegenOptions {
        source_map_path: source_map.then(|| PathBuf::from(rel)),
        ..CodegenOptions::minify()
    };
    let out = Codegen::new()
        .with_options(options)
        .with_scoping(minified.scoping)
        .build(&program);

    Ok((out.code, out.map))
}

/// Line-for-line map from `generated` to `original`.
fn line_map(rel: &str, original: &str, generated: &str) -> SourceMap {
    let mut builder = SourceMapBuilder::default();
    let source_id = builder.set_source_and_content(rel, original);
    for line in 0..generated.lines().count() as u32 {
        builder.add_token(line, 0, line, 0, Some(source_id), None);
    }
    builder.into_sourcemap()
}
