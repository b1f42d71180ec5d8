//! Statement Rewriter
//!
//! Drives the scan: for every gap between candidate matches the lexical
//! state tracker runs first, then the candidate is accepted or left
//! verbatim. Accepted statements are replaced by bridge calls and their
//! specifiers recorded as dependencies. After the scan the output is
//! assembled as prologue, body, export epilogue, circular-import fix-up and
//! source attribution.

use url::Url;

use crate::circular::CircularResolverBuilder;
use crate::diagnostics::position_at;
use crate::scan::{self, PatternKey, ScanError, Statement, KEYWORD_LEN};
use crate::state::LexicalState;
use crate::{
    CompileError, DestructuredBinding, ImportKind, ModuleDependency, SpecifierResolver,
    BRIDGE_IDENT,
};

/// Options shared by every compile through one compiler instance.
#[derive(Debug, Clone, Default)]
pub struct CompilerOptions {
    /// Wrap the body in try/catch and route failures through
    /// `$fos.dispatchError` instead of propagating synchronously.
    pub error_capture: bool,
}

/// The pure product of the rewrite step, before the host engine sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenModule {
    pub dependencies: Vec<ModuleDependency>,
    pub source: String,
}

/// An export assignment deferred to the module epilogue, so declarations
/// hoisted or evaluated later in the body are fully initialized first.
#[derive(Debug)]
enum EpilogueExport {
    /// `$fos.exports['exported'] = local;`
    Local { exported: String, local: String },
    /// `$fos.exports['exported'] = $fosExportN[key];`
    FromTemporary {
        exported: String,
        temporary: String,
        key: PatternKey,
    },
}

/// Rewrite one module's source. This is the synchronous, single-pass core:
/// no I/O, no suspension, all state local to the call.
pub fn rewrite_module<R: SpecifierResolver>(
    module_url: &Url,
    source: &str,
    resolver: &R,
    options: &CompilerOptions,
    source_url: Option<&Url>,
) -> Result<RewrittenModule, CompileError> {
    let mut scanner = Rewriter {
        module_url,
        source,
        resolver,
        state: LexicalState::new(),
        out: String::with_capacity(source.len() + 256),
        dependencies: Vec::new(),
        epilogue: Vec::new(),
        circular: CircularResolverBuilder::new(),
        temporaries: 0,
    };
    scanner.run()?;

    let Rewriter {
        out: body,
        dependencies,
        epilogue,
        circular,
        ..
    } = scanner;

    let mut text = String::with_capacity(body.len() + 512);
    text.push_str("\"use strict\";\n");
    if options.error_capture {
        text.push_str("try {\n");
    }
    text.push_str(&body);
    if !epilogue.is_empty() {
        text.push('\n');
        for export in &epilogue {
            match export {
                EpilogueExport::Local { exported, local } => {
                    text.push_str(&format!(
                        "{}.exports{} = {};\n",
                        BRIDGE_IDENT,
                        export_key(exported),
                        local
                    ));
                }
                EpilogueExport::FromTemporary {
                    exported,
                    temporary,
                    key,
                } => {
                    let index = match key {
                        PatternKey::Property(name) => format!("[{}]", quote_js(name)),
                        PatternKey::Index(i) => format!("[{i}]"),
                    };
                    text.push_str(&format!(
                        "{}.exports{} = {}{};\n",
                        BRIDGE_IDENT,
                        export_key(exported),
                        temporary,
                        index
                    ));
                }
            }
        }
    }
    if !circular.is_empty() {
        text.push('\n');
        circular.emit(&mut text);
    }
    if options.error_capture {
        text.push_str("\n} catch ($fosError) {\n    ");
        text.push_str(BRIDGE_IDENT);
        text.push_str(".dispatchError($fosError);\n}");
    }
    let attribution = source_url.unwrap_or(module_url);
    text.push_str(&format!("\n//# sourceURL={attribution}"));

    tracing::debug!(
        url = %module_url,
        dependencies = dependencies.len(),
        "module rewritten"
    );
    Ok(RewrittenModule {
        dependencies,
        source: text,
    })
}

struct Rewriter<'a, R> {
    module_url: &'a Url,
    source: &'a str,
    resolver: &'a R,
    state: LexicalState,
    out: String,
    dependencies: Vec<ModuleDependency>,
    epilogue: Vec<EpilogueExport>,
    circular: CircularResolverBuilder,
    temporaries: usize,
}

impl<R: SpecifierResolver> Rewriter<'_, R> {
    fn run(&mut self) -> Result<(), CompileError> {
        let source = self.source;
        let mut cursor = 0usize;
        while let Some(candidate) = scan::next_candidate(source, cursor) {
            // State must reflect everything before the candidate.
            self.state.advance(source, cursor..candidate.offset);
            self.out.push_str(&source[cursor..candidate.offset]);

            let keyword_end = candidate.offset + KEYWORD_LEN;
            let accepted = self.state.in_rewritable_context()
                && scan::at_statement_boundary(source, candidate.offset)
                && !scan::continues_identifier(source, keyword_end);
            let statement = if accepted {
                scan::classify(source, candidate.offset, candidate.keyword)
                    .map_err(|e| self.scan_error(e))?
            } else {
                None
            };

            match statement {
                None => {
                    // Not a module statement here; emit the keyword verbatim
                    // and keep scanning it as ordinary text.
                    self.state.advance(source, candidate.offset..keyword_end);
                    self.out.push_str(&source[candidate.offset..keyword_end]);
                    cursor = keyword_end;
                }
                Some(statement) => {
                    let end = self.emit(statement)?;
                    cursor = end;
                }
            }
        }
        self.state.advance(source, cursor..source.len());
        self.out.push_str(&source[cursor..]);
        Ok(())
    }

    /// Emit the replacement for one accepted statement and return the offset
    /// where ordinary scanning resumes.
    fn emit(&mut self, statement: Statement) -> Result<usize, CompileError> {
        match statement {
            Statement::ImportMeta { end } => {
                self.out.push_str(BRIDGE_IDENT);
                self.out.push_str(".importMeta");
                self.state.note_value_end();
                Ok(end)
            }
            Statement::DynamicImport { literal, end } => {
                if let Some(specifier) = literal {
                    self.record_dependency(&specifier, ImportKind::EcmaScript)?;
                }
                self.out.push_str(BRIDGE_IDENT);
                self.out.push_str(".dynamicImport(");
                // The consumed `(` must stay balanced; the argument is
                // rescanned as ordinary text.
                self.state.note_open_paren();
                Ok(end)
            }
            Statement::BareImport {
                specifier,
                attr_type,
                end,
            } => {
                // Side-effect import: the dependency is recorded and the
                // statement disappears from the output.
                self.record_dependency(&specifier, ImportKind::from_attribute(attr_type.as_deref()))?;
                self.state.note_statement_end();
                Ok(end)
            }
            Statement::ImportClause {
                default,
                namespace,
                named,
                specifier,
                attr_type,
                end,
            } => {
                let kind = ImportKind::from_attribute(attr_type.as_deref());
                let url = self.record_dependency(&specifier, kind.clone())?;
                self.emit_import_bindings(&url, &kind, default, namespace, named);
                self.state.note_statement_end();
                Ok(end)
            }
            Statement::ExportStar {
                alias,
                specifier,
                end,
            } => {
                let url = self.record_dependency(&specifier, ImportKind::EcmaScript)?;
                let table = import_expr(&url);
                match alias {
                    None => self.out.push_str(&format!(
                        "Object.assign({}.exports, {table});",
                        BRIDGE_IDENT
                    )),
                    Some(name) => self.out.push_str(&format!(
                        "{}.exports{} = {table};",
                        BRIDGE_IDENT,
                        export_key(&name)
                    )),
                }
                self.state.note_statement_end();
                Ok(end)
            }
            Statement::ExportNamedFrom {
                bindings,
                specifier,
                end,
            } => {
                let url = self.record_dependency(&specifier, ImportKind::EcmaScript)?;
                let table = import_expr(&url);
                let assignments: Vec<String> = bindings
                    .iter()
                    .map(|binding| {
                        format!(
                            "{}.exports{} = {table}[{}];",
                            BRIDGE_IDENT,
                            export_key(binding.bound_name()),
                            quote_js(&binding.imported)
                        )
                    })
                    .collect();
                self.out.push_str(&assignments.join(" "));
                self.state.note_statement_end();
                Ok(end)
            }
            Statement::ExportNamed { bindings, end } => {
                let assignments: Vec<String> = bindings
                    .iter()
                    .map(|binding| {
                        format!(
                            "{}.exports{} = {};",
                            BRIDGE_IDENT,
                            export_key(binding.bound_name()),
                            binding.imported
                        )
                    })
                    .collect();
                self.out.push_str(&assignments.join(" "));
                self.state.note_statement_end();
                Ok(end)
            }
            Statement::ExportDeclaration { default, name, end } => {
                // Keywords stripped; the declaration stays in place and the
                // assignment runs in the epilogue, after the body finished.
                self.epilogue.push(EpilogueExport::Local {
                    exported: if default { "default".into() } else { name.clone() },
                    local: name,
                });
                self.state.note_statement_end();
                Ok(end)
            }
            Statement::ExportDefaultExpr { end } => {
                self.out.push_str(BRIDGE_IDENT);
                self.out.push_str(".exports.default = ");
                self.state.note_statement_end();
                Ok(end)
            }
            Statement::ExportVariable { names, end } => {
                for name in names {
                    self.epilogue.push(EpilogueExport::Local {
                        exported: name.clone(),
                        local: name,
                    });
                }
                self.state.note_statement_end();
                Ok(end)
            }
            Statement::ExportPattern { bindings, end } => {
                // The initializer is captured once; each destructured name
                // is exported by indexing into the temporary.
                let temporary = format!("$fosExport{}", self.temporaries);
                self.temporaries += 1;
                self.out.push_str(&format!("const {temporary} ="));
                for binding in bindings {
                    self.epilogue.push(EpilogueExport::FromTemporary {
                        exported: binding.local,
                        temporary: temporary.clone(),
                        key: binding.key,
                    });
                }
                self.state.note_statement_end();
                Ok(end)
            }
        }
    }

    /// Emit the local bindings for an `import <clause> from` statement.
    fn emit_import_bindings(
        &mut self,
        url: &Url,
        kind: &ImportKind,
        default: Option<String>,
        namespace: Option<String>,
        named: Vec<DestructuredBinding>,
    ) {
        let table = import_expr(url);
        let mut pieces: Vec<String> = Vec::new();

        if let Some(alias) = default {
            pieces.push(format!("let {alias} = {table}.default;"));
            if *kind == ImportKind::EcmaScript {
                self.circular.push(url.clone(), alias);
            }
        }
        if let Some(alias) = namespace {
            pieces.push(format!("const {alias} = {table};"));
        }

        let mut destructured: Vec<String> = Vec::new();
        for binding in named {
            match (binding.imported.as_str() == "default", binding.alias) {
                (true, Some(alias)) => {
                    // `{ default as X }` behaves exactly like a default
                    // import, including circular-import repair.
                    pieces.push(format!("let {alias} = {table}.default;"));
                    if *kind == ImportKind::EcmaScript {
                        self.circular.push(url.clone(), alias);
                    }
                }
                (_, Some(alias)) => {
                    destructured.push(format!("{}: {alias}", binding_key(&binding.imported)));
                }
                (_, None) => destructured.push(binding.imported),
            }
        }
        if !destructured.is_empty() {
            pieces.push(format!(
                "const {{ {} }} = {table};",
                destructured.join(", ")
            ));
        }

        self.out.push_str(&pieces.join(" "));
    }

    fn record_dependency(
        &mut self,
        specifier: &str,
        kind: ImportKind,
    ) -> Result<Url, CompileError> {
        let url = self.resolver.resolve(self.module_url, specifier)?;
        tracing::trace!(specifier, url = %url, kind = %kind, "dependency");
        self.dependencies.push(ModuleDependency {
            url: url.clone(),
            kind,
        });
        Ok(url)
    }

    fn scan_error(&self, error: ScanError) -> CompileError {
        match error {
            ScanError::AmbiguousExport { offset, detail } => {
                let position = position_at(self.source, offset);
                CompileError::AmbiguousExport {
                    line: position.line,
                    column: position.column,
                    detail,
                }
            }
            ScanError::DuplicateImportStart { offset } => {
                let position = position_at(self.source, offset);
                CompileError::DuplicateImportStart {
                    line: position.line,
                    column: position.column,
                }
            }
        }
    }
}

/// `$fos.imports.get('<url>')`
fn import_expr(url: &Url) -> String {
    format!("{}.imports.get({})", BRIDGE_IDENT, quote_js(url.as_str()))
}

/// Property access for an export name: `.default` for the default export,
/// `['name']` otherwise.
fn export_key(name: &str) -> String {
    if name == "default" {
        ".default".to_string()
    } else {
        format!("[{}]", quote_js(name))
    }
}

/// Destructuring key: a bare identifier when possible, a quoted literal key
/// otherwise (string import names).
fn binding_key(name: &str) -> String {
    if is_valid_identifier(name) {
        name.to_string()
    } else {
        quote_js(name)
    }
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' || !c.is_ascii() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || !c.is_ascii())
}

/// Single-quoted JavaScript string literal with the necessary escapes.
pub(crate) fn quote_js(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UrlResolver;

    fn base() -> Url {
        Url::parse("https://example.com/app/main.js").unwrap()
    }

    fn rewrite(source: &str) -> RewrittenModule {
        rewrite_module(&base(), source, &UrlResolver, &CompilerOptions::default(), None)
            .unwrap()
    }

    #[test]
    fn test_quote_js() {
        assert_eq!(quote_js("a'b"), r"'a\'b'");
        assert_eq!(quote_js(r"a\b"), r"'a\\b'");
    }

    #[test]
    fn test_default_import() {
        let module = rewrite("import a from \"./a.js\";");
        assert_eq!(module.dependencies.len(), 1);
        assert_eq!(
            module.dependencies[0].url.as_str(),
            "https://example.com/app/a.js"
        );
        assert_eq!(module.dependencies[0].kind, ImportKind::EcmaScript);
        assert!(module
            .source
            .contains("let a = $fos.imports.get('https://example.com/app/a.js').default;"));
        // Default bindings get circular-import repair.
        assert!(module.source.contains("$fos.addCircularImportResolver"));
        assert!(module
            .source
            .contains("a = $fos.imports.get('https://example.com/app/a.js').default;"));
    }

    #[test]
    fn test_default_as_named_equivalence() {
        let plain = rewrite("import X from \"./m.js\";");
        let named = rewrite("import { default as X } from \"./m.js\";");
        assert!(plain
            .source
            .contains("let X = $fos.imports.get('https://example.com/app/m.js').default;"));
        assert!(named
            .source
            .contains("let X = $fos.imports.get('https://example.com/app/m.js').default;"));
        assert_eq!(plain.dependencies, named.dependencies);
    }

    #[test]
    fn test_named_import_destructuring() {
        let module = rewrite("import { a, b as c, \"s p\" as d } from './m.js';");
        assert!(module.source.contains(
            "const { a, b: c, 's p': d } = $fos.imports.get('https://example.com/app/m.js');"
        ));
        // Destructured bindings are not repaired after circular loads.
        assert!(!module.source.contains("addCircularImportResolver"));
    }

    #[test]
    fn test_namespace_import() {
        let module = rewrite("import * as ns from './m.js';");
        assert!(module
            .source
            .contains("const ns = $fos.imports.get('https://example.com/app/m.js');"));
    }

    #[test]
    fn test_bare_import_removed() {
        let module = rewrite("import './side-effect.js';\nconst a = 1;");
        assert_eq!(module.dependencies.len(), 1);
        assert!(!module.source.contains("side-effect"));
        assert!(module.source.contains("const a = 1;"));
    }

    #[test]
    fn test_import_attributes_kind() {
        let module = rewrite("import data from './d.json' with { type: \"json\" };");
        assert_eq!(module.dependencies[0].kind, ImportKind::Json);
        // Non-esm kinds never register circular repair.
        assert!(!module.source.contains("addCircularImportResolver"));
    }

    #[test]
    fn test_export_const_and_default_class() {
        let module = rewrite("export const x = 1; export default class A {}");
        assert!(module.dependencies.is_empty());
        assert!(module.source.contains("const x = 1;"));
        assert!(module.source.contains("class A {}"));
        assert!(module.source.contains("$fos.exports['x'] = x;"));
        assert!(module.source.contains("$fos.exports.default = A;"));
    }

    #[test]
    fn test_export_default_expression() {
        let module = rewrite("export default 1 + 2;");
        assert!(module.source.contains("$fos.exports.default = 1 + 2;"));
    }

    #[test]
    fn test_export_named_inline() {
        let module = rewrite("const a = 1, b = 2;\nexport { a, b as c };");
        assert!(module.source.contains("$fos.exports['a'] = a;"));
        assert!(module.source.contains("$fos.exports['c'] = b;"));
    }

    #[test]
    fn test_export_pattern_temporary() {
        let module = rewrite("export const { a, b: c } = makeObj();");
        assert!(module.source.contains("const $fosExport0 = makeObj();"));
        assert!(module.source.contains("$fos.exports['a'] = $fosExport0['a'];"));
        assert!(module.source.contains("$fos.exports['c'] = $fosExport0['b'];"));
    }

    #[test]
    fn test_export_array_pattern() {
        let module = rewrite("export let [x, , y] = pair;");
        assert!(module.source.contains("const $fosExport0 = pair;"));
        assert!(module.source.contains("$fos.exports['x'] = $fosExport0[0];"));
        assert!(module.source.contains("$fos.exports['y'] = $fosExport0[2];"));
    }

    #[test]
    fn test_export_let_without_initializer() {
        let module = rewrite("export let a, b;");
        assert!(module.source.contains("let a, b;"));
        assert!(module.source.contains("$fos.exports['a'] = a;"));
        assert!(module.source.contains("$fos.exports['b'] = b;"));
    }

    #[test]
    fn test_reexport_star() {
        let module = rewrite("export * from './all.js';");
        assert!(module.source.contains(
            "Object.assign($fos.exports, $fos.imports.get('https://example.com/app/all.js'));"
        ));
    }

    #[test]
    fn test_dynamic_import_rewrite() {
        let module = rewrite("const p = import('./lazy.js');");
        assert!(module.source.contains("const p = $fos.dynamicImport('./lazy.js');"));
        assert_eq!(module.dependencies.len(), 1);
        assert_eq!(
            module.dependencies[0].url.as_str(),
            "https://example.com/app/lazy.js"
        );
    }

    #[test]
    fn test_import_meta() {
        let module = rewrite("const u = import.meta.url;");
        assert!(module.source.contains("const u = $fos.importMeta.url;"));
        assert!(module.dependencies.is_empty());
    }

    #[test]
    fn test_error_capture_wrapper() {
        let options = CompilerOptions { error_capture: true };
        let module =
            rewrite_module(&base(), "const a = 1;", &UrlResolver, &options, None).unwrap();
        assert!(module.source.contains("try {"));
        assert!(module.source.contains("$fos.dispatchError($fosError);"));
    }

    #[test]
    fn test_source_attribution() {
        let module = rewrite("const a = 1;");
        assert!(module
            .source
            .ends_with("//# sourceURL=https://example.com/app/main.js"));

        let debug_url = Url::parse("https://example.com/original.js").unwrap();
        let module = rewrite_module(
            &base(),
            "const a = 1;",
            &UrlResolver,
            &CompilerOptions::default(),
            Some(&debug_url),
        )
        .unwrap();
        assert!(module.source.ends_with("//# sourceURL=https://example.com/original.js"));
    }

    #[test]
    fn test_ambiguous_export_position() {
        let err = rewrite_module(
            &base(),
            "const a = 1;\nexport enum Color {}",
            &UrlResolver,
            &CompilerOptions::default(),
            None,
        )
        .unwrap_err();
        match err {
            CompileError::AmbiguousExport { line, column, .. } => {
                assert_eq!(line, 2);
                assert_eq!(column, 8);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
