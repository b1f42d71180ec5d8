//! fOS ECMAScript Module Compiler
//!
//! Rewrites ES module source text into directly executable script that talks
//! to a runtime import/export bridge instead of using native module syntax,
//! and reports the module's dependencies in lexical order.
//!
//! Features:
//! - Single-pass scan: comments, strings, regular expressions and template
//!   interpolation never produce false matches
//! - Every import/export form: defaults, namespaces, named lists, aliases,
//!   quoted names, re-exports, aggregations, import attributes
//! - Dynamic `import()` and `import.meta` rewriting
//! - Post-load repair of default bindings caught in circular imports
//! - Line/column diagnostics for unterminated constructs, computed only when
//!   the host engine rejects the assembled output

mod circular;
mod diagnostics;
mod error;
mod rewrite;
mod scan;
mod state;

pub mod bridge;

pub use bridge::{ResolveError, ScriptEngine, SpecifierResolver, UrlResolver, BRIDGE_IDENT};
pub use diagnostics::{locate_unterminated, SourcePosition, UnterminatedConstruct, UnterminatedKind};
pub use error::CompileError;
pub use rewrite::{rewrite_module, CompilerOptions, RewrittenModule};

use serde::Serialize;
use url::Url;

/// How an imported module is to be interpreted, from the import attribute
/// clause (`with { type: "json" }`). Plain ES modules are `EcmaScript`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportKind {
    #[serde(rename = "esm")]
    EcmaScript,
    Json,
    Css,
    Other(String),
}

impl ImportKind {
    pub fn from_attribute(attr_type: Option<&str>) -> Self {
        match attr_type {
            None => ImportKind::EcmaScript,
            Some("json") => ImportKind::Json,
            Some("css") => ImportKind::Css,
            Some(other) => ImportKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ImportKind::EcmaScript => "esm",
            ImportKind::Json => "json",
            ImportKind::Css => "css",
            ImportKind::Other(s) => s,
        }
    }
}

impl std::fmt::Display for ImportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dependency of a compiled module, in order of first lexical
/// occurrence. Duplicates are not collapsed here; the import cache owns
/// deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleDependency {
    pub url: Url,
    pub kind: ImportKind,
}

/// One element of an `import { a, b as c }` or `export { a as b }` list.
/// Quoted string names are preserved as the literal key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestructuredBinding {
    pub imported: String,
    pub alias: Option<String>,
}

impl DestructuredBinding {
    /// The name the binding ends up under (the alias when present).
    pub fn bound_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.imported)
    }
}

/// The product of a successful compile: the dependency list plus the host
/// engine's executable unit. Invoking the unit with the runtime bridge
/// begins executing the rewritten body; completion is observed through the
/// host's deferred-completion mechanism. Caching compiled modules by URL is
/// the module loader's job, not this crate's.
#[derive(Debug)]
pub struct CompiledModule<U> {
    pub dependencies: Vec<ModuleDependency>,
    pub run: U,
}

/// Module compiler: pairs a specifier resolver with a host script engine.
///
/// Each `compile` call is self-contained; no scanner state survives across
/// calls, so independent inputs may be compiled concurrently from separate
/// compiler instances without locking.
pub struct ModuleCompiler<R, H> {
    resolver: R,
    host: H,
    options: CompilerOptions,
}

impl<R: SpecifierResolver, H: ScriptEngine> ModuleCompiler<R, H> {
    pub fn new(resolver: R, host: H) -> Self {
        Self {
            resolver,
            host,
            options: CompilerOptions::default(),
        }
    }

    pub fn with_options(resolver: R, host: H, options: CompilerOptions) -> Self {
        Self {
            resolver,
            host,
            options,
        }
    }

    /// Compile one module. `module_url` resolves relative specifiers;
    /// `source_url` (defaulting to `module_url`) is embedded for diagnostic
    /// attribution.
    ///
    /// Either a complete [`CompiledModule`] is returned or an error; there is
    /// no partial success. When the host engine rejects the assembled text,
    /// the slower diagnostic scan runs once to turn the opaque failure into a
    /// line/column-qualified message.
    pub fn compile(
        &mut self,
        module_url: &Url,
        source: &str,
        source_url: Option<&Url>,
    ) -> Result<CompiledModule<H::Unit>, CompileError> {
        tracing::debug!(url = %module_url, bytes = source.len(), "compiling module");
        let rewritten = rewrite_module(module_url, source, &self.resolver, &self.options, source_url)?;
        let filename = source_url.unwrap_or(module_url).as_str();
        match self.host.compile_and_bind(&rewritten.source, filename) {
            Ok(unit) => {
                tracing::debug!(
                    url = %module_url,
                    dependencies = rewritten.dependencies.len(),
                    "module compiled"
                );
                Ok(CompiledModule {
                    dependencies: rewritten.dependencies,
                    run: unit,
                })
            }
            Err(err) => {
                if let Some(found) = locate_unterminated(source) {
                    Err(CompileError::UnterminatedConstruct {
                        kind: found.kind,
                        line: found.position.line,
                        column: found.position.column,
                    })
                } else {
                    // The source was invalid for reasons unrelated to module
                    // syntax; surface the host error with the rewritten text
                    // attached for context.
                    Err(CompileError::HostCompilation {
                        message: err.to_string(),
                        rewritten: rewritten.source,
                    })
                }
            }
        }
    }
}
