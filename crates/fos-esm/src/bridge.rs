//! Runtime bridge contract and collaborator seams.
//!
//! The rewritten module body never uses native module syntax. Instead it
//! executes with a single binding named [`BRIDGE_IDENT`] in scope, supplied
//! by the module loader when the compiled unit runs:
//!
//! ```js
//! $fos.imports                     // Map from absolute URL to a finished
//!                                  // module's export namespace
//! $fos.exports                     // plain object this module populates
//! $fos.importMeta                  // record behind `import.meta.*`
//! $fos.dynamicImport(spec, opts)   // deferred handle to another namespace
//! $fos.addCircularImportResolver(fn) // fix-up run after static deps load
//! $fos.dispatchError(error)        // error-capture sink (when enabled)
//! ```
//!
//! URL resolution and host compilation are external collaborators behind the
//! [`SpecifierResolver`] and [`ScriptEngine`] traits; this crate never
//! resolves or executes anything itself.

use url::Url;

/// Name of the bridge binding referenced by emitted code.
pub const BRIDGE_IDENT: &str = "$fos";

/// Resolves a module specifier against the importing module's URL.
pub trait SpecifierResolver {
    fn resolve(&self, base: &Url, specifier: &str) -> Result<Url, ResolveError>;
}

/// Default resolver: WHATWG URL join, the same resolution the rest of the
/// engine uses for hrefs.
pub struct UrlResolver;

impl SpecifierResolver for UrlResolver {
    fn resolve(&self, base: &Url, specifier: &str) -> Result<Url, ResolveError> {
        base.join(specifier).map_err(|source| ResolveError {
            specifier: specifier.to_string(),
            base: base.clone(),
            source,
        })
    }
}

/// A module specifier that could not be turned into an absolute URL.
#[derive(Debug, Clone, thiserror::Error)]
#[error("cannot resolve \"{specifier}\" against {base}: {source}")]
pub struct ResolveError {
    pub specifier: String,
    pub base: Url,
    #[source]
    pub source: url::ParseError,
}

/// Host script engine capability. `compile_and_bind` turns assembled source
/// text into an executable unit that takes the runtime bridge as its single
/// argument; this crate treats the unit as opaque.
pub trait ScriptEngine {
    /// The executable unit handed back to the module loader.
    type Unit;
    /// Host compilation failure, surfaced through
    /// [`CompileError::HostCompilation`](crate::CompileError::HostCompilation)
    /// unless the diagnostic pass finds an unterminated construct.
    type Error: std::fmt::Display;

    fn compile_and_bind(&mut self, source: &str, filename: &str) -> Result<Self::Unit, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_resolver_relative() {
        let base = Url::parse("https://example.com/app/main.js").unwrap();
        let resolved = UrlResolver.resolve(&base, "./lib/util.js").unwrap();
        assert_eq!(resolved.as_str(), "https://example.com/app/lib/util.js");

        let resolved = UrlResolver.resolve(&base, "../top.js").unwrap();
        assert_eq!(resolved.as_str(), "https://example.com/top.js");
    }

    #[test]
    fn test_url_resolver_absolute() {
        let base = Url::parse("https://example.com/app/main.js").unwrap();
        let resolved = UrlResolver.resolve(&base, "https://cdn.example.com/x.js").unwrap();
        assert_eq!(resolved.as_str(), "https://cdn.example.com/x.js");
    }
}
