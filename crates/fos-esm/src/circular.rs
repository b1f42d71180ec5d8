//! Circular-Import Resolver Builder
//!
//! A default binding declared while its source module is still mid-execution
//! captures a stale value. For every single-identifier `let` binding of a
//! module's `default` export, the builder records the URL and alias and
//! emits one fix-up block that re-reads the binding from the bridge's import
//! table after every static dependency has finished loading. Destructured
//! bindings are excluded: their declaration already reads the live table.

use url::Url;

use crate::rewrite::quote_js;
use crate::BRIDGE_IDENT;

/// One binding eligible for post-load repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeferredCircularBinding {
    pub url: Url,
    pub alias: String,
}

#[derive(Debug, Default)]
pub(crate) struct CircularResolverBuilder {
    bindings: Vec<DeferredCircularBinding>,
}

impl CircularResolverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, url: Url, alias: String) {
        self.bindings.push(DeferredCircularBinding { url, alias });
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Append the fix-up block registration to the assembled output.
    pub fn emit(&self, out: &mut String) {
        if self.bindings.is_empty() {
            return;
        }
        out.push_str(BRIDGE_IDENT);
        out.push_str(".addCircularImportResolver(function () {\n");
        for binding in &self.bindings {
            out.push_str(&format!(
                "    {alias} = {bridge}.imports.get({url}).default;\n",
                alias = binding.alias,
                bridge = BRIDGE_IDENT,
                url = quote_js(binding.url.as_str()),
            ));
        }
        out.push_str("});\n");
    }
}
