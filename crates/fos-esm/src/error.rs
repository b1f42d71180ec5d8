//! Compile errors.

use crate::bridge::ResolveError;
use crate::diagnostics::UnterminatedKind;

/// Why a module failed to compile. Every variant is fatal: `compile` either
/// returns a complete module or one of these.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// An export construct matched syntactically but a required name could
    /// not be extracted (for example an anonymous non-default export).
    #[error("ambiguous export at line {line}, column {column}: {detail}")]
    AmbiguousExport {
        line: u32,
        column: u32,
        detail: String,
    },

    /// A new import clause began before the previous one reached `from`.
    #[error("nested import statement at line {line}, column {column}")]
    DuplicateImportStart { line: u32, column: u32 },

    /// A string/comment/regex/bracket construct was left open at end of
    /// input. Detected by the diagnostic pass after the host engine rejects
    /// the assembled text.
    #[error("unterminated {kind} starting at line {line}, column {column}")]
    UnterminatedConstruct {
        kind: UnterminatedKind,
        line: u32,
        column: u32,
    },

    /// The host engine rejected the assembled text for reasons unrelated to
    /// module syntax; the rewritten source is attached for context.
    #[error("module compilation failed: {message}")]
    HostCompilation { message: String, rewritten: String },

    /// A specifier could not be resolved against the module URL.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}
