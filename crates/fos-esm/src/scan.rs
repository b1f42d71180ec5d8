//! Statement Matcher
//!
//! Finds the next candidate `import`/`export` construct in document order and
//! classifies it into a tagged [`Statement`] variant. The rewriter then
//! matches on the closed set of variants instead of inspecting positional
//! capture groups.

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;

use crate::DestructuredBinding;

static STATEMENT_KEYWORDS: Lazy<AhoCorasick> =
    Lazy::new(|| AhoCorasick::new(["import", "export"]).unwrap());

pub(crate) const KEYWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keyword {
    Import,
    Export,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub offset: usize,
    pub keyword: Keyword,
}

/// Find the next `import`/`export` keyword occurrence at or after `from`.
pub(crate) fn next_candidate(source: &str, from: usize) -> Option<Candidate> {
    let m = STATEMENT_KEYWORDS.find(&source.as_bytes()[from..])?;
    Some(Candidate {
        offset: from + m.start(),
        keyword: if m.pattern().as_usize() == 0 {
            Keyword::Import
        } else {
            Keyword::Export
        },
    })
}

/// The character immediately before a candidate must sit on a statement
/// boundary; this rejects trailing identifier fragments (`test_import`) and
/// member accesses (`a.import(...)`).
pub(crate) fn at_statement_boundary(source: &str, offset: usize) -> bool {
    if offset == 0 {
        return true;
    }
    let prev = source.as_bytes()[offset - 1];
    prev.is_ascii_whitespace() || b";{}()[],:&=".contains(&prev)
}

/// The character after the keyword must not continue an identifier
/// (`importantVar`, `exports`).
pub(crate) fn continues_identifier(source: &str, end: usize) -> bool {
    match source.as_bytes().get(end) {
        Some(&c) => c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || c >= 0x80,
        None => false,
    }
}

/// One element of a destructuring pattern in `export let {a, b: c} = init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PatternBinding {
    pub key: PatternKey,
    /// The bound local, which is also the exported name.
    pub local: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PatternKey {
    /// Property name in an object pattern.
    Property(String),
    /// Element index in an array pattern.
    Index(usize),
}

/// A classified statement. `end` is the source offset one past the consumed
/// text; everything after `end` is rescanned as ordinary text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Statement {
    /// `import.meta`
    ImportMeta { end: usize },
    /// `import "specifier" [with { type: "..." }];`
    BareImport {
        specifier: String,
        attr_type: Option<String>,
        end: usize,
    },
    /// `import(` — only the callee is consumed; the argument stays in the
    /// output and is rescanned. `literal` is set when the argument is a
    /// single string literal, so the dependency is statically known.
    DynamicImport {
        literal: Option<String>,
        end: usize,
    },
    /// `import <clause> from "specifier" [with { type: "..." }];`
    ImportClause {
        default: Option<String>,
        namespace: Option<String>,
        named: Vec<DestructuredBinding>,
        specifier: String,
        attr_type: Option<String>,
        end: usize,
    },
    /// `export * [as name] from "specifier";`
    ExportStar {
        alias: Option<String>,
        specifier: String,
        end: usize,
    },
    /// `export { a, b as c } from "specifier";`
    ExportNamedFrom {
        bindings: Vec<DestructuredBinding>,
        specifier: String,
        end: usize,
    },
    /// `export { a, b as c };`
    ExportNamed {
        bindings: Vec<DestructuredBinding>,
        end: usize,
    },
    /// `export [default] [async] function|function*|class <name>` — `end`
    /// points at the declaration keyword, so only `export [default]` is
    /// stripped and the declaration itself stays in place.
    ExportDeclaration {
        default: bool,
        name: String,
        end: usize,
    },
    /// `export default <expression>` — `end` points at the expression.
    ExportDefaultExpr { end: usize },
    /// `export let|const|var a, b ...` with simple identifiers — `end`
    /// points at the declaration keyword.
    ExportVariable { names: Vec<String>, end: usize },
    /// `export let|const|var {..}|[..] = init` — `end` points past the `=`;
    /// the initializer is captured into a synthetic temporary.
    ExportPattern {
        bindings: Vec<PatternBinding>,
        end: usize,
    },
}

/// Classification failure that aborts the whole compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ScanError {
    /// An export construct matched but a required name could not be
    /// extracted.
    AmbiguousExport { offset: usize, detail: String },
    /// A new import clause begins before the previous one reached `from`.
    DuplicateImportStart { offset: usize },
}

/// Classify the accepted candidate at `offset`. `Ok(None)` means the text is
/// not a recognizable module statement and is left verbatim.
pub(crate) fn classify(
    source: &str,
    offset: usize,
    keyword: Keyword,
) -> Result<Option<Statement>, ScanError> {
    match keyword {
        Keyword::Import => classify_import(source, offset),
        Keyword::Export => classify_export(source, offset),
    }
}

fn classify_import(source: &str, offset: usize) -> Result<Option<Statement>, ScanError> {
    let mut cur = Cursor::new(source, offset + KEYWORD_LEN);
    cur.skip_trivia();
    match cur.peek() {
        Some(b'.') => {
            cur.pos += 1;
            cur.skip_trivia();
            if cur.eat_word("meta") {
                Ok(Some(Statement::ImportMeta { end: cur.pos }))
            } else {
                Ok(None)
            }
        }
        Some(b'(') => {
            cur.pos += 1;
            let end = cur.pos;
            // Peek ahead for a statically-known specifier; the argument text
            // itself is not consumed.
            let mut probe = cur.clone();
            probe.skip_trivia();
            let literal = probe.string_literal().and_then(|s| {
                probe.skip_trivia();
                matches!(probe.peek(), Some(b')') | Some(b',')).then(|| s.to_string())
            });
            Ok(Some(Statement::DynamicImport { literal, end }))
        }
        Some(b'"') | Some(b'\'') => {
            let Some(specifier) = cur.string_literal() else {
                return Ok(None);
            };
            let specifier = specifier.to_string();
            cur.skip_trivia();
            let Ok(attr_type) = parse_attributes(&mut cur) else {
                return Ok(None);
            };
            cur.skip_trivia();
            cur.eat_byte(b';');
            Ok(Some(Statement::BareImport {
                specifier,
                attr_type,
                end: cur.pos,
            }))
        }
        _ => classify_import_clause(source, cur),
    }
}

fn classify_import_clause(
    source: &str,
    mut cur: Cursor<'_>,
) -> Result<Option<Statement>, ScanError> {
    let mut default = None;
    let mut namespace = None;
    let mut named = Vec::new();

    if let Some(c) = cur.peek()
        && is_ident_start(c)
    {
        let Some(name) = cur.ident() else {
            return Ok(None);
        };
        default = Some(name.to_string());
        cur.skip_trivia();
        if cur.eat_byte(b',') {
            cur.skip_trivia();
        }
    }
    match cur.peek() {
        Some(b'*') => {
            cur.pos += 1;
            cur.skip_trivia();
            if !cur.eat_word("as") {
                return Ok(None);
            }
            cur.skip_trivia();
            let Some(name) = cur.ident() else {
                return Ok(None);
            };
            namespace = Some(name.to_string());
            cur.skip_trivia();
        }
        Some(b'{') => {
            let Ok(bindings) = parse_binding_list(&mut cur) else {
                return Ok(None);
            };
            named = bindings;
            cur.skip_trivia();
        }
        _ => {}
    }
    if default.is_none() && namespace.is_none() && named.is_empty() {
        return Ok(None);
    }

    let from_at = cur.pos;
    match cur.ident() {
        Some("from") => {}
        Some("import") => {
            return Err(ScanError::DuplicateImportStart { offset: from_at });
        }
        _ => return Ok(None),
    }
    cur.skip_trivia();
    let Some(specifier) = cur.string_literal() else {
        // The clause never closed; a following `import` keyword means a
        // second statement opened inside this one.
        return if source[cur.pos..].trim_start().starts_with("import") {
            Err(ScanError::DuplicateImportStart { offset: cur.pos })
        } else {
            Ok(None)
        };
    };
    let specifier = specifier.to_string();
    cur.skip_trivia();
    let Ok(attr_type) = parse_attributes(&mut cur) else {
        return Ok(None);
    };
    cur.skip_trivia();
    cur.eat_byte(b';');
    Ok(Some(Statement::ImportClause {
        default,
        namespace,
        named,
        specifier,
        attr_type,
        end: cur.pos,
    }))
}

fn classify_export(source: &str, offset: usize) -> Result<Option<Statement>, ScanError> {
    let mut cur = Cursor::new(source, offset + KEYWORD_LEN);
    cur.skip_trivia();
    match cur.peek() {
        Some(b'*') => {
            cur.pos += 1;
            cur.skip_trivia();
            let alias = if cur.eat_word("as") {
                cur.skip_trivia();
                let Some(name) = cur.name() else {
                    return Ok(None);
                };
                cur.skip_trivia();
                Some(name)
            } else {
                None
            };
            if !cur.eat_word("from") {
                return Ok(None);
            }
            cur.skip_trivia();
            let Some(specifier) = cur.string_literal() else {
                return Ok(None);
            };
            let specifier = specifier.to_string();
            cur.skip_trivia();
            if parse_attributes(&mut cur).is_err() {
                return Ok(None);
            }
            cur.skip_trivia();
            cur.eat_byte(b';');
            Ok(Some(Statement::ExportStar {
                alias,
                specifier,
                end: cur.pos,
            }))
        }
        Some(b'{') => {
            let Ok(bindings) = parse_binding_list(&mut cur) else {
                return Ok(None);
            };
            cur.skip_trivia();
            if cur.eat_word("from") {
                cur.skip_trivia();
                let Some(specifier) = cur.string_literal() else {
                    return Ok(None);
                };
                let specifier = specifier.to_string();
                cur.skip_trivia();
                if parse_attributes(&mut cur).is_err() {
                    return Ok(None);
                }
                cur.skip_trivia();
                cur.eat_byte(b';');
                Ok(Some(Statement::ExportNamedFrom {
                    bindings,
                    specifier,
                    end: cur.pos,
                }))
            } else {
                cur.eat_byte(b';');
                Ok(Some(Statement::ExportNamed {
                    bindings,
                    end: cur.pos,
                }))
            }
        }
        Some(c) if is_ident_start(c) => classify_export_word(source, cur),
        _ => Ok(None),
    }
}

fn classify_export_word(
    _source: &str,
    mut cur: Cursor<'_>,
) -> Result<Option<Statement>, ScanError> {
    let word_start = cur.pos;
    let Some(word) = cur.ident() else {
        return Ok(None);
    };
    match word {
        "default" => {
            cur.skip_trivia();
            let expr_start = cur.pos;
            let mut probe = cur.clone();
            let mut is_declaration = false;
            if probe.eat_word("async") {
                probe.skip_trivia();
            }
            if probe.eat_word("function") {
                probe.skip_trivia();
                probe.eat_byte(b'*');
                is_declaration = true;
            } else if probe.eat_word("class") {
                is_declaration = true;
            }
            if is_declaration {
                probe.skip_trivia();
                if let Some(name) = probe.ident() {
                    return Ok(Some(Statement::ExportDeclaration {
                        default: true,
                        name: name.to_string(),
                        end: expr_start,
                    }));
                }
            }
            // Anonymous declarations work as expressions once prefixed.
            Ok(Some(Statement::ExportDefaultExpr { end: expr_start }))
        }
        "async" => {
            cur.skip_trivia();
            if !cur.eat_word("function") {
                return Err(ScanError::AmbiguousExport {
                    offset: word_start,
                    detail: "expected `function` after `export async`".into(),
                });
            }
            cur.skip_trivia();
            cur.eat_byte(b'*');
            cur.skip_trivia();
            let Some(name) = cur.ident() else {
                return Err(ScanError::AmbiguousExport {
                    offset: word_start,
                    detail: "exported function has no name".into(),
                });
            };
            Ok(Some(Statement::ExportDeclaration {
                default: false,
                name: name.to_string(),
                end: word_start,
            }))
        }
        "function" | "class" => {
            if word == "function" {
                cur.skip_trivia();
                cur.eat_byte(b'*');
            }
            cur.skip_trivia();
            let Some(name) = cur.ident() else {
                return Err(ScanError::AmbiguousExport {
                    offset: word_start,
                    detail: format!("exported {word} has no name"),
                });
            };
            Ok(Some(Statement::ExportDeclaration {
                default: false,
                name: name.to_string(),
                end: word_start,
            }))
        }
        "let" | "const" | "var" => classify_export_variable(cur, word_start),
        other => Err(ScanError::AmbiguousExport {
            offset: word_start,
            detail: format!("unsupported export form `{other}`"),
        }),
    }
}

fn classify_export_variable(
    mut cur: Cursor<'_>,
    decl_start: usize,
) -> Result<Option<Statement>, ScanError> {
    cur.skip_trivia();
    match cur.peek() {
        Some(b'{') => {
            let bindings = parse_object_pattern(&mut cur, decl_start)?;
            cur.skip_trivia();
            if !cur.eat_byte(b'=') {
                return Err(ScanError::AmbiguousExport {
                    offset: decl_start,
                    detail: "destructuring export has no initializer".into(),
                });
            }
            Ok(Some(Statement::ExportPattern {
                bindings,
                end: cur.pos,
            }))
        }
        Some(b'[') => {
            let bindings = parse_array_pattern(&mut cur, decl_start)?;
            cur.skip_trivia();
            if !cur.eat_byte(b'=') {
                return Err(ScanError::AmbiguousExport {
                    offset: decl_start,
                    detail: "destructuring export has no initializer".into(),
                });
            }
            Ok(Some(Statement::ExportPattern {
                bindings,
                end: cur.pos,
            }))
        }
        _ => {
            let mut names = Vec::new();
            loop {
                cur.skip_trivia();
                let Some(name) = cur.ident() else {
                    if names.is_empty() {
                        return Err(ScanError::AmbiguousExport {
                            offset: decl_start,
                            detail: "exported variable has no name".into(),
                        });
                    }
                    break;
                };
                names.push(name.to_string());
                cur.skip_trivia();
                if cur.eat_byte(b'=') {
                    // Skip the initializer so later declarators are still
                    // collected.
                    cur.skip_default_value(b';');
                    cur.skip_trivia();
                }
                if !cur.eat_byte(b',') {
                    break;
                }
            }
            // Only `export` is stripped; the declaration itself (including
            // the names just read) is left in place and rescanned.
            Ok(Some(Statement::ExportVariable {
                names,
                end: decl_start,
            }))
        }
    }
}

fn parse_object_pattern(
    cur: &mut Cursor<'_>,
    decl_start: usize,
) -> Result<Vec<PatternBinding>, ScanError> {
    let ambiguous = |detail: &str| ScanError::AmbiguousExport {
        offset: decl_start,
        detail: detail.into(),
    };
    cur.pos += 1; // {
    let mut out = Vec::new();
    loop {
        cur.skip_trivia();
        if cur.eat_byte(b'}') {
            return Ok(out);
        }
        if cur.starts_with("...") {
            return Err(ambiguous("rest element in destructured export"));
        }
        let key = if matches!(cur.peek(), Some(b'"') | Some(b'\'')) {
            match cur.string_literal() {
                Some(s) => s.to_string(),
                None => return Err(ambiguous("malformed destructured export")),
            }
        } else {
            match cur.ident() {
                Some(name) => name.to_string(),
                None => return Err(ambiguous("malformed destructured export")),
            }
        };
        cur.skip_trivia();
        let local = if cur.eat_byte(b':') {
            cur.skip_trivia();
            match cur.ident() {
                Some(name) => name.to_string(),
                // Nested patterns are not supported.
                None => return Err(ambiguous("nested pattern in destructured export")),
            }
        } else {
            key.clone()
        };
        out.push(PatternBinding {
            key: PatternKey::Property(key),
            local,
        });
        cur.skip_trivia();
        if cur.eat_byte(b'=') {
            cur.skip_default_value(b'}');
        }
        cur.skip_trivia();
        if cur.eat_byte(b',') {
            continue;
        }
        cur.skip_trivia();
        if cur.eat_byte(b'}') {
            return Ok(out);
        }
        return Err(ambiguous("malformed destructured export"));
    }
}

fn parse_array_pattern(
    cur: &mut Cursor<'_>,
    decl_start: usize,
) -> Result<Vec<PatternBinding>, ScanError> {
    let ambiguous = |detail: &str| ScanError::AmbiguousExport {
        offset: decl_start,
        detail: detail.into(),
    };
    cur.pos += 1; // [
    let mut out = Vec::new();
    let mut index = 0usize;
    loop {
        cur.skip_trivia();
        if cur.eat_byte(b']') {
            return Ok(out);
        }
        if cur.eat_byte(b',') {
            // Hole.
            index += 1;
            continue;
        }
        if cur.starts_with("...") {
            return Err(ambiguous("rest element in destructured export"));
        }
        let Some(local) = cur.ident() else {
            return Err(ambiguous("nested pattern in destructured export"));
        };
        out.push(PatternBinding {
            key: PatternKey::Index(index),
            local: local.to_string(),
        });
        cur.skip_trivia();
        if cur.eat_byte(b'=') {
            cur.skip_default_value(b']');
        }
        cur.skip_trivia();
        if cur.eat_byte(b',') {
            index += 1;
            continue;
        }
        cur.skip_trivia();
        if cur.eat_byte(b']') {
            return Ok(out);
        }
        return Err(ambiguous("malformed destructured export"));
    }
}

/// Parse `{ a, b as c, "s" as d, default as e }`. `Err` means the list is
/// malformed and the candidate should stay verbatim.
fn parse_binding_list(cur: &mut Cursor<'_>) -> Result<Vec<DestructuredBinding>, Malformed> {
    cur.pos += 1; // {
    let mut out = Vec::new();
    loop {
        cur.skip_trivia();
        if cur.eat_byte(b'}') {
            return Ok(out);
        }
        let imported = cur.name().ok_or(Malformed)?;
        cur.skip_trivia();
        let alias = if cur.eat_word("as") {
            cur.skip_trivia();
            Some(cur.name().ok_or(Malformed)?)
        } else {
            None
        };
        out.push(DestructuredBinding { imported, alias });
        cur.skip_trivia();
        if cur.eat_byte(b',') {
            continue;
        }
        cur.skip_trivia();
        if cur.eat_byte(b'}') {
            return Ok(out);
        }
        return Err(Malformed);
    }
}

/// Parse an optional `with { type: "...", ... }` attribute clause, returning
/// the `type` value when present.
fn parse_attributes(cur: &mut Cursor<'_>) -> Result<Option<String>, Malformed> {
    let mut probe = cur.clone();
    if !probe.eat_word("with") {
        return Ok(None);
    }
    probe.skip_trivia();
    if !probe.eat_byte(b'{') {
        return Ok(None);
    }
    let mut attr_type = None;
    loop {
        probe.skip_trivia();
        if probe.eat_byte(b'}') {
            break;
        }
        let key = probe.name().ok_or(Malformed)?;
        probe.skip_trivia();
        if !probe.eat_byte(b':') {
            return Err(Malformed);
        }
        probe.skip_trivia();
        let value = probe.string_literal().ok_or(Malformed)?.to_string();
        if key == "type" {
            attr_type = Some(value);
        }
        probe.skip_trivia();
        if probe.eat_byte(b',') {
            continue;
        }
        probe.skip_trivia();
        if probe.eat_byte(b'}') {
            break;
        }
        return Err(Malformed);
    }
    *cur = probe;
    Ok(attr_type)
}

#[derive(Debug)]
struct Malformed;

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'$' || c >= 0x80
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || c >= 0x80
}

/// Byte cursor over statement text, with comment-aware trivia skipping.
#[derive(Debug, Clone)]
struct Cursor<'s> {
    source: &'s str,
    pos: usize,
}

impl<'s> Cursor<'s> {
    fn new(source: &'s str, pos: usize) -> Self {
        Self { source, pos }
    }

    fn bytes(&self) -> &'s [u8] {
        self.source.as_bytes()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.source[self.pos..].starts_with(prefix)
    }

    /// Skip whitespace (including newlines) and comments.
    fn skip_trivia(&mut self) {
        loop {
            while self
                .peek()
                .is_some_and(|c| c.is_ascii_whitespace())
            {
                self.pos += 1;
            }
            if self.starts_with("/*") {
                match self.source[self.pos + 2..].find("*/") {
                    Some(i) => self.pos += 2 + i + 2,
                    None => {
                        self.pos = self.source.len();
                        return;
                    }
                }
            } else if self.starts_with("//") {
                match memchr::memchr(b'\n', &self.bytes()[self.pos..]) {
                    Some(i) => self.pos += i,
                    None => {
                        self.pos = self.source.len();
                        return;
                    }
                }
            } else {
                return;
            }
        }
    }

    fn eat_byte(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume `word` only when it is identifier-bounded.
    fn eat_word(&mut self, word: &str) -> bool {
        if self.starts_with(word)
            && !self
                .bytes()
                .get(self.pos + word.len())
                .is_some_and(|&c| is_ident_continue(c))
        {
            self.pos += word.len();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Option<&'s str> {
        let start = self.pos;
        if !self.peek().is_some_and(is_ident_start) {
            return None;
        }
        while self.peek().is_some_and(is_ident_continue) {
            self.pos += 1;
        }
        Some(&self.source[start..self.pos])
    }

    /// An identifier or a quoted string name, as used in binding lists.
    fn name(&mut self) -> Option<String> {
        if matches!(self.peek(), Some(b'"') | Some(b'\'')) {
            self.string_literal().map(str::to_string)
        } else {
            self.ident().map(str::to_string)
        }
    }

    /// Consume a quoted string and return its raw contents.
    fn string_literal(&mut self) -> Option<&'s str> {
        let quote = self.peek()?;
        if quote != b'"' && quote != b'\'' {
            return None;
        }
        let start = self.pos + 1;
        let bytes = self.bytes();
        let mut i = start;
        while i < bytes.len() {
            if bytes[i] == quote {
                let mut backslashes = 0;
                while backslashes < i - start && bytes[i - 1 - backslashes] == b'\\' {
                    backslashes += 1;
                }
                if backslashes % 2 == 0 {
                    self.pos = i + 1;
                    return Some(&self.source[start..i]);
                }
            }
            i += 1;
        }
        None
    }

    /// Skip an initializer or default-value expression, up to a top-level
    /// `,` or the closing delimiter. Neither terminator is consumed.
    fn skip_default_value(&mut self, close: u8) {
        let mut depth = 0u32;
        while let Some(c) = self.peek() {
            match c {
                b'"' | b'\'' => {
                    if self.string_literal().is_none() {
                        self.pos = self.source.len();
                        return;
                    }
                    continue;
                }
                b'`' => {
                    // Commas in template text are not list separators.
                    let bytes = self.bytes();
                    let mut i = self.pos + 1;
                    while i < bytes.len() {
                        if bytes[i] == b'`' {
                            let mut backslashes = 0;
                            while backslashes < i && bytes[i - 1 - backslashes] == b'\\' {
                                backslashes += 1;
                            }
                            if backslashes % 2 == 0 {
                                break;
                            }
                        }
                        i += 1;
                    }
                    if i >= bytes.len() {
                        self.pos = bytes.len();
                        return;
                    }
                    self.pos = i + 1;
                    continue;
                }
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => {
                    if depth == 0 && c == close {
                        return;
                    }
                    depth = depth.saturating_sub(1);
                }
                b',' if depth == 0 => return,
                _ => {}
            }
            self.pos += 1;
        }
    }
}
