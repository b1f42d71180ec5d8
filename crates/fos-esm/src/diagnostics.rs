//! Diagnostic (Debug) Pass
//!
//! Re-runs the lexical scanner over the raw source, additionally recording
//! the offset at which every construct was opened. When the host engine
//! rejects the assembled output, this pass turns that opaque failure into a
//! line/column-qualified message naming the first unterminated construct.
//! It never runs on the hot compilation path.

use memchr::{memchr_iter, memrchr};

use crate::state::LexicalState;

/// Construct kinds reported for unterminated input, in diagnosis priority
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnterminatedKind {
    Comment,
    Regex,
    RegexCharacterClass,
    SingleQuoteString,
    DoubleQuoteString,
    Parentheses,
    Braces,
    Brackets,
    Template,
}

impl std::fmt::Display for UnterminatedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            UnterminatedKind::Comment => "comment",
            UnterminatedKind::Regex => "regular expression",
            UnterminatedKind::RegexCharacterClass => "regular expression character class",
            UnterminatedKind::SingleQuoteString => "single-quoted string",
            UnterminatedKind::DoubleQuoteString => "double-quoted string",
            UnterminatedKind::Parentheses => "parentheses",
            UnterminatedKind::Braces => "braces",
            UnterminatedKind::Brackets => "brackets",
            UnterminatedKind::Template => "template literal",
        })
    }
}

/// 1-based line and column of a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

/// A construct left open at end of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnterminatedConstruct {
    pub kind: UnterminatedKind,
    pub offset: usize,
    pub position: SourcePosition,
}

/// Convert a byte offset to a 1-based line/column by counting line feeds.
/// The column counts characters, not bytes, so multibyte text earlier on
/// the line does not shift it.
pub fn position_at(source: &str, offset: usize) -> SourcePosition {
    let offset = offset.min(source.len());
    let prefix = &source.as_bytes()[..offset];
    let line = memchr_iter(b'\n', prefix).count() as u32 + 1;
    let line_start = memrchr(b'\n', prefix).map(|p| p + 1).unwrap_or(0);
    SourcePosition {
        line,
        column: source[line_start..offset].chars().count() as u32 + 1,
    }
}

/// Counter snapshot used to detect open/close transitions per character.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Snapshot {
    comment: u32,
    regex: u32,
    regex_brackets: u32,
    single_quote: u32,
    double_quote: u32,
    parens: u32,
    braces: u32,
    brackets: u32,
    templates: usize,
}

impl Snapshot {
    fn of(state: &LexicalState) -> Self {
        Self {
            comment: state.comment,
            regex: state.regex,
            regex_brackets: state.regex_brackets,
            single_quote: state.single_quote,
            double_quote: state.double_quote,
            parens: state.parens,
            braces: state.braces,
            brackets: state.brackets,
            templates: state.templates.len(),
        }
    }
}

/// Scan the whole source, tracking where each construct opened. Returns the
/// first unterminated construct, if any, in the fixed priority order:
/// comment, regex, regex character class, single-quoted string,
/// double-quoted string, parentheses, braces, brackets, template literal.
pub fn locate_unterminated(source: &str) -> Option<UnterminatedConstruct> {
    let mut state = LexicalState::new();
    let mut prev = Snapshot::default();

    let mut comment_open = None;
    let mut regex_open = None;
    let mut class_open = None;
    let mut single_open = None;
    let mut double_open = None;
    let mut parens: Vec<usize> = Vec::new();
    let mut braces: Vec<usize> = Vec::new();
    let mut brackets: Vec<usize> = Vec::new();
    let mut templates: Vec<usize> = Vec::new();

    for i in 0..source.len() {
        state.advance(source, i..i + 1);
        let cur = Snapshot::of(&state);
        if cur == prev {
            continue;
        }

        track_flag(&mut comment_open, prev.comment, cur.comment, i);
        track_flag(&mut regex_open, prev.regex, cur.regex, i);
        track_flag(&mut class_open, prev.regex_brackets, cur.regex_brackets, i);
        track_flag(&mut single_open, prev.single_quote, cur.single_quote, i);
        track_flag(&mut double_open, prev.double_quote, cur.double_quote, i);
        track_stack(&mut parens, prev.parens, cur.parens, i);
        track_stack(&mut braces, prev.braces, cur.braces, i);
        track_stack(&mut brackets, prev.brackets, cur.brackets, i);
        track_stack(
            &mut templates,
            prev.templates as u32,
            cur.templates as u32,
            i,
        );

        prev = cur;
    }

    let found = |kind, offset: usize| {
        Some(UnterminatedConstruct {
            kind,
            offset,
            position: position_at(source, offset),
        })
    };

    if let Some(offset) = comment_open {
        return found(UnterminatedKind::Comment, offset);
    }
    if regex_open.is_some() {
        // The character class is the more specific defect when both are
        // still open.
        return match class_open {
            Some(offset) => found(UnterminatedKind::RegexCharacterClass, offset),
            None => found(UnterminatedKind::Regex, regex_open.unwrap()),
        };
    }
    if let Some(offset) = single_open {
        return found(UnterminatedKind::SingleQuoteString, offset);
    }
    if let Some(offset) = double_open {
        return found(UnterminatedKind::DoubleQuoteString, offset);
    }
    if let Some(&offset) = parens.last() {
        return found(UnterminatedKind::Parentheses, offset);
    }
    if let Some(&offset) = braces.last() {
        return found(UnterminatedKind::Braces, offset);
    }
    if let Some(&offset) = brackets.last() {
        return found(UnterminatedKind::Brackets, offset);
    }
    if let Some(&offset) = templates.last() {
        return found(UnterminatedKind::Template, offset);
    }
    None
}

fn track_flag(slot: &mut Option<usize>, before: u32, after: u32, offset: usize) {
    if after > before {
        *slot = Some(offset);
    } else if after < before {
        *slot = None;
    }
}

fn track_stack(stack: &mut Vec<usize>, before: u32, after: u32, offset: usize) {
    if after > before {
        stack.push(offset);
    } else if after < before {
        stack.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_at() {
        let source = "ab\ncd\nef";
        assert_eq!(position_at(source, 0), SourcePosition { line: 1, column: 1 });
        assert_eq!(position_at(source, 4), SourcePosition { line: 2, column: 2 });
        assert_eq!(position_at(source, 6), SourcePosition { line: 3, column: 1 });
    }

    #[test]
    fn test_balanced_source_is_clean() {
        let source = "const a = (1 + [2]) / {b: `c${d}`}.b; /* ok */ 'x'";
        assert_eq!(locate_unterminated(source), None);
    }

    #[test]
    fn test_unterminated_comment_position() {
        let source = "const a = 1;\nconst b = 2; /* oops";
        let found = locate_unterminated(source).unwrap();
        assert_eq!(found.kind, UnterminatedKind::Comment);
        assert_eq!(found.offset, source.find("/*").unwrap());
        assert_eq!(found.position, SourcePosition { line: 2, column: 14 });
    }

    #[test]
    fn test_position_counts_characters_not_bytes() {
        let source = "const π = 1; /* oops";
        let found = locate_unterminated(source).unwrap();
        assert_eq!(found.kind, UnterminatedKind::Comment);
        assert_eq!(found.offset, 14);
        assert_eq!(found.position, SourcePosition { line: 1, column: 14 });
    }

    #[test]
    fn test_comment_wins_over_braces() {
        let source = "function f() { /* oops";
        let found = locate_unterminated(source).unwrap();
        assert_eq!(found.kind, UnterminatedKind::Comment);
    }

    #[test]
    fn test_unterminated_string() {
        let found = locate_unterminated("const s = 'abc").unwrap();
        assert_eq!(found.kind, UnterminatedKind::SingleQuoteString);
        assert_eq!(found.offset, 10);

        let found = locate_unterminated("const s = \"abc").unwrap();
        assert_eq!(found.kind, UnterminatedKind::DoubleQuoteString);
    }

    #[test]
    fn test_unterminated_regex_and_class() {
        let found = locate_unterminated("const r = /ab").unwrap();
        assert_eq!(found.kind, UnterminatedKind::Regex);
        assert_eq!(found.offset, 10);

        let found = locate_unterminated("const r = /a[bc").unwrap();
        assert_eq!(found.kind, UnterminatedKind::RegexCharacterClass);
        assert_eq!(found.offset, 12);
    }

    #[test]
    fn test_unterminated_brackets_report_innermost() {
        let found = locate_unterminated("f((a, (b").unwrap();
        assert_eq!(found.kind, UnterminatedKind::Parentheses);
        assert_eq!(found.offset, 6);
    }

    #[test]
    fn test_unterminated_template() {
        let found = locate_unterminated("const t = `abc").unwrap();
        assert_eq!(found.kind, UnterminatedKind::Template);
        assert_eq!(found.offset, 10);
    }
}
