//! Lexical State Tracker
//!
//! Bookkeeping over the spans of source text the rewriter skips: which
//! comment/string/regex/template constructs are currently open and how deep
//! the bracket nesting is. The rewriter consults this state to decide whether
//! a candidate `import`/`export` keyword is live module code or look-alike
//! text inside a literal.

use std::ops::Range;

/// Lexical nesting state for one compile pass.
///
/// All counters are reset at the start of every compile call; nothing here
/// survives across modules.
#[derive(Debug, Default, Clone)]
pub(crate) struct LexicalState {
    /// Block comment open (0/1).
    pub comment: u32,
    /// Line comment open (0/1), cleared by a line feed.
    pub line_comment: u32,
    pub parens: u32,
    pub braces: u32,
    pub brackets: u32,
    /// Regular-expression literal open (0/1).
    pub regex: u32,
    /// Character class inside an open regex (0/1).
    pub regex_brackets: u32,
    pub single_quote: u32,
    pub double_quote: u32,
    /// One entry per open template literal; the value is the brace depth of
    /// its in-progress `${}` interpolation (0 while inside template text).
    pub templates: Vec<u32>,
    /// Offset of the `/` that opened the current block comment, used to keep
    /// `/*/` from closing itself.
    comment_open: usize,
    /// Bytes to skip because a two-character delimiter was already consumed.
    pending_skip: usize,
    /// Last non-whitespace character seen in live code.
    last_significant: Option<u8>,
    /// Trailing identifier word in live code, for `return /re/`-style
    /// regex detection.
    last_word: String,
    /// Whitespace was seen since the last word character, so the next one
    /// starts a fresh word.
    word_break: bool,
}

impl LexicalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `source[range]` and update the nesting counters.
    ///
    /// The full source is passed so that one-character lookahead (`/*`, `//`,
    /// `${`) and backslash escape counting work at span boundaries.
    pub fn advance(&mut self, source: &str, range: Range<usize>) {
        let bytes = source.as_bytes();
        let mut i = range.start;
        while i < range.end {
            if self.pending_skip > 0 {
                self.pending_skip -= 1;
                i += 1;
                continue;
            }
            self.step(bytes, i);
            i += 1;
        }
    }

    /// True when a matched statement keyword may be rewritten: no open
    /// string/comment/regex, and either no template literal is open or the
    /// innermost one is mid-interpolation (live code, not template text).
    pub fn in_rewritable_context(&self) -> bool {
        self.comment == 0
            && self.line_comment == 0
            && self.regex == 0
            && self.single_quote == 0
            && self.double_quote == 0
            && self.templates.last().is_none_or(|depth| *depth > 0)
    }

    /// Record that a whole statement was consumed and replaced by the
    /// rewriter, so the next span starts at a statement boundary.
    pub fn note_statement_end(&mut self) {
        self.last_significant = Some(b';');
        self.last_word.clear();
    }

    /// Record that a value-producing expression was consumed (an
    /// `import.meta` rewrite): a following slash is division, not a regex.
    pub fn note_value_end(&mut self) {
        self.last_significant = Some(b')');
        self.last_word.clear();
    }

    /// Record the `(` consumed by a dynamic-import rewrite; its argument is
    /// rescanned as ordinary text and the matching `)` must balance.
    pub fn note_open_paren(&mut self) {
        self.parens += 1;
        self.last_significant = Some(b'(');
        self.last_word.clear();
    }

    fn step(&mut self, bytes: &[u8], i: usize) {
        let c = bytes[i];

        if self.line_comment == 1 {
            if c == b'\n' {
                self.exit_line_comment();
            }
            return;
        }
        if self.comment == 1 {
            if c == b'/' && i >= self.comment_open + 3 && bytes[i - 1] == b'*' {
                self.exit_block_comment();
            }
            return;
        }
        if self.regex == 1 {
            if is_escaped(bytes, i) {
                return;
            }
            match c {
                b'[' => self.enter_regex_class(),
                b']' => self.exit_regex_class(),
                b'/' if self.regex_brackets == 0 => self.exit_regex(),
                _ => {}
            }
            return;
        }
        if self.single_quote == 1 {
            if c == b'\'' && !is_escaped(bytes, i) {
                self.exit_string();
            }
            return;
        }
        if self.double_quote == 1 {
            if c == b'"' && !is_escaped(bytes, i) {
                self.exit_string();
            }
            return;
        }
        // Template text: the innermost template is not inside a `${}`.
        if self.templates.last() == Some(&0) {
            if is_escaped(bytes, i) {
                return;
            }
            match c {
                b'`' => self.close_template(),
                b'$' if bytes.get(i + 1) == Some(&b'{') => {
                    self.enter_interpolation();
                    self.pending_skip = 1;
                }
                _ => {}
            }
            return;
        }

        // Live code.
        match c {
            b'/' => match bytes.get(i + 1) {
                Some(b'*') => {
                    self.enter_block_comment(i);
                    self.pending_skip = 1;
                }
                Some(b'/') => {
                    self.enter_line_comment();
                    self.pending_skip = 1;
                }
                _ => {
                    if self.expression_expected() {
                        self.enter_regex();
                    } else {
                        // Division operator.
                        self.note_significant(c);
                    }
                }
            },
            b'\'' => self.single_quote = 1,
            b'"' => self.double_quote = 1,
            b'`' => self.open_template(),
            b'(' => {
                self.parens += 1;
                self.note_significant(c);
            }
            b')' => {
                // Unmatched closers are ignored.
                self.parens = self.parens.saturating_sub(1);
                self.note_significant(c);
            }
            b'[' => {
                self.brackets += 1;
                self.note_significant(c);
            }
            b']' => {
                self.brackets = self.brackets.saturating_sub(1);
                self.note_significant(c);
            }
            b'{' => {
                self.braces += 1;
                if let Some(depth) = self.templates.last_mut()
                    && *depth > 0
                {
                    *depth += 1;
                }
                self.note_significant(c);
            }
            b'}' => {
                if let Some(depth) = self.templates.last_mut()
                    && *depth > 0
                {
                    // Depth 1 -> 0 closes the interpolation and resumes
                    // template text.
                    *depth -= 1;
                }
                self.braces = self.braces.saturating_sub(1);
                self.note_significant(c);
            }
            _ => self.note_significant(c),
        }
    }

    fn enter_block_comment(&mut self, offset: usize) {
        self.comment = 1;
        self.comment_open = offset;
    }

    fn exit_block_comment(&mut self) {
        self.comment = 0;
    }

    fn enter_line_comment(&mut self) {
        self.line_comment = 1;
    }

    fn exit_line_comment(&mut self) {
        self.line_comment = 0;
    }

    fn enter_regex(&mut self) {
        self.regex = 1;
        self.regex_brackets = 0;
    }

    fn exit_regex(&mut self) {
        self.regex = 0;
        self.regex_brackets = 0;
        self.note_value_end();
    }

    fn enter_regex_class(&mut self) {
        self.regex_brackets = 1;
    }

    fn exit_regex_class(&mut self) {
        self.regex_brackets = 0;
    }

    fn exit_string(&mut self) {
        self.single_quote = 0;
        self.double_quote = 0;
        self.note_value_end();
    }

    fn open_template(&mut self) {
        self.templates.push(0);
    }

    fn close_template(&mut self) {
        self.templates.pop();
        self.note_value_end();
    }

    fn enter_interpolation(&mut self) {
        if let Some(depth) = self.templates.last_mut() {
            *depth = 1;
        }
        // The `${` brace participates in the global balance so the matching
        // `}` closes the interpolation, not an outer block.
        self.braces += 1;
        self.last_significant = Some(b'{');
        self.last_word.clear();
    }

    /// True when a `/` at the current position starts a regular expression
    /// rather than a division: the nearest preceding non-whitespace token
    /// expects an expression next.
    fn expression_expected(&self) -> bool {
        match self.last_significant {
            None => true,
            Some(c) if b"([{,;=:?!&|+-*/%^~<>".contains(&c) => true,
            Some(_) => matches!(
                self.last_word.as_str(),
                "return"
                    | "typeof"
                    | "instanceof"
                    | "in"
                    | "of"
                    | "new"
                    | "void"
                    | "delete"
                    | "throw"
                    | "case"
                    | "do"
                    | "else"
                    | "yield"
                    | "await"
            ),
        }
    }

    fn note_significant(&mut self, c: u8) {
        if c.is_ascii_whitespace() {
            self.word_break = true;
            return;
        }
        self.last_significant = Some(c);
        if c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || c >= 0x80 {
            if self.word_break {
                self.last_word.clear();
            }
            self.last_word.push(c as char);
        } else {
            self.last_word.clear();
        }
        self.word_break = false;
    }
}

/// Whether the character at `i` is preceded by an odd number of backslashes.
/// `\\` neutralizes itself, so only an odd run escapes the character.
fn is_escaped(bytes: &[u8], i: usize) -> bool {
    let mut n = 0;
    while n < i && bytes[i - 1 - n] == b'\\' {
        n += 1;
    }
    n % 2 == 1
}
