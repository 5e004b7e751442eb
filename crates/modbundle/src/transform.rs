//! Per-module source transformation.
//!
//! A module's source is copied line by line into a `pub mod <name> { ... }` block.
//! Depending on the [`FilterPolicy`], comment-only lines and `#[cfg(test)]`
//! sections are dropped on the way. Each line is first run through a small lexer
//! that carries block-comment depth and string literal state from one line to the
//! next. The filters then work on what the lexer saw outside comments and literals:
//!
//! - A test section starts at a line whose code begins with `#[cfg(test)]`. Braces
//!   outside comments and literals are counted from there, and the section ends
//!   once the depth returns to zero. If the gated item turns out to be brace-less,
//!   the first line whose code ends in `;` closes it. A section never ends inside a
//!   block comment or a string literal. A section still open at the end of the
//!   source swallows everything up to EOF.
//! - A comment line has comment text and no code. Lines inside a multi-line string
//!   literal are never comment lines. Block comments nest.
//! - Lines that mix code and comments are kept as they are. When such a line opens
//!   or closes a block comment spanning several lines, the other boundary line of
//!   that comment is kept too so the delimiters stay paired. Only the interior
//!   lines are dropped.
//!
//! Trailing whitespace is stripped from every kept line, including lines that
//! continue a multi-line string literal.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::registry::ModuleName;

static TEST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#\[cfg\(\s*test\s*\)\]").expect("test marker pattern is valid"));

/// Which kinds of lines survive the transformation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterPolicy {
    pub keep_comments: bool,
    pub keep_test_blocks: bool,
}

impl FilterPolicy {
    /// Copy every line
    pub const KEEP_ALL: Self = Self {
        keep_comments: true,
        keep_test_blocks: true,
    };

    /// Drop comment lines and test sections
    pub const STRIP_ALL: Self = Self {
        keep_comments: false,
        keep_test_blocks: false,
    };
}

/// Lexical context at a line boundary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Lexical {
    #[default]
    Code,
    BlockComment {
        depth: usize,
    },
    Str,
    RawStr {
        hashes: usize,
    },
}

impl Lexical {
    fn comment_depth(self) -> usize {
        match self {
            Self::BlockComment { depth } => depth,
            _ => 0,
        }
    }
}

/// One source line as seen by the [`Lexer`]
#[derive(Debug)]
struct ScannedLine<'a> {
    text: &'a str,
    /// Code outside comments, with literal contents masked
    code: String,
    has_comment: bool,
    start: Lexical,
    end: Lexical,
}

impl ScannedLine<'_> {
    fn has_code(&self) -> bool {
        !self.code.trim().is_empty()
    }

    fn is_comment_only(&self) -> bool {
        self.has_comment && !self.has_code()
    }

    fn changes_comment_depth(&self) -> bool {
        self.start.comment_depth() != self.end.comment_depth()
    }
}

#[derive(Debug, Default)]
struct Lexer {
    state: Lexical,
}

impl Lexer {
    fn scan<'a>(&mut self, text: &'a str) -> ScannedLine<'a> {
        let start = self.state;
        let chars: Vec<char> = text.chars().collect();
        let mut code = String::with_capacity(text.len());
        let mut has_comment = start.comment_depth() > 0;

        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();
            match self.state {
                Lexical::Code => match (c, next) {
                    ('/', Some('/')) => {
                        has_comment = true;
                        break;
                    }
                    ('/', Some('*')) => {
                        has_comment = true;
                        self.state = Lexical::BlockComment { depth: 1 };
                        code.push(' ');
                        i += 2;
                        continue;
                    }
                    ('"', _) => {
                        self.state = Lexical::Str;
                        code.push('"');
                    }
                    ('r', _) if raw_string_start(&chars, i) => {
                        let hashes = chars[i + 1..].iter().take_while(|&&ch| ch == '#').count();
                        self.state = Lexical::RawStr { hashes };
                        code.push('"');
                        i += hashes + 2;
                        continue;
                    }
                    ('\'', _) => {
                        if let Some(len) = char_literal_len(&chars[i..]) {
                            code.push_str("'_'");
                            i += len;
                            continue;
                        }
                        code.push(c);
                    }
                    _ => code.push(c),
                },
                Lexical::BlockComment { depth } => match (c, next) {
                    ('/', Some('*')) => {
                        self.state = Lexical::BlockComment { depth: depth + 1 };
                        i += 2;
                        continue;
                    }
                    ('*', Some('/')) => {
                        self.state = if depth == 1 {
                            code.push(' ');
                            Lexical::Code
                        } else {
                            Lexical::BlockComment { depth: depth - 1 }
                        };
                        i += 2;
                        continue;
                    }
                    _ => {}
                },
                Lexical::Str => match c {
                    '\\' => {
                        code.push('_');
                        if next.is_some() {
                            code.push('_');
                            i += 2;
                            continue;
                        }
                    }
                    '"' => {
                        self.state = Lexical::Code;
                        code.push('"');
                    }
                    _ => code.push(mask(c)),
                },
                Lexical::RawStr { hashes } => {
                    let closes = c == '"'
                        && chars
                            .get(i + 1..i + 1 + hashes)
                            .is_some_and(|tail| tail.iter().all(|&ch| ch == '#'));
                    if closes {
                        self.state = Lexical::Code;
                        code.push('"');
                        i += hashes + 1;
                        continue;
                    }
                    code.push(mask(c));
                }
            }
            i += 1;
        }

        ScannedLine {
            text,
            code,
            has_comment,
            start,
            end: self.state,
        }
    }
}

fn mask(c: char) -> char {
    if c.is_whitespace() { c } else { '_' }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whether `chars[i]` is the `r` of `r"`, `r#"` or `br"`, and not part of an
/// identifier or a raw identifier such as `r#type`
fn raw_string_start(chars: &[char], i: usize) -> bool {
    let inside_ident = match i.checked_sub(1).map(|p| chars[p]) {
        Some('b') => i >= 2 && is_ident_char(chars[i - 2]),
        Some(prev) => is_ident_char(prev),
        None => false,
    };
    if inside_ident {
        return false;
    }
    let hashes = chars[i + 1..].iter().take_while(|&&ch| ch == '#').count();
    chars.get(i + 1 + hashes) == Some(&'"')
}

/// Length of the char literal at the start of `rest`, or `None` for a lifetime
fn char_literal_len(rest: &[char]) -> Option<usize> {
    match rest.get(1) {
        Some('\\') => rest
            .get(3..)?
            .iter()
            .position(|&ch| ch == '\'')
            .map(|p| p + 4),
        Some(_) if rest.get(2) == Some(&'\'') => Some(3),
        _ => None,
    }
}

/// Brace bookkeeping for a `#[cfg(test)]` section being skipped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct OmittedSection {
    depth: usize,
    opened: bool,
    finished: bool,
}

impl OmittedSection {
    /// Account for the code of one line; returns true once the section is closed
    fn feed(&mut self, code: &str, end: Lexical) -> bool {
        if !self.finished {
            for c in code.chars() {
                match c {
                    '{' => {
                        self.depth += 1;
                        self.opened = true;
                    }
                    '}' => self.depth = self.depth.saturating_sub(1),
                    _ => {}
                }
            }
            self.finished = if self.opened {
                self.depth == 0
            } else {
                code.trim_end().ends_with(';')
            };
        }
        self.finished && end == Lexical::Code
    }
}

fn omit_test_sections(lines: &[ScannedLine<'_>], keep: &mut [bool]) {
    let mut section: Option<OmittedSection> = None;
    for (idx, line) in lines.iter().enumerate() {
        if let Some(mut current) = section.take() {
            keep[idx] = false;
            if !current.feed(&line.code, line.end) {
                section = Some(current);
            }
            continue;
        }

        if line.start != Lexical::Code {
            continue;
        }
        let code = line.code.trim_start();
        if let Some(marker) = TEST_MARKER.find(code) {
            keep[idx] = false;
            let mut current = OmittedSection::default();
            if !current.feed(&code[marker.end()..], line.end) {
                section = Some(current);
            }
        }
    }
}

fn omit_comment_lines(lines: &[ScannedLine<'_>], keep: &mut [bool]) {
    let mut idx = 0;
    while idx < lines.len() {
        let line = &lines[idx];
        if line.end.comment_depth() == 0 {
            if line.is_comment_only() {
                keep[idx] = false;
            }
            idx += 1;
            continue;
        }

        // A block comment spanning several lines, up to the line that closes it
        let end = lines[idx..]
            .iter()
            .position(|line| line.end.comment_depth() == 0)
            .map_or(lines.len(), |offset| idx + offset + 1);
        let span = &lines[idx..end];
        let anchored = span.iter().any(ScannedLine::has_code);
        for (offset, line) in span.iter().enumerate() {
            if !anchored || !(line.has_code() || line.changes_comment_depth()) {
                keep[idx + offset] = false;
            }
        }
        idx = end;
    }
}

/// Wrap `source` in a namespace block named after `module`, filtered by `policy`.
///
/// Trailing whitespace is stripped from every kept line; content and order are
/// otherwise unchanged.
pub fn transform(module: &ModuleName, source: &str, policy: FilterPolicy) -> String {
    let mut lexer = Lexer::default();
    let lines: Vec<ScannedLine<'_>> = source
        .lines()
        .map(|line| lexer.scan(line.trim_end()))
        .collect();

    let mut keep = vec![true; lines.len()];
    if !policy.keep_test_blocks {
        omit_test_sections(&lines, &mut keep);
    }
    if !policy.keep_comments {
        omit_comment_lines(&lines, &mut keep);
    }

    let mut out = String::with_capacity(source.len() + module.as_str().len() + 16);
    out.push_str(&format!("pub mod {module} {{\n"));
    for (line, _) in lines.iter().zip(&keep).filter(|(_, kept)| **kept) {
        out.push_str(line.text);
        out.push('\n');
    }
    out.push_str("}\n");
    out
}
