//! Ruby parser: a recursive Pratt parser over the context-aware lexer.
//!
//! The parser consumes tokens from [`ruby_lexer::Lexer`] with a two-token
//! window and no backtracking, producing a [`ruby_ast::Node`] tree plus
//! structured diagnostics. Parsing is fully recoverable: invalid input
//! yields a best-effort tree with `Missing` nodes and one diagnostic per
//! problem; only the recursion-depth cap stops descent early.
//!
//! # Usage
//!
//! ```
//! use ruby_parser::{parse, Options};
//!
//! let result = parse(b"a = 1", &Options::default());
//! assert!(result.errors.is_empty());
//! assert!(result.node.to_sexp().contains("local_variable_write"));
//! ```

mod context;
mod precedence;
mod scope;

pub mod parser;

pub use parser::Parser;
pub use ruby_ast::{Node, NodeKind};
pub use ruby_error::{Diagnostic, DiagnosticId, Level};
pub use scope::ParameterBits;

use ruby_position_tracking::ByteSpan;

/// Command-line switches that alter parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandLine(u8);

impl CommandLine {
    /// `-p`: wrap statements in `while gets; …; print $_; end`
    pub const P: CommandLine = CommandLine(1 << 0);
    /// `-n`: wrap statements in `while gets; …; end`
    pub const N: CommandLine = CommandLine(1 << 1);
    /// `-a`: prepend `$F = $_.split($;)` inside the loop
    pub const A: CommandLine = CommandLine(1 << 2);
    /// `-l`: pass `chomp: true` to `gets`
    pub const L: CommandLine = CommandLine(1 << 3);
    /// `-e`: suppress minor warnings
    pub const E: CommandLine = CommandLine(1 << 4);
    /// `-x`: skip leading content until a `ruby` shebang line
    pub const X: CommandLine = CommandLine(1 << 5);

    /// No switches
    pub const fn none() -> Self {
        CommandLine(0)
    }

    /// True if `switch` is set
    pub const fn has(self, switch: CommandLine) -> bool {
        self.0 & switch.0 != 0
    }

    /// Union of switch sets
    pub const fn with(self, switch: CommandLine) -> CommandLine {
        CommandLine(self.0 | switch.0)
    }
}

/// Which Ruby's parsing rules to follow where they changed across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyntaxVersion {
    /// Current rules (Ruby 3.4)
    #[default]
    Latest,
    /// Ruby 3.3 rules (`\u` in regexps, indexer argument checks)
    CRuby3_3,
}

/// A scope seeded from outside the source (eval-style parses).
#[derive(Debug, Clone, Default)]
pub struct OuterScope {
    /// Locals already bound in this scope
    pub locals: Vec<String>,
    /// Forwarding forms (`*`, `**`, `&`, `...`) declared outside
    pub forwarding: ParameterBits,
    /// Suppress numbered parameters and `it`
    pub implicit_disallowed: bool,
}

/// Parse configuration.
#[derive(Debug, Clone)]
pub struct Options {
    /// Path reported by `__FILE__`
    pub filepath: String,
    /// 1-based number of the first source line
    pub line: i32,
    /// Initial encoding name (default UTF-8)
    pub encoding: Option<String>,
    /// Ignore `coding:` magic comments
    pub encoding_locked: bool,
    /// Explicit frozen-string-literal setting; `None` defers to the magic
    /// comment
    pub frozen_string_literal: Option<bool>,
    /// Command-line switches
    pub command_line: CommandLine,
    /// Version-dependent rules
    pub version: SyntaxVersion,
    /// Outer scopes for eval-style parsing, outermost first
    pub scopes: Vec<OuterScope>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            filepath: String::new(),
            line: 1,
            encoding: None,
            encoding_locked: false,
            frozen_string_literal: None,
            command_line: CommandLine::none(),
            version: SyntaxVersion::default(),
            scopes: Vec::new(),
        }
    }
}

/// Everything a completed parse produces.
#[derive(Debug)]
pub struct ParseResult {
    /// The tree; present even for invalid input
    pub node: Node,
    /// Syntax errors, in source order of detection
    pub errors: Vec<Diagnostic>,
    /// Warnings
    pub warnings: Vec<Diagnostic>,
    /// The `__END__` data range, if any
    pub data_span: Option<ByteSpan>,
    /// Magic-comment settings observed
    pub magic: ruby_lexer::MagicState,
    /// Byte offsets of every newline, for line/column rendering
    pub newline_offsets: Vec<usize>,
}

/// Parses a complete source buffer.
pub fn parse(source: &[u8], options: &Options) -> ParseResult {
    let mut parser = Parser::new(source, options);
    let node = parser.parse();
    ParseResult {
        node,
        errors: parser.errors().to_vec(),
        warnings: parser.warnings().to_vec(),
        data_span: parser.data_span(),
        magic: parser.magic().clone(),
        newline_offsets: parser.newline_offsets(),
    }
}

/// True when `source` parses without errors.
pub fn parse_success(source: &[u8], options: &Options) -> bool {
    parse(source, options).errors.is_empty()
}

/// Streaming entry point: pulls lines from `gets` into a growing buffer and
/// re-parses until no unterminated-construct error remains or `__END__` was
/// seen. Returns the accumulated buffer and the final result.
pub fn parse_stream(
    mut gets: impl FnMut() -> Option<Vec<u8>>,
    options: &Options,
) -> (Vec<u8>, ParseResult) {
    let mut buffer: Vec<u8> = Vec::new();
    loop {
        let Some(line) = gets() else {
            let result = parse(&buffer, options);
            return (buffer, result);
        };
        buffer.extend_from_slice(&line);
        let result = parse(&buffer, options);
        if result.data_span.is_some() {
            return (buffer, result);
        }
        let unterminated = result
            .errors
            .iter()
            .any(|d| is_unterminated_id(d.id));
        if !unterminated {
            return (buffer, result);
        }
    }
}

fn is_unterminated_id(id: DiagnosticId) -> bool {
    matches!(
        id,
        DiagnosticId::StringUnterminated
            | DiagnosticId::RegexpUnterminated
            | DiagnosticId::ListUnterminated
            | DiagnosticId::HeredocUnterminated
            | DiagnosticId::PercentUnterminated
            | DiagnosticId::EmbDocUnterminated
            | DiagnosticId::EndExpected
    )
}

/// Interface to the external regular-expression sub-parser.
///
/// The core hands over the unescaped regexp source and two callbacks: one
/// per named capture group, one per structural error. The full regexp
/// grammar is owned by the implementation behind this trait.
pub trait RegexpParser {
    /// Scans `source`, invoking `on_named_capture` for every `(?<name>…)` /
    /// `(?'name'…)` group and `on_error` for structural problems.
    fn parse(
        &self,
        source: &[u8],
        on_named_capture: &mut dyn FnMut(&[u8]),
        on_error: &mut dyn FnMut(&str),
    );
}

/// Default regexp sub-parser: structural validation (balanced groups and
/// classes) plus named-capture discovery. Not a full regexp grammar.
pub struct BasicRegexpParser;

impl RegexpParser for BasicRegexpParser {
    fn parse(
        &self,
        source: &[u8],
        on_named_capture: &mut dyn FnMut(&[u8]),
        on_error: &mut dyn FnMut(&str),
    ) {
        let mut depth: isize = 0;
        let mut pos = 0;
        while pos < source.len() {
            match source[pos] {
                b'\\' => pos += 1,
                b'(' => {
                    depth += 1;
                    // (?<name>…) or (?'name'…), but not (?<= / (?<!
                    if source.get(pos + 1) == Some(&b'?') {
                        let (open, close) = match source.get(pos + 2) {
                            Some(b'<') => (pos + 3, b'>'),
                            Some(b'\'') => (pos + 3, b'\''),
                            _ => (0, 0),
                        };
                        if open != 0 && !matches!(source.get(open), Some(b'=') | Some(b'!')) {
                            let mut end = open;
                            while end < source.len()
                                && source[end] != close
                                && source[end] != b')'
                            {
                                end += 1;
                            }
                            if source.get(end) == Some(&close) && end > open {
                                on_named_capture(&source[open..end]);
                            }
                        }
                    }
                }
                b')' => {
                    depth -= 1;
                    if depth < 0 {
                        on_error("unmatched close parenthesis");
                        depth = 0;
                    }
                }
                b'[' => {
                    // Skip a character class, honoring escapes
                    pos += 1;
                    while pos < source.len() && source[pos] != b']' {
                        if source[pos] == b'\\' {
                            pos += 1;
                        }
                        pos += 1;
                    }
                    if pos >= source.len() {
                        on_error("premature end of char-class");
                    }
                }
                _ => {}
            }
            pos += 1;
        }
        if depth > 0 {
            on_error("end pattern with unmatched parenthesis");
        }
    }
}

#[cfg(test)]
mod regexp_tests {
    use super::*;

    fn captures_of(source: &[u8]) -> (Vec<Vec<u8>>, Vec<String>) {
        let mut names = Vec::new();
        let mut errors = Vec::new();
        BasicRegexpParser.parse(
            source,
            &mut |name| names.push(name.to_vec()),
            &mut |err| errors.push(err.to_string()),
        );
        (names, errors)
    }

    #[test]
    fn named_captures_are_discovered() {
        let (names, errors) = captures_of(b"(?<year>\\d+)-(?<month>\\d+)");
        assert_eq!(names, vec![b"year".to_vec(), b"month".to_vec()]);
        assert!(errors.is_empty());
    }

    #[test]
    fn lookbehind_is_not_a_capture() {
        let (names, _) = captures_of(b"(?<=x)(?<!y)a");
        assert!(names.is_empty());
    }

    #[test]
    fn quoted_capture_name() {
        let (names, _) = captures_of(b"(?'word'\\w+)");
        assert_eq!(names, vec![b"word".to_vec()]);
    }

    #[test]
    fn unbalanced_groups_error() {
        let (_, errors) = captures_of(b"(a");
        assert_eq!(errors.len(), 1);
        let (_, errors) = captures_of(b"a)");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn escaped_parens_are_ignored() {
        let (_, errors) = captures_of(br"\(a\)");
        assert!(errors.is_empty());
    }

    #[test]
    fn char_class_hides_parens() {
        let (_, errors) = captures_of(b"[()]");
        assert!(errors.is_empty());
    }
}
