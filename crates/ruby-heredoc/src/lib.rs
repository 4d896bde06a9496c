//! Heredoc terminator matching and indentation arithmetic.
//!
//! The lexer drives heredoc scanning (bodies interleave with code on the
//! opener's line); this crate owns the pure byte-level pieces: deciding
//! whether a body line is the terminator, measuring leading whitespace with
//! tab expansion, and computing the common indent that `<<~` strips at close.

use ruby_position_tracking::ByteSpan;

/// Quoting style of a heredoc identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeredocQuote {
    /// Bare identifier (`<<EOS`); body interpolates like a double-quoted string.
    None,
    /// Single-quoted identifier (`<<'EOS'`); no interpolation, minimal escapes.
    Single,
    /// Double-quoted identifier (`<<"EOS"`); interpolates.
    Double,
    /// Backtick identifier (``<<`EOS` ``); body becomes a command string.
    Backtick,
}

/// Indentation mode of a heredoc opener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeredocIndent {
    /// `<<EOS` — terminator must sit at column 0.
    None,
    /// `<<-EOS` — terminator may be indented.
    Dash,
    /// `<<~EOS` — terminator may be indented and the body is dedented by the
    /// common leading whitespace of its lines.
    Tilde,
}

/// Tab stops expand to the next multiple of this width when `<<~` measures
/// leading whitespace.
pub const TAB_WIDTH: usize = 8;

/// Sentinel for "no content line measured yet" in the common-whitespace
/// accumulator.
pub const NO_COMMON_WHITESPACE: usize = usize::MAX;

/// Returns true if `line` (without its trailing newline) terminates a heredoc
/// with the given identifier and indent mode.
pub fn line_is_terminator(line: &[u8], ident: &[u8], indent: HeredocIndent) -> bool {
    let line = strip_trailing_cr(line);
    match indent {
        HeredocIndent::None => line == ident,
        HeredocIndent::Dash | HeredocIndent::Tilde => {
            let trimmed = &line[leading_whitespace_len(line)..];
            trimmed == ident
        }
    }
}

/// Byte length of the leading space/tab run of `line`.
pub fn leading_whitespace_len(line: &[u8]) -> usize {
    line.iter().take_while(|&&b| b == b' ' || b == b'\t').count()
}

/// Visual width of the leading whitespace of `line`, expanding each tab to
/// the next multiple of [`TAB_WIDTH`]. Returns [`NO_COMMON_WHITESPACE`] for
/// lines that are entirely whitespace, which do not participate in `<<~`
/// dedent computation.
pub fn visual_indent(line: &[u8]) -> usize {
    let mut width = 0usize;
    for (i, &b) in line.iter().enumerate() {
        match b {
            b' ' => width += 1,
            b'\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
            _ => {
                let _ = i;
                return width;
            }
        }
    }
    NO_COMMON_WHITESPACE
}

/// Folds one content line into the running common-whitespace accumulator.
pub fn fold_common_whitespace(common: usize, line: &[u8]) -> usize {
    common.min(visual_indent(line))
}

/// Returns the byte length of the prefix of `line` whose visual width is at
/// most `dedent` columns. A tab that straddles the boundary is consumed
/// whole, matching how CRuby dedents squiggly heredocs.
pub fn dedent_prefix_len(line: &[u8], dedent: usize) -> usize {
    if dedent == 0 || dedent == NO_COMMON_WHITESPACE {
        return 0;
    }
    let mut width = 0usize;
    for (i, &b) in line.iter().enumerate() {
        if width >= dedent {
            return i;
        }
        match b {
            b' ' => width += 1,
            b'\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
            _ => return i,
        }
    }
    line.len()
}

/// Applies `<<~` dedenting to a body line span, returning the trimmed span.
pub fn dedent_span(source: &[u8], line: ByteSpan, dedent: usize) -> ByteSpan {
    let strip = dedent_prefix_len(line.slice(source), dedent);
    ByteSpan::new(line.start + strip, line.end)
}

fn strip_trailing_cr(line: &[u8]) -> &[u8] {
    if line.last() == Some(&b'\r') { &line[..line.len() - 1] } else { line }
}

/// Dedents cooked heredoc content by `width` visual columns per line.
/// `first_line` says whether the content starts at a source line start (a
/// run following an interpolation does not, and its first line keeps its
/// bytes).
pub fn dedent_cooked(value: &[u8], width: usize, first_line: bool) -> Vec<u8> {
    if width == 0 || width == NO_COMMON_WHITESPACE {
        return value.to_vec();
    }
    let mut out = Vec::with_capacity(value.len());
    let mut at_line_start = first_line;
    let mut pos = 0;
    while pos < value.len() {
        let line_end = value[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(value.len(), |i| pos + i + 1);
        let line = &value[pos..line_end];
        if at_line_start {
            let strip = dedent_prefix_len(line, width);
            out.extend_from_slice(&line[strip..]);
        } else {
            out.extend_from_slice(line);
        }
        at_line_start = true;
        pos = line_end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_terminator_needs_column_zero() {
        assert!(line_is_terminator(b"EOS", b"EOS", HeredocIndent::None));
        assert!(!line_is_terminator(b"  EOS", b"EOS", HeredocIndent::None));
        assert!(!line_is_terminator(b"EOS2", b"EOS", HeredocIndent::None));
    }

    #[test]
    fn dash_terminator_allows_indent() {
        assert!(line_is_terminator(b"\t EOS", b"EOS", HeredocIndent::Dash));
        assert!(line_is_terminator(b"EOS", b"EOS", HeredocIndent::Tilde));
        assert!(!line_is_terminator(b"  EOS x", b"EOS", HeredocIndent::Dash));
    }

    #[test]
    fn crlf_terminator_lines_match() {
        assert!(line_is_terminator(b"EOS\r", b"EOS", HeredocIndent::None));
    }

    #[test]
    fn visual_indent_expands_tabs() {
        assert_eq!(visual_indent(b"    x"), 4);
        assert_eq!(visual_indent(b"\tx"), 8);
        assert_eq!(visual_indent(b"  \tx"), 8);
        assert_eq!(visual_indent(b"\t x"), 9);
        assert_eq!(visual_indent(b""), NO_COMMON_WHITESPACE);
        assert_eq!(visual_indent(b"   "), NO_COMMON_WHITESPACE);
    }

    #[test]
    fn common_whitespace_folding_skips_blank_lines() {
        let mut common = NO_COMMON_WHITESPACE;
        for line in [&b"    a"[..], b"", b"  b", b"      c"] {
            common = fold_common_whitespace(common, line);
        }
        assert_eq!(common, 2);
    }

    #[test]
    fn dedent_prefix_consumes_straddling_tab() {
        // A tab at column 0 is 8 wide; dedenting by 4 consumes it whole.
        assert_eq!(dedent_prefix_len(b"\tx", 4), 1);
        assert_eq!(dedent_prefix_len(b"    x", 2), 2);
        assert_eq!(dedent_prefix_len(b"  x", 4), 2);
        assert_eq!(dedent_prefix_len(b"x", 4), 0);
    }

    #[test]
    fn dedent_cooked_strips_each_line() {
        let value = b"  a\n    b\nc\n";
        assert_eq!(dedent_cooked(value, 2, true), b"a\n  b\nc\n".to_vec());
        // Not at a line start: the first line keeps its bytes
        assert_eq!(dedent_cooked(b"  x\n  y\n", 2, false), b"  x\ny\n".to_vec());
    }

    #[test]
    fn dedent_span_trims_leading_bytes() {
        let src = b"  line\n";
        let span = dedent_span(src, ByteSpan::new(0, 6), 2);
        assert_eq!(span.slice(src), b"line");
    }
}
