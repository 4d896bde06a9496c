//! Escape-sequence decoding for string-like literals.
//!
//! The lexer only *skips* escapes while scanning for a terminator; the
//! parser calls back into this module to cook the bytes of each
//! `StringContent` run when it builds literal nodes. Decoding rules differ
//! by context: double-quoted content takes the full escape set, single-quoted
//! content only unescapes the backslash and its own terminator, and regexp
//! content is decoded into two buffers in parallel (the cooked bytes for
//! encoding analysis and a source buffer forwarded to the regexp engine).

use crate::encoding::ExplicitEncoding;
use ruby_error::{DiagnosticId, DiagnosticList};
use ruby_position_tracking::ByteSpan;

/// Decoding context for one content run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnescapeMode {
    /// No escape processing at all (heredoc with single-quoted identifier
    /// keeps every byte, including `\` before a newline)
    None,
    /// Single-quoted rules: only `\\` and the literal's own delimiters
    /// unescape; everything else keeps its backslash
    Minimal {
        /// Closing delimiter byte
        terminator: u8,
        /// Opening byte of a paired delimiter, or 0
        incrementor: u8,
    },
    /// Double-quoted rules: the full escape set
    All,
    /// Regexp rules: full set, dual-buffer output
    Regexp,
    /// Character literal (`?x`): full set, at most one codepoint
    CharacterLiteral,
}

/// Result of cooking one content run.
#[derive(Debug, Default)]
pub struct Unescaped {
    /// The decoded bytes
    pub value: Vec<u8>,
    /// Escape-sequence source preserved for the regexp engine
    /// (only populated in [`UnescapeMode::Regexp`])
    pub regexp_source: Vec<u8>,
    /// Encoding constraint observed from the escapes in this run
    pub explicit: ExplicitEncoding,
}

/// Decodes the escapes of `bytes` (a literal's content run starting at
/// source offset `base`), appending diagnostics for malformed sequences.
pub fn unescape(
    bytes: &[u8],
    base: usize,
    mode: UnescapeMode,
    diagnostics: &mut DiagnosticList,
) -> Unescaped {
    let mut decoder = Decoder {
        bytes,
        pos: 0,
        base,
        mode,
        out: Unescaped::default(),
        diagnostics,
    };
    decoder.run();
    decoder.out
}

// Escape flag bits; CONTROL and META compose during `\C-\M-x` decoding.
const FLAG_CONTROL: u8 = 1 << 0;
const FLAG_META: u8 = 1 << 1;

struct Decoder<'a, 'd> {
    bytes: &'a [u8],
    pos: usize,
    base: usize,
    mode: UnescapeMode,
    out: Unescaped,
    diagnostics: &'d mut DiagnosticList,
}

impl Decoder<'_, '_> {
    fn run(&mut self) {
        if matches!(self.mode, UnescapeMode::None) {
            self.out.value.extend_from_slice(self.bytes);
            return;
        }
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b != b'\\' {
                self.out.value.push(b);
                if matches!(self.mode, UnescapeMode::Regexp) {
                    self.out.regexp_source.push(b);
                }
                self.pos += 1;
                continue;
            }
            self.escape(b'\\');
        }
    }

    fn span_at(&self, start: usize) -> ByteSpan {
        ByteSpan::new(self.base + start, self.base + self.pos.min(self.bytes.len()))
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Decodes one escape; `self.pos` sits on the backslash.
    fn escape(&mut self, _backslash: u8) {
        let start = self.pos;
        self.pos += 1; // past '\\'
        match self.mode {
            UnescapeMode::Minimal { terminator, incrementor } => {
                match self.peek() {
                    Some(b) if b == b'\\' || b == terminator || (incrementor != 0 && b == incrementor) => {
                        self.out.value.push(b);
                        self.pos += 1;
                    }
                    _ => {
                        // Keep the backslash; the next byte flows through the
                        // main loop untouched.
                        self.out.value.push(b'\\');
                    }
                }
            }
            UnescapeMode::Regexp => {
                let cooked_start = self.out.value.len();
                self.escape_read(0, true);
                let _ = cooked_start;
                self.forward_regexp_source(start);
            }
            _ => {
                self.escape_read(0, false);
            }
        }
    }

    /// Copies the just-decoded escape to the regexp source buffer, rewriting
    /// control/meta compositions to `\xNN` so the engine sees a plain byte.
    fn forward_regexp_source(&mut self, start: usize) {
        let raw = &self.bytes[start..self.pos];
        let rewritten = raw.len() >= 2 && matches!(raw[1], b'c' | b'C' | b'M');
        if rewritten {
            // The cooked buffer's last byte is the composed value.
            if let Some(&b) = self.out.value.last() {
                self.out.regexp_source.extend_from_slice(format!("\\x{b:02X}").as_bytes());
            }
        } else {
            self.out.regexp_source.extend_from_slice(raw);
        }
    }

    /// Decodes the escape body after the backslash. `flags` carries pending
    /// control/meta prefixes; `regexp` relaxes unknown escapes (the engine
    /// owns them).
    fn escape_read(&mut self, flags: u8, regexp: bool) {
        let start = self.pos - 1;
        let Some(b) = self.peek() else {
            self.diagnostics.error(self.span_at(start), DiagnosticId::EscapeInvalid);
            return;
        };
        match b {
            b'n' => self.push_masked(b'\n', flags),
            b't' => self.push_masked(b'\t', flags),
            b'r' => self.push_masked(b'\r', flags),
            b'a' => self.push_masked(0x07, flags),
            b'b' => self.push_masked(0x08, flags),
            b'e' => self.push_masked(0x1B, flags),
            b'f' => self.push_masked(0x0C, flags),
            b's' => self.push_masked(b' ', flags),
            b'v' => self.push_masked(0x0B, flags),
            b'\\' => self.push_masked(b'\\', flags),
            b'\n' => {
                // Line continuation: the backslash-newline pair vanishes.
                self.pos += 1;
            }
            b'\r' if self.bytes.get(self.pos + 1) == Some(&b'\n') => {
                self.pos += 2;
            }
            b'0'..=b'7' => {
                let mut value: u32 = 0;
                let mut digits = 0;
                while digits < 3 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            self.pos += 1;
                            digits += 1;
                        }
                        _ => break,
                    }
                }
                let byte = (value.min(0xFF)) as u8;
                if byte > 0x7F {
                    self.observe(ExplicitEncoding::Binary, start);
                }
                self.apply_mask_and_push(byte, flags);
            }
            b'x' => {
                self.pos += 1;
                let mut value: u32 = 0;
                let mut digits = 0;
                while digits < 2 {
                    match self.peek().and_then(hex_digit) {
                        Some(d) => {
                            value = value * 16 + d;
                            self.pos += 1;
                            digits += 1;
                        }
                        None => break,
                    }
                }
                if digits == 0 {
                    self.diagnostics.error(self.span_at(start), DiagnosticId::EscapeHexEmpty);
                    return;
                }
                let byte = value as u8;
                if byte > 0x7F {
                    self.observe(ExplicitEncoding::Binary, start);
                }
                self.apply_mask_and_push(byte, flags);
            }
            b'u' => {
                if flags != 0 {
                    self.diagnostics.error(self.span_at(start), DiagnosticId::EscapeInvalid);
                }
                self.pos += 1;
                self.unicode_escape(start);
            }
            b'c' => {
                if flags & FLAG_CONTROL != 0 {
                    self.diagnostics.error(self.span_at(start), DiagnosticId::EscapeControlRepeated);
                }
                self.pos += 1;
                self.control_target(flags | FLAG_CONTROL, regexp, start);
            }
            b'C' => {
                if flags & FLAG_CONTROL != 0 {
                    self.diagnostics.error(self.span_at(start), DiagnosticId::EscapeControlRepeated);
                }
                self.pos += 1;
                if self.peek() == Some(b'-') {
                    self.pos += 1;
                    self.control_target(flags | FLAG_CONTROL, regexp, start);
                } else {
                    self.diagnostics.error(self.span_at(start), DiagnosticId::EscapeInvalid);
                }
            }
            b'M' => {
                if flags & FLAG_META != 0 {
                    self.diagnostics.error(self.span_at(start), DiagnosticId::EscapeMetaRepeated);
                }
                self.pos += 1;
                if self.peek() == Some(b'-') {
                    self.pos += 1;
                    self.control_target(flags | FLAG_META, regexp, start);
                } else {
                    self.diagnostics.error(self.span_at(start), DiagnosticId::EscapeInvalid);
                }
            }
            _ => {
                // Unknown escape: the byte stands for itself. Regexp content
                // keeps the pair for the engine (handled by the source
                // buffer); the cooked buffer still drops the backslash.
                self.push_masked(b, flags);
            }
        }
    }

    /// The character following a `\c`/`\C-`/`\M-` prefix, which may itself
    /// be an escape.
    fn control_target(&mut self, flags: u8, regexp: bool, start: usize) {
        match self.peek() {
            Some(b'\\') => {
                self.pos += 1;
                self.escape_read(flags, regexp);
            }
            Some(b'?') => {
                // \c? and \C-? decode to DEL before meta is applied.
                let mut byte = 0x7F;
                if flags & FLAG_META != 0 {
                    byte |= 0x80;
                }
                self.out.value.push(byte);
                self.pos += 1;
            }
            Some(b) if b.is_ascii() && b != b' ' => {
                self.apply_mask_and_push(b, flags);
                self.pos += 1;
            }
            _ => {
                self.diagnostics.error(self.span_at(start), DiagnosticId::EscapeInvalid);
            }
        }
    }

    /// Pushes a simple one-byte escape value and consumes its source byte.
    fn push_masked(&mut self, byte: u8, flags: u8) {
        self.apply_mask_and_push(byte, flags);
        self.pos += 1;
    }

    fn apply_mask_and_push(&mut self, mut byte: u8, flags: u8) {
        if flags & FLAG_CONTROL != 0 {
            byte &= !0x60;
        }
        if flags & FLAG_META != 0 {
            byte |= 0x80;
            self.observe(ExplicitEncoding::Binary, self.pos);
        }
        self.out.value.push(byte);
    }

    fn unicode_escape(&mut self, start: usize) {
        if self.peek() == Some(b'{') {
            self.pos += 1;
            let mut codepoints = 0;
            loop {
                while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
                    self.pos += 1;
                }
                match self.peek() {
                    Some(b'}') => {
                        self.pos += 1;
                        break;
                    }
                    None => {
                        self.diagnostics
                            .error(self.span_at(start), DiagnosticId::EscapeUnicodeUnterminated);
                        break;
                    }
                    _ => {
                        let mut value: u32 = 0;
                        let mut digits = 0;
                        while digits < 6 {
                            match self.peek().and_then(hex_digit) {
                                Some(d) => {
                                    value = value * 16 + d;
                                    self.pos += 1;
                                    digits += 1;
                                }
                                None => break,
                            }
                        }
                        if digits == 0 {
                            self.diagnostics
                                .error(self.span_at(start), DiagnosticId::EscapeUnicodeUnterminated);
                            // Skip the offending byte to guarantee progress.
                            self.pos += 1;
                            continue;
                        }
                        codepoints += 1;
                        if codepoints > 1 && matches!(self.mode, UnescapeMode::CharacterLiteral) {
                            self.diagnostics.error(
                                self.span_at(start),
                                DiagnosticId::EscapeUnicodeListInCharacter,
                            );
                        }
                        self.push_codepoint(value, start);
                    }
                }
            }
        } else {
            let mut value: u32 = 0;
            let mut digits = 0;
            while digits < 4 {
                match self.peek().and_then(hex_digit) {
                    Some(d) => {
                        value = value * 16 + d;
                        self.pos += 1;
                        digits += 1;
                    }
                    None => break,
                }
            }
            if digits != 4 {
                self.diagnostics.error(self.span_at(start), DiagnosticId::EscapeUnicodeShort);
                return;
            }
            self.push_codepoint(value, start);
        }
    }

    fn push_codepoint(&mut self, value: u32, start: usize) {
        let c = match value {
            0xD800..=0xDFFF => {
                self.diagnostics.error(self.span_at(start), DiagnosticId::EscapeUnicodeSurrogate);
                char::REPLACEMENT_CHARACTER
            }
            v if v > 0x10FFFF => {
                self.diagnostics.error(self.span_at(start), DiagnosticId::EscapeUnicodeTooLarge);
                char::REPLACEMENT_CHARACTER
            }
            // Range was just validated.
            v => char::from_u32(v).unwrap_or(char::REPLACEMENT_CHARACTER),
        };
        if !c.is_ascii() {
            self.observe(ExplicitEncoding::Utf8, start);
        }
        let mut buf = [0u8; 4];
        self.out.value.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }

    /// Records an encoding constraint; a conflicting constraint within the
    /// same run is an error immediately (across runs the parser merges).
    fn observe(&mut self, explicit: ExplicitEncoding, start: usize) {
        match (self.out.explicit, explicit) {
            (ExplicitEncoding::None, e) => self.out.explicit = e,
            (a, b) if a == b => {}
            _ => {
                self.diagnostics.error(self.span_at(start), DiagnosticId::EncodingLiteralConflict);
            }
        }
    }
}

fn hex_digit(b: u8) -> Option<u32> {
    match b {
        b'0'..=b'9' => Some(u32::from(b - b'0')),
        b'a'..=b'f' => Some(u32::from(b - b'a' + 10)),
        b'A'..=b'F' => Some(u32::from(b - b'A' + 10)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cook(bytes: &[u8], mode: UnescapeMode) -> (Vec<u8>, usize) {
        let mut diags = DiagnosticList::new();
        let result = unescape(bytes, 0, mode, &mut diags);
        (result.value, diags.errors().len())
    }

    #[test]
    fn plain_bytes_pass_through() {
        let (value, errors) = cook(b"hello world", UnescapeMode::All);
        assert_eq!(value, b"hello world");
        assert_eq!(errors, 0);
    }

    #[test]
    fn simple_escapes() {
        let (value, _) = cook(br"a\nb\tc\\d", UnescapeMode::All);
        assert_eq!(value, b"a\nb\tc\\d");
    }

    #[test]
    fn octal_and_hex() {
        let (value, _) = cook(br"\101\x42\x4", UnescapeMode::All);
        assert_eq!(value, b"AB\x04");
        let (_, errors) = cook(br"\xZZ", UnescapeMode::All);
        assert_eq!(errors, 1);
    }

    #[test]
    fn unicode_four_digit() {
        let (value, _) = cook(br"A\u00e9", UnescapeMode::All);
        assert_eq!(value, "A\u{e9}".as_bytes());
        let (_, errors) = cook(br"\u00", UnescapeMode::All);
        assert_eq!(errors, 1);
    }

    #[test]
    fn unicode_braced_groups() {
        let (value, _) = cook(br"\u{41 42 1F600}", UnescapeMode::All);
        assert_eq!(value, "AB😀".as_bytes());
    }

    #[test]
    fn surrogate_is_replaced_with_error() {
        let (value, errors) = cook(br"\u{D800}", UnescapeMode::All);
        assert_eq!(value, "\u{FFFD}".as_bytes());
        assert_eq!(errors, 1);
    }

    #[test]
    fn control_and_meta_compose_both_orders() {
        let (a, _) = cook(br"\C-\M-a", UnescapeMode::All);
        let (b, _) = cook(br"\M-\C-a", UnescapeMode::All);
        assert_eq!(a, b);
        assert_eq!(a, vec![0x81]);
    }

    #[test]
    fn control_basics() {
        let (value, _) = cook(br"\ca", UnescapeMode::All);
        assert_eq!(value, vec![0x01]);
        let (del, _) = cook(br"\c?", UnescapeMode::All);
        assert_eq!(del, vec![0x7F]);
    }

    #[test]
    fn repeated_prefix_is_an_error() {
        let (_, errors) = cook(br"\C-\C-a", UnescapeMode::All);
        assert_eq!(errors, 1);
        let (_, errors) = cook(br"\M-\M-a", UnescapeMode::All);
        assert_eq!(errors, 1);
    }

    #[test]
    fn line_continuation_vanishes_in_double_quoted() {
        let (value, _) = cook(b"a\\\nb", UnescapeMode::All);
        assert_eq!(value, b"ab");
    }

    #[test]
    fn minimal_mode_unescapes_only_its_delimiters() {
        let mode = UnescapeMode::Minimal { terminator: b'\'', incrementor: 0 };
        let (value, _) = cook(br"a\'b\\c\nd", mode);
        assert_eq!(value, b"a'b\\c\\nd");
    }

    #[test]
    fn none_mode_keeps_everything() {
        let (value, _) = cook(b"a\\\nb\\n", UnescapeMode::None);
        assert_eq!(value, b"a\\\nb\\n");
    }

    #[test]
    fn regexp_mode_preserves_source_sequences() {
        let mut diags = DiagnosticList::new();
        let result = unescape(br"a\nb\qc", 0, UnescapeMode::Regexp, &mut diags);
        assert_eq!(result.value, b"a\nbqc");
        assert_eq!(result.regexp_source, br"a\nb\qc".to_vec());
    }

    #[test]
    fn regexp_mode_rewrites_control_to_hex() {
        let mut diags = DiagnosticList::new();
        let result = unescape(br"\C-a", 0, UnescapeMode::Regexp, &mut diags);
        assert_eq!(result.value, vec![0x01]);
        assert_eq!(result.regexp_source, b"\\x01".to_vec());
    }

    #[test]
    fn unicode_forces_utf8() {
        let mut diags = DiagnosticList::new();
        let result = unescape(br"\u{3042}", 0, UnescapeMode::All, &mut diags);
        assert_eq!(result.explicit, ExplicitEncoding::Utf8);
    }

    #[test]
    fn high_byte_escape_forces_binary() {
        let mut diags = DiagnosticList::new();
        let result = unescape(br"\xFF", 0, UnescapeMode::All, &mut diags);
        assert_eq!(result.explicit, ExplicitEncoding::Binary);
    }

    #[test]
    fn conflicting_encodings_error() {
        let mut diags = DiagnosticList::new();
        let result = unescape(br"\xFF\u{3042}", 0, UnescapeMode::All, &mut diags);
        let _ = result;
        assert_eq!(diags.errors().len(), 1);
        assert_eq!(diags.errors()[0].id, DiagnosticId::EncodingLiteralConflict);
    }

    #[test]
    fn character_literal_allows_single_codepoint_only() {
        let mut diags = DiagnosticList::new();
        let _ = unescape(br"\u{41 42}", 0, UnescapeMode::CharacterLiteral, &mut diags);
        assert_eq!(diags.errors()[0].id, DiagnosticId::EscapeUnicodeListInCharacter);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Escape-free content decodes to itself.
            #[test]
            fn idempotent_without_escapes(
                content in "[a-zA-Z0-9 ,.;:!?_-]{0,64}"
            ) {
                let mut diags = DiagnosticList::new();
                let result = unescape(content.as_bytes(), 0, UnescapeMode::All, &mut diags);
                prop_assert_eq!(result.value, content.as_bytes().to_vec());
                prop_assert_eq!(diags.errors().len(), 0);
            }
        }
    }
}
