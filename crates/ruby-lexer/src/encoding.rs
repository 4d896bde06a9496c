//! Source-encoding adapter.
//!
//! The lexer holds a reference to the active [`Encoding`] record and routes
//! every character-class and width query through it. A magic comment on the
//! first line (or the second, behind a shebang) may replace the record
//! unless the caller locked the encoding at initialization.
//!
//! Only the three encodings the parser itself needs ship here; the record is
//! a plain struct of function pointers, so callers can provide others.

/// An encoding record: character classification and width functions.
pub struct Encoding {
    /// Canonical name, as it appears in magic comments
    pub name: &'static str,
    /// Width in bytes of the alphanumeric character at the start of the
    /// slice, or 0 if it is not alphanumeric
    pub alnum_char: fn(&[u8]) -> usize,
    /// Width in bytes of the alphabetic character at the start of the slice,
    /// or 0 if it is not alphabetic
    pub alpha_char: fn(&[u8]) -> usize,
    /// True if the character at the start of the slice is uppercase
    pub isupper_char: fn(&[u8]) -> bool,
    /// Width in bytes of the character at the start of the slice, or 0 for
    /// an invalid byte sequence
    pub char_width: fn(&[u8]) -> usize,
}

impl std::fmt::Debug for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoding").field("name", &self.name).finish()
    }
}

impl PartialEq for Encoding {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.name == other.name
    }
}

/// UTF-8, the default source encoding.
pub static UTF_8: Encoding = Encoding {
    name: "UTF-8",
    alnum_char: utf8_alnum,
    alpha_char: utf8_alpha,
    isupper_char: utf8_isupper,
    char_width: utf8_width,
};

/// US-ASCII.
pub static US_ASCII: Encoding = Encoding {
    name: "US-ASCII",
    alnum_char: ascii_alnum,
    alpha_char: ascii_alpha,
    isupper_char: ascii_isupper,
    char_width: ascii_width,
};

/// ASCII-8BIT, Ruby's binary pseudo-encoding.
pub static BINARY: Encoding = Encoding {
    name: "ASCII-8BIT",
    alnum_char: ascii_alnum,
    alpha_char: ascii_alpha,
    isupper_char: ascii_isupper,
    char_width: binary_width,
};

/// Looks up an encoding by magic-comment name, case-insensitively.
pub fn find(name: &[u8]) -> Option<&'static Encoding> {
    let lowered: Vec<u8> = name.iter().map(|b| b.to_ascii_lowercase()).collect();
    match lowered.as_slice() {
        b"utf-8" | b"utf8" => Some(&UTF_8),
        b"us-ascii" | b"ascii" | b"ansi_x3.4-1968" => Some(&US_ASCII),
        b"ascii-8bit" | b"binary" => Some(&BINARY),
        _ => None,
    }
}

/// Encoding observed from `\u` / `\x` escapes inside one literal. Resolved
/// against the source encoding when the literal closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExplicitEncoding {
    /// No escape constrained the encoding yet
    #[default]
    None,
    /// A `\u` escape with a non-ASCII codepoint forces UTF-8
    Utf8,
    /// A non-ASCII byte escape under a US-ASCII source forces binary
    Binary,
}

fn decode_utf8(bytes: &[u8]) -> Option<(char, usize)> {
    let width = utf8_width(bytes);
    if width == 0 {
        return None;
    }
    std::str::from_utf8(&bytes[..width]).ok()?.chars().next().map(|c| (c, width))
}

fn utf8_alnum(bytes: &[u8]) -> usize {
    // Identifier-continue per UAX #31, matching what CRuby accepts in names
    match decode_utf8(bytes) {
        Some((c, width)) if unicode_ident::is_xid_continue(c) => width,
        _ => 0,
    }
}

fn utf8_alpha(bytes: &[u8]) -> usize {
    match decode_utf8(bytes) {
        Some((c, width)) if unicode_ident::is_xid_start(c) => width,
        _ => 0,
    }
}

fn utf8_isupper(bytes: &[u8]) -> bool {
    matches!(decode_utf8(bytes), Some((c, _)) if c.is_uppercase())
}

fn utf8_width(bytes: &[u8]) -> usize {
    let Some(&lead) = bytes.first() else { return 0 };
    let width = match lead {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => return 0,
    };
    if bytes.len() < width || !bytes[1..width].iter().all(|b| (0x80..=0xBF).contains(b)) {
        return 0;
    }
    // Reject overlong forms and surrogates the cheap way.
    if std::str::from_utf8(&bytes[..width]).is_err() {
        return 0;
    }
    width
}

fn ascii_alnum(bytes: &[u8]) -> usize {
    usize::from(bytes.first().is_some_and(|b| b.is_ascii_alphanumeric()))
}

fn ascii_alpha(bytes: &[u8]) -> usize {
    usize::from(bytes.first().is_some_and(|b| b.is_ascii_alphabetic()))
}

fn ascii_isupper(bytes: &[u8]) -> bool {
    bytes.first().is_some_and(|b| b.is_ascii_uppercase())
}

fn ascii_width(bytes: &[u8]) -> usize {
    usize::from(bytes.first().is_some_and(|b| b.is_ascii()))
}

fn binary_width(bytes: &[u8]) -> usize {
    usize::from(!bytes.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(find(b"UTF-8").map(|e| e.name), Some("UTF-8"));
        assert_eq!(find(b"utf-8").map(|e| e.name), Some("UTF-8"));
        assert_eq!(find(b"Binary").map(|e| e.name), Some("ASCII-8BIT"));
        assert!(find(b"KOI8-R").is_none());
    }

    #[test]
    fn utf8_widths() {
        assert_eq!((UTF_8.char_width)(b"a"), 1);
        assert_eq!((UTF_8.char_width)("é".as_bytes()), 2);
        assert_eq!((UTF_8.char_width)("あ".as_bytes()), 3);
        assert_eq!((UTF_8.char_width)(&[0xFF]), 0);
        assert_eq!((UTF_8.char_width)(&[0xC3]), 0);
    }

    #[test]
    fn ascii_rejects_high_bytes() {
        assert_eq!((US_ASCII.char_width)(&[0x80]), 0);
        assert_eq!((BINARY.char_width)(&[0x80]), 1);
    }

    #[test]
    fn classification() {
        assert_eq!((UTF_8.alpha_char)("λx".as_bytes()), 2);
        assert_eq!((UTF_8.alnum_char)(b"1a"), 1);
        assert!((UTF_8.isupper_char)("Ā".as_bytes()));
        assert!(!(US_ASCII.isupper_char)(b"a"));
    }
}
