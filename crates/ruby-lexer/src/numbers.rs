//! Numeric-literal scanning and value decoding.
//!
//! The tokenizer calls [`scan_number`] to find the extent and kind of a
//! numeric literal; the parser later calls [`integer_value`] /
//! [`float_value`] on the token's text to build the node. Values that do not
//! fit a machine word keep their digit text for the external big-number
//! helper.

use ruby_error::{DiagnosticId, DiagnosticList};
use ruby_position_tracking::ByteSpan;
use ruby_token::TokenKind;

/// Outcome of scanning one numeric literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannedNumber {
    /// The literal's token kind (integer/float × rational/imaginary)
    pub kind: TokenKind,
    /// Byte offset one past the literal
    pub end: usize,
}

/// Scans a numeric literal starting at `start` (which must be a digit).
pub fn scan_number(
    source: &[u8],
    start: usize,
    diagnostics: &mut DiagnosticList,
) -> ScannedNumber {
    let mut pos = start;
    let mut is_float = false;
    let mut base = 10u32;

    if source[pos] == b'0' && pos + 1 < source.len() {
        match source[pos + 1] {
            b'x' | b'X' => {
                base = 16;
                pos = scan_radix(source, pos + 2, 16, start, diagnostics);
            }
            b'b' | b'B' => {
                base = 2;
                pos = scan_radix(source, pos + 2, 2, start, diagnostics);
            }
            b'o' | b'O' => {
                base = 8;
                pos = scan_radix(source, pos + 2, 8, start, diagnostics);
            }
            b'd' | b'D' => {
                pos = scan_radix(source, pos + 2, 10, start, diagnostics);
            }
            b'0'..=b'9' | b'_' => {
                // Bare leading zero: octal
                base = 8;
                pos = scan_radix(source, pos + 1, 8, start, diagnostics);
            }
            _ => {
                pos += 1;
            }
        }
    } else {
        pos = scan_digit_run(source, pos, 10, start, diagnostics);
    }

    if base == 10 {
        // Decimal part: only if the dot is followed by a digit, so `1.to_s`
        // still lexes as integer-dot-identifier.
        if pos < source.len()
            && source[pos] == b'.'
            && source.get(pos + 1).is_some_and(|b| b.is_ascii_digit())
        {
            is_float = true;
            pos = scan_digit_run(source, pos + 1, 10, start, diagnostics);
        }

        // Exponent
        if pos < source.len() && matches!(source[pos], b'e' | b'E') {
            let mut look = pos + 1;
            let signed = look < source.len() && matches!(source[look], b'+' | b'-');
            if signed {
                look += 1;
            }
            if look < source.len() && source[look].is_ascii_digit() {
                is_float = true;
                pos = scan_digit_run(source, look, 10, start, diagnostics);
            } else if signed {
                // `1e+` cannot fall back to a method call the way `1e` does
                diagnostics.error(ByteSpan::new(start, look), DiagnosticId::NumberMissingExponent);
                pos = look;
            }
        }
    }

    // Rational / imaginary suffixes
    let rational = pos < source.len() && source[pos] == b'r';
    if rational {
        pos += 1;
    }
    let imaginary = pos < source.len() && source[pos] == b'i';
    if imaginary {
        pos += 1;
    }

    let kind = match (is_float, rational, imaginary) {
        (false, false, false) => TokenKind::IntegerLiteral,
        (false, true, false) => TokenKind::IntegerRational,
        (false, false, true) => TokenKind::IntegerImaginary,
        (false, true, true) => TokenKind::IntegerRationalImaginary,
        (true, false, false) => TokenKind::FloatLiteral,
        (true, true, false) => TokenKind::FloatRational,
        (true, false, true) => TokenKind::FloatImaginary,
        (true, true, true) => TokenKind::FloatRationalImaginary,
    };
    ScannedNumber { kind, end: pos }
}

/// Scans a `0x`/`0b`/`0o`/`0d` digit run, requiring at least one digit.
fn scan_radix(
    source: &[u8],
    pos: usize,
    base: u32,
    literal_start: usize,
    diagnostics: &mut DiagnosticList,
) -> usize {
    if pos >= source.len() || !is_base_digit(source[pos], base) {
        diagnostics.error(
            ByteSpan::new(literal_start, pos.min(source.len())),
            DiagnosticId::NumberInvalidDigit,
        );
        return pos;
    }
    scan_digit_run(source, pos, base, literal_start, diagnostics)
}

/// Consumes digits of `base` with underscore separators, diagnosing
/// misplaced underscores and out-of-base digits that glue onto the literal.
fn scan_digit_run(
    source: &[u8],
    mut pos: usize,
    base: u32,
    literal_start: usize,
    diagnostics: &mut DiagnosticList,
) -> usize {
    let mut last_underscore: Option<usize> = None;
    while pos < source.len() {
        let b = source[pos];
        if is_base_digit(b, base) {
            last_underscore = None;
            pos += 1;
        } else if b == b'_' {
            if last_underscore == Some(pos - 1) {
                diagnostics.error(
                    ByteSpan::new(pos - 1, pos + 1),
                    DiagnosticId::NumberDoubleUnderscore,
                );
            }
            last_underscore = Some(pos);
            pos += 1;
        } else if b.is_ascii_digit() {
            // A digit outside the base (e.g. `0b102`, `089`)
            diagnostics
                .error(ByteSpan::new(literal_start, pos + 1), DiagnosticId::NumberInvalidDigit);
            pos += 1;
        } else {
            break;
        }
    }
    if last_underscore.is_some() {
        diagnostics
            .error(ByteSpan::new(literal_start, pos), DiagnosticId::NumberTrailingUnderscore);
    }
    pos
}

fn is_base_digit(b: u8, base: u32) -> bool {
    match base {
        2 => matches!(b, b'0' | b'1'),
        8 => matches!(b, b'0'..=b'7'),
        10 => b.is_ascii_digit(),
        16 => b.is_ascii_hexdigit(),
        _ => false,
    }
}

/// Decoded integer value: machine word or digit text for the bignum helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedInteger {
    /// Fits an `i64`
    Small(i64),
    /// Too large; base plus underscore-stripped digits for the helper
    Big { base: u32, digits: String },
}

/// Decodes the value of an integer token's text (suffixes already stripped
/// by the caller via the token kind).
pub fn integer_value(text: &[u8]) -> ParsedInteger {
    let (base, digits) = split_base(text);
    let mut value: i64 = 0;
    let mut overflow = false;
    for &b in digits {
        if b == b'_' {
            continue;
        }
        let digit = match b {
            b'0'..=b'9' => i64::from(b - b'0'),
            b'a'..=b'f' => i64::from(b - b'a' + 10),
            b'A'..=b'F' => i64::from(b - b'A' + 10),
            _ => break,
        };
        value = match value
            .checked_mul(i64::from(base))
            .and_then(|v| v.checked_add(digit))
        {
            Some(v) => v,
            None => {
                overflow = true;
                break;
            }
        };
    }
    if overflow {
        let stripped: String = digits
            .iter()
            .filter(|&&b| b != b'_')
            .map(|&b| b as char)
            .collect();
        ParsedInteger::Big { base, digits: stripped }
    } else {
        ParsedInteger::Small(value)
    }
}

/// Decodes the value of a float token's text.
pub fn float_value(text: &[u8]) -> f64 {
    let cleaned: String = text
        .iter()
        .filter(|&&b| b != b'_')
        .take_while(|&&b| b != b'r' && b != b'i')
        .map(|&b| b as char)
        .collect();
    cleaned.parse().unwrap_or(0.0)
}

fn split_base(text: &[u8]) -> (u32, &[u8]) {
    if text.len() >= 2 && text[0] == b'0' {
        match text[1] {
            b'x' | b'X' => return (16, &text[2..]),
            b'b' | b'B' => return (2, &text[2..]),
            b'o' | b'O' => return (8, &text[2..]),
            b'd' | b'D' => return (10, &text[2..]),
            b'0'..=b'7' | b'_' => return (8, &text[1..]),
            _ => {}
        }
    }
    (10, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(src: &[u8]) -> (TokenKind, usize, usize) {
        let mut diags = DiagnosticList::new();
        let scanned = scan_number(src, 0, &mut diags);
        (scanned.kind, scanned.end, diags.errors().len())
    }

    #[test]
    fn plain_integers() {
        assert_eq!(scan(b"42"), (TokenKind::IntegerLiteral, 2, 0));
        assert_eq!(scan(b"1_000_000"), (TokenKind::IntegerLiteral, 9, 0));
        assert_eq!(scan(b"0"), (TokenKind::IntegerLiteral, 1, 0));
    }

    #[test]
    fn radix_prefixes() {
        assert_eq!(scan(b"0xFF"), (TokenKind::IntegerLiteral, 4, 0));
        assert_eq!(scan(b"0b1010"), (TokenKind::IntegerLiteral, 6, 0));
        assert_eq!(scan(b"0o17"), (TokenKind::IntegerLiteral, 4, 0));
        assert_eq!(scan(b"0755"), (TokenKind::IntegerLiteral, 4, 0));
    }

    #[test]
    fn floats() {
        assert_eq!(scan(b"3.14"), (TokenKind::FloatLiteral, 4, 0));
        assert_eq!(scan(b"1e10"), (TokenKind::FloatLiteral, 4, 0));
        assert_eq!(scan(b"1.5e-3"), (TokenKind::FloatLiteral, 6, 0));
        // `1.upto` keeps the dot out of the number
        assert_eq!(scan(b"1.upto"), (TokenKind::IntegerLiteral, 1, 0));
    }

    #[test]
    fn suffixes() {
        assert_eq!(scan(b"3r").0, TokenKind::IntegerRational);
        assert_eq!(scan(b"3i").0, TokenKind::IntegerImaginary);
        assert_eq!(scan(b"3ri").0, TokenKind::IntegerRationalImaginary);
        assert_eq!(scan(b"2.5i").0, TokenKind::FloatImaginary);
    }

    #[test]
    fn underscore_errors() {
        assert_eq!(scan(b"1_").2, 1);
        assert_eq!(scan(b"1__2").2, 1);
        assert_eq!(scan(b"1_2").2, 0);
    }

    #[test]
    fn signed_exponent_needs_digits() {
        assert_eq!(scan(b"1e+2"), (TokenKind::FloatLiteral, 4, 0));
        assert_eq!(scan(b"1e+").2, 1);
        // A bare `1e` stays an integer; `e` can be a method call
        assert_eq!(scan(b"1e"), (TokenKind::IntegerLiteral, 1, 0));
    }

    #[test]
    fn invalid_digits() {
        assert_eq!(scan(b"0b102").2, 1);
        assert_eq!(scan(b"089").2, 1);
        assert_eq!(scan(b"0x").2, 1);
    }

    #[test]
    fn integer_values() {
        assert_eq!(integer_value(b"42"), ParsedInteger::Small(42));
        assert_eq!(integer_value(b"0xFF"), ParsedInteger::Small(255));
        assert_eq!(integer_value(b"0b1010"), ParsedInteger::Small(10));
        assert_eq!(integer_value(b"0755"), ParsedInteger::Small(493));
        assert_eq!(integer_value(b"1_000"), ParsedInteger::Small(1000));
        assert_eq!(
            integer_value(b"99999999999999999999999999"),
            ParsedInteger::Big { base: 10, digits: "99999999999999999999999999".into() }
        );
    }

    #[test]
    fn float_values() {
        assert_eq!(float_value(b"3.14"), 3.14);
        assert_eq!(float_value(b"1_0.5"), 10.5);
        assert_eq!(float_value(b"2.5i"), 2.5);
    }
}
