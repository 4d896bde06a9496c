//! Byte-based span types for source location tracking.
//!
//! Every token and AST node produced by the parser carries a `ByteSpan` into
//! the original source buffer, so the text of any construct is a free slice
//! rather than a copy. Line/column presentation is computed on demand from
//! the [`NewlineIndex`](crate::NewlineIndex).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// A half-open byte range `[start, end)` in source text.
///
/// # Invariants
///
/// - `start <= end` (enforced by constructors in debug mode)
/// - Both offsets are valid positions in the source the span was created for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ByteSpan {
    /// Starting byte offset (inclusive)
    pub start: usize,
    /// Ending byte offset (exclusive)
    pub end: usize,
}

impl ByteSpan {
    /// Creates a new span from start and end offsets.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if `start > end`.
    #[inline]
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "ByteSpan: start ({start}) > end ({end})");
        Self { start, end }
    }

    /// Creates an empty span at the given position.
    #[inline]
    pub const fn empty(pos: usize) -> Self {
        Self { start: pos, end: pos }
    }

    /// Length of the span in bytes.
    #[inline]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    /// True if the span covers no bytes.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True if the span contains the byte offset.
    #[inline]
    pub const fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }

    /// Smallest span covering both `self` and `other`.
    #[inline]
    pub fn join(&self, other: ByteSpan) -> ByteSpan {
        ByteSpan { start: self.start.min(other.start), end: self.end.max(other.end) }
    }

    /// The source text covered by this span.
    ///
    /// # Panics
    ///
    /// Panics if the span is out of bounds for `source`.
    #[inline]
    pub fn slice<'a>(&self, source: &'a [u8]) -> &'a [u8] {
        &source[self.start..self.end]
    }

    /// The source text covered by this span, or `None` if out of bounds.
    #[inline]
    pub fn try_slice<'a>(&self, source: &'a [u8]) -> Option<&'a [u8]> {
        source.get(self.start..self.end)
    }
}

impl fmt::Display for ByteSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl From<Range<usize>> for ByteSpan {
    #[inline]
    fn from(range: Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

impl From<ByteSpan> for Range<usize> {
    #[inline]
    fn from(span: ByteSpan) -> Self {
        span.start..span.end
    }
}

/// Alias used by AST nodes; spans double as source locations.
pub type SourceLocation = ByteSpan;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let span = ByteSpan::new(5, 10);
        assert_eq!(span.len(), 5);
        assert!(!span.is_empty());
        assert!(span.contains(5));
        assert!(span.contains(9));
        assert!(!span.contains(10));
    }

    #[test]
    fn empty_span() {
        let span = ByteSpan::empty(3);
        assert!(span.is_empty());
        assert_eq!(span.len(), 0);
    }

    #[test]
    fn join_covers_both() {
        let a = ByteSpan::new(2, 6);
        let b = ByteSpan::new(4, 11);
        assert_eq!(a.join(b), ByteSpan::new(2, 11));
    }

    #[test]
    fn slicing() {
        let src = b"def foo; end";
        assert_eq!(ByteSpan::new(4, 7).slice(src), b"foo");
        assert_eq!(ByteSpan::new(4, 99).try_slice(src), None);
    }

    #[test]
    fn range_conversions() {
        let span: ByteSpan = (3..8).into();
        assert_eq!(span, ByteSpan::new(3, 8));
        let range: Range<usize> = span.into();
        assert_eq!(range, 3..8);
    }
}
