//! Newline-offset index built incrementally by the lexer.
//!
//! The lexer appends the offset of every `\n` it crosses, in byte order, once
//! each. Line/column queries then cost a binary search. `\r\n` counts as a
//! single terminator; only the `\n` byte is recorded.

/// Sorted list of `\n` byte offsets with O(log n) line/column lookup.
#[derive(Debug, Clone, Default)]
pub struct NewlineIndex {
    offsets: Vec<usize>,
}

impl NewlineIndex {
    /// Creates an empty index, pre-sized for the given source length.
    pub fn with_source_len(len: usize) -> Self {
        // Average line length in real Ruby source hovers around 30 bytes.
        Self { offsets: Vec::with_capacity(len / 32) }
    }

    /// Builds a complete index from a source buffer in one pass.
    ///
    /// The lexer normally builds the index incrementally via [`push`]; this
    /// constructor exists for consumers that only have the final buffer.
    ///
    /// [`push`]: NewlineIndex::push
    pub fn from_source(source: &[u8]) -> Self {
        let mut index = Self::with_source_len(source.len());
        for (i, &b) in source.iter().enumerate() {
            if b == b'\n' {
                index.offsets.push(i);
            }
        }
        index
    }

    /// Records a newline at `offset`.
    ///
    /// Offsets must arrive in strictly increasing order; an offset at or
    /// before the last recorded one is ignored, which keeps the list unique
    /// when a scan loop re-visits a boundary byte.
    #[inline]
    pub fn push(&mut self, offset: usize) {
        if self.offsets.last().is_none_or(|&last| offset > last) {
            self.offsets.push(offset);
        }
    }

    /// Number of newlines recorded so far.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// True if no newline has been recorded.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// The recorded offsets, in byte order.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Converts a byte offset into a `(line, column)` pair.
    ///
    /// `start_line` is the 1-based line number of the first source line (the
    /// parser's `line` option). Columns are 0-based byte columns.
    pub fn line_col(&self, offset: usize, start_line: i32) -> (i32, usize) {
        let line = self.offsets.partition_point(|&nl| nl < offset);
        let line_start = if line == 0 { 0 } else { self.offsets[line - 1] + 1 };
        (start_line + line as i32, offset - line_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source() {
        let index = NewlineIndex::from_source(b"");
        assert!(index.is_empty());
        assert_eq!(index.line_col(0, 1), (1, 0));
    }

    #[test]
    fn line_col_lookup() {
        let src = b"a = 1\nbb = 2\n\nc\n";
        let index = NewlineIndex::from_source(src);
        assert_eq!(index.offsets(), &[5, 12, 13, 15]);
        assert_eq!(index.line_col(0, 1), (1, 0));
        assert_eq!(index.line_col(4, 1), (1, 4));
        assert_eq!(index.line_col(6, 1), (2, 0));
        assert_eq!(index.line_col(13, 1), (3, 0));
        assert_eq!(index.line_col(14, 1), (4, 0));
    }

    #[test]
    fn custom_start_line() {
        let index = NewlineIndex::from_source(b"x\ny\n");
        assert_eq!(index.line_col(2, 5), (6, 0));
    }

    #[test]
    fn push_ignores_stale_offsets() {
        let mut index = NewlineIndex::default();
        index.push(3);
        index.push(3);
        index.push(1);
        index.push(9);
        assert_eq!(index.offsets(), &[3, 9]);
    }

    #[test]
    fn crlf_records_only_the_lf() {
        let src = b"a\r\nb\n";
        let index = NewlineIndex::from_source(src);
        assert_eq!(index.offsets(), &[2, 4]);
    }
}
