//! Position tracking for the Ruby parser.
//!
//! Two primitives shared by every other crate in the workspace:
//!
//! - [`ByteSpan`]: a half-open byte range into the source buffer. Tokens and
//!   AST nodes store spans, never text, so slicing the original source is
//!   free.
//! - [`NewlineIndex`]: the sorted offsets of every `\n` the lexer crossed,
//!   giving O(log n) line/column queries for diagnostics.

mod newlines;
mod span;

pub use newlines::NewlineIndex;
pub use span::{ByteSpan, SourceLocation};

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// The index records exactly the positions of every `\n` byte.
        #[test]
        fn newline_index_matches_source(src in proptest::collection::vec(any::<u8>(), 0..512)) {
            let index = NewlineIndex::from_source(&src);
            let expected: Vec<usize> = src
                .iter()
                .enumerate()
                .filter(|(_, &b)| b == b'\n')
                .map(|(i, _)| i)
                .collect();
            prop_assert_eq!(index.offsets(), expected.as_slice());
        }
    }
}
