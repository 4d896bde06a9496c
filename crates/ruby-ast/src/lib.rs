//! Abstract syntax tree definitions for the Ruby parser.
//!
//! Every parsed construct becomes a [`Node`]: a kind with per-variant
//! payload, a byte-span location, and a small flag word. The tree owns its
//! string data (names are interned during parsing and copied out at node
//! construction), so a tree outlives the source buffer it was parsed from.
//!
//! The [`Node::to_sexp`] rendering exists for tests and tooling; it is a
//! compact S-expression, not a serialization format. Binary serialization is
//! deliberately external: the parser only knows the [`AstSerializer`]
//! interface.

mod ast;
mod sexp;

pub use ast::{
    GuardKind, IntegerValue, Node, NodeFlags, NodeKind, RegexpEncoding, RegexpOptions,
};
pub use ruby_position_tracking::SourceLocation;

/// Interface to the external AST serializer component.
///
/// The binary format is owned by the serializer; the parser core only hands
/// over the finished tree and an output buffer.
pub trait AstSerializer {
    /// Serializer-specific options blob.
    type Options;

    /// Writes a binary form of `node` into `out`.
    fn serialize(&self, node: &Node, options: &Self::Options, out: &mut Vec<u8>);
}
