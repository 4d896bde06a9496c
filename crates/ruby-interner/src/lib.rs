//! Content-addressed constant pool for identifier interning.
//!
//! The parser interns every identifier, method name, and label it encounters
//! so AST nodes can reference names as dense integer ids instead of byte
//! slices. Lookup is by content: equal bytes yield the same id regardless of
//! how the bytes are stored.
//!
//! Three storage classes exist, differing only in ownership:
//!
//! - **shared** — borrows the source buffer (the common case; free)
//! - **owned** — the pool takes ownership of a freshly built buffer (names
//!   assembled from escape sequences)
//! - **constant** — `'static` program data (synthesized names like `it`)

use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher, RandomState};

/// Dense identifier for an interned name. Ids start at 0 and grow by one per
/// distinct byte content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstantId(pub u32);

/// One pool entry; the variant records ownership, not identity.
#[derive(Debug)]
enum Constant<'src> {
    Shared(&'src [u8]),
    Owned(Vec<u8>),
    Static(&'static [u8]),
}

impl Constant<'_> {
    fn bytes(&self) -> &[u8] {
        match self {
            Constant::Shared(bytes) => bytes,
            Constant::Owned(bytes) => bytes,
            Constant::Static(bytes) => bytes,
        }
    }
}

/// Append-only interner mapping byte content to [`ConstantId`]s.
#[derive(Debug)]
pub struct ConstantPool<'src> {
    entries: Vec<Constant<'src>>,
    /// Hash of content -> candidate ids (bucketed to survive collisions)
    buckets: HashMap<u64, Vec<ConstantId>>,
    hasher: RandomState,
}

impl<'src> ConstantPool<'src> {
    /// Creates a pool sized for a source buffer of `source_len` bytes.
    pub fn with_source_len(source_len: usize) -> Self {
        // One distinct identifier per ~16 source bytes is a generous upper
        // bound for real Ruby code.
        let capacity = (source_len / 16).next_power_of_two().max(8);
        Self {
            entries: Vec::with_capacity(capacity),
            buckets: HashMap::with_capacity(capacity),
            hasher: RandomState::new(),
        }
    }

    /// Interns bytes that live in the source buffer.
    pub fn insert_shared(&mut self, bytes: &'src [u8]) -> ConstantId {
        if let Some(id) = self.find(bytes) {
            return id;
        }
        self.push(Constant::Shared(bytes))
    }

    /// Interns bytes the pool takes ownership of.
    pub fn insert_owned(&mut self, bytes: Vec<u8>) -> ConstantId {
        if let Some(id) = self.find(&bytes) {
            return id;
        }
        self.push(Constant::Owned(bytes))
    }

    /// Interns program-static bytes.
    pub fn insert_constant(&mut self, bytes: &'static [u8]) -> ConstantId {
        if let Some(id) = self.find(bytes) {
            return id;
        }
        self.push(Constant::Static(bytes))
    }

    /// The byte content behind an id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this pool.
    pub fn lookup(&self, id: ConstantId) -> &[u8] {
        self.entries[id.0 as usize].bytes()
    }

    /// The byte content behind an id, as UTF-8 if it is valid UTF-8.
    pub fn lookup_str(&self, id: ConstantId) -> Option<&str> {
        std::str::from_utf8(self.lookup(id)).ok()
    }

    /// Number of distinct names interned.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing has been interned.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, bytes: &[u8]) -> Option<ConstantId> {
        let hash = self.hash(bytes);
        self.buckets
            .get(&hash)?
            .iter()
            .copied()
            .find(|&id| self.entries[id.0 as usize].bytes() == bytes)
    }

    fn push(&mut self, constant: Constant<'src>) -> ConstantId {
        let id = ConstantId(self.entries.len() as u32);
        let hash = self.hash(constant.bytes());
        self.entries.push(constant);
        self.buckets.entry(hash).or_default().push(id);
        id
    }

    fn hash(&self, bytes: &[u8]) -> u64 {
        let mut state = self.hasher.build_hasher();
        bytes.hash(&mut state);
        state.finish()
    }
}

impl Default for ConstantPool<'_> {
    fn default() -> Self {
        Self::with_source_len(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_same_id_across_storage_classes() {
        let src = b"foo bar foo";
        let mut pool = ConstantPool::with_source_len(src.len());
        let shared = pool.insert_shared(&src[0..3]);
        let owned = pool.insert_owned(b"foo".to_vec());
        let constant = pool.insert_constant(b"foo");
        assert_eq!(shared, owned);
        assert_eq!(shared, constant);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn distinct_bytes_distinct_ids() {
        let mut pool = ConstantPool::default();
        let a = pool.insert_constant(b"a");
        let b = pool.insert_constant(b"b");
        assert_ne!(a, b);
        assert_eq!(pool.lookup(a), b"a");
        assert_eq!(pool.lookup(b), b"b");
    }

    #[test]
    fn ids_are_dense() {
        let mut pool = ConstantPool::default();
        for (i, name) in [&b"x"[..], b"y", b"z"].iter().enumerate() {
            assert_eq!(pool.insert_owned(name.to_vec()), ConstantId(i as u32));
        }
    }

    #[test]
    fn lookup_str_rejects_invalid_utf8() {
        let mut pool = ConstantPool::default();
        let id = pool.insert_owned(vec![0xFF, 0xFE]);
        assert_eq!(pool.lookup_str(id), None);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Interning is stable: re-inserting any subset yields the ids
            /// from the first round.
            #[test]
            fn reinsert_is_identity(names in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 0..24), 0..64)
            ) {
                let mut pool = ConstantPool::default();
                let first: Vec<ConstantId> =
                    names.iter().map(|n| pool.insert_owned(n.clone())).collect();
                let second: Vec<ConstantId> =
                    names.iter().map(|n| pool.insert_owned(n.clone())).collect();
                prop_assert_eq!(first, second);
            }
        }
    }
}
