//! The dataset map: an ordered mapping *name -> head address* with two
//! on-disk encodings behind one interface.
//!
//! - [`ClassicMap`]: a persistent sorted map serialized as one chunk;
//!   entries carry full [`Ref`]s. Mutation goes through a [`MapEditor`]
//!   that batches `set`/`delete` and finalizes into a new map.
//! - [`RefMap`]: a flat sorted list of `(name, address)` entries with a
//!   fixed binary layout; the chunk's address is the map's identity.
//!
//! The encoding is selected once per database by the store's [`Format`]
//! and never leaks past [`DatasetsMap`], the sum type the update engine
//! and dataset API work against.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use strata_chunks::{Chunk, ChunkStore, Format};
use strata_types::{Address, Context};

use crate::error::{DatasetError, DatasetResult};
use crate::head::Ref;

// ---------------------------------------------------------------------------
// Classic encoding
// ---------------------------------------------------------------------------

/// Persistent sorted map from dataset name to head ref.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassicMap {
    entries: BTreeMap<String, Ref>,
}

impl ClassicMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of datasets in the map.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The head address for `name`, if present.
    pub fn lookup(&self, name: &str) -> Option<Address> {
        self.entries.get(name).map(|r| r.addr)
    }

    /// The full head ref for `name`, if present.
    pub fn lookup_ref(&self, name: &str) -> Option<&Ref> {
        self.entries.get(name)
    }

    /// Begin a batched edit against this map.
    pub fn edit(&self) -> MapEditor {
        MapEditor {
            base: self.entries.clone(),
            ops: Vec::new(),
        }
    }

    /// Point `name` at `new` iff the current entry's address equals
    /// `expected` (the empty address means "entry absent").
    pub fn compare_and_set(&mut self, name: &str, expected: Address, new: Ref) -> bool {
        let current = self.lookup(name).unwrap_or(Address::EMPTY);
        if current != expected {
            return false;
        }
        *self = self.edit().set(name, new).build();
        true
    }

    /// Entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Address)> {
        self.entries.iter().map(|(name, r)| (name.as_str(), r.addr))
    }

    /// Serialize into a chunk.
    pub fn encode(&self) -> DatasetResult<Chunk> {
        let data = serde_json::to_vec(&self.entries).map_err(|e| DatasetError::Malformed {
            reason: format!("dataset map serialization failed: {e}"),
        })?;
        Ok(Chunk::new(data))
    }

    /// Decode from a chunk.
    pub fn decode(chunk: &Chunk) -> DatasetResult<Self> {
        let entries: BTreeMap<String, Ref> =
            serde_json::from_slice(chunk.data()).map_err(|e| DatasetError::Malformed {
                reason: format!(
                    "dataset map chunk {} does not decode: {e}",
                    chunk.addr().abbrev()
                ),
            })?;
        Ok(Self { entries })
    }
}

enum EditOp {
    Set(String, Ref),
    Delete(String),
}

/// Batched mutation builder for [`ClassicMap`].
///
/// Ops accumulate in call order and apply on [`build`]; dropping the
/// editor discards the batch.
///
/// [`build`]: MapEditor::build
pub struct MapEditor {
    base: BTreeMap<String, Ref>,
    ops: Vec<EditOp>,
}

impl MapEditor {
    /// Queue a set of `name` to `r`.
    pub fn set(mut self, name: &str, r: Ref) -> Self {
        self.ops.push(EditOp::Set(name.to_string(), r));
        self
    }

    /// Queue a removal of `name`.
    pub fn delete(mut self, name: &str) -> Self {
        self.ops.push(EditOp::Delete(name.to_string()));
        self
    }

    /// Apply the batch, producing the new map.
    pub fn build(self) -> ClassicMap {
        let mut entries = self.base;
        for op in self.ops {
            match op {
                EditOp::Set(name, r) => {
                    entries.insert(name, r);
                }
                EditOp::Delete(name) => {
                    entries.remove(&name);
                }
            }
        }
        ClassicMap { entries }
    }
}

// ---------------------------------------------------------------------------
// Refmap encoding
// ---------------------------------------------------------------------------

/// Flat sorted list of `(name, address)` entries.
///
/// On-disk layout, little-endian:
/// `count:u32 | repeat(count): name_len:u16 | name:utf8 | addr:20B`,
/// entries sorted strictly ascending by name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefMap {
    entries: Vec<(String, Address)>,
}

impl RefMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of datasets in the map.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The head address for `name`, if present.
    pub fn lookup(&self, name: &str) -> Option<Address> {
        self.entries
            .binary_search_by(|(n, _)| n.as_str().cmp(name))
            .ok()
            .map(|i| self.entries[i].1)
    }

    /// Insert or replace the entry for `name`, preserving sort order.
    pub fn set(&mut self, name: &str, addr: Address) {
        match self.entries.binary_search_by(|(n, _)| n.as_str().cmp(name)) {
            Ok(i) => self.entries[i].1 = addr,
            Err(i) => self.entries.insert(i, (name.to_string(), addr)),
        }
    }

    /// Remove the entry for `name`, if present.
    pub fn delete(&mut self, name: &str) {
        if let Ok(i) = self.entries.binary_search_by(|(n, _)| n.as_str().cmp(name)) {
            self.entries.remove(i);
        }
    }

    /// Point `name` at `new` iff the current entry equals `expected`
    /// (the empty address means "entry absent").
    pub fn compare_and_set(&mut self, name: &str, expected: Address, new: Address) -> bool {
        let current = self.lookup(name).unwrap_or(Address::EMPTY);
        if current != expected {
            return false;
        }
        self.set(name, new);
        true
    }

    /// Entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Address)> {
        self.entries.iter().map(|(name, addr)| (name.as_str(), *addr))
    }

    /// Serialize into a chunk using the fixed binary layout.
    pub fn encode(&self) -> DatasetResult<Chunk> {
        let mut buf = Vec::new();
        let count = u32::try_from(self.entries.len()).map_err(|_| DatasetError::Malformed {
            reason: "dataset map has more than u32::MAX entries".to_string(),
        })?;
        buf.extend_from_slice(&count.to_le_bytes());
        for (name, addr) in &self.entries {
            let name_len = u16::try_from(name.len()).map_err(|_| DatasetError::Malformed {
                reason: format!("dataset name too long for refmap encoding: {name}"),
            })?;
            buf.extend_from_slice(&name_len.to_le_bytes());
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(addr.as_bytes());
        }
        Ok(Chunk::new(buf))
    }

    /// Decode from a chunk, validating layout and sort order.
    pub fn decode(chunk: &Chunk) -> DatasetResult<Self> {
        let data = chunk.data();
        let malformed = |reason: String| DatasetError::Malformed { reason };

        if data.len() < 4 {
            return Err(malformed("refmap chunk shorter than its header".into()));
        }
        let count = u32::from_le_bytes(data[..4].try_into().expect("4-byte slice")) as usize;

        let mut entries = Vec::with_capacity(count);
        let mut pos = 4;
        for _ in 0..count {
            if data.len() < pos + 2 {
                return Err(malformed("refmap chunk truncated in entry header".into()));
            }
            let name_len =
                u16::from_le_bytes(data[pos..pos + 2].try_into().expect("2-byte slice")) as usize;
            pos += 2;
            if data.len() < pos + name_len + strata_types::address::ADDRESS_LEN {
                return Err(malformed("refmap chunk truncated in entry body".into()));
            }
            let name = std::str::from_utf8(&data[pos..pos + name_len])
                .map_err(|e| malformed(format!("refmap entry name is not UTF-8: {e}")))?
                .to_string();
            pos += name_len;
            let mut raw = [0u8; strata_types::address::ADDRESS_LEN];
            raw.copy_from_slice(&data[pos..pos + strata_types::address::ADDRESS_LEN]);
            pos += strata_types::address::ADDRESS_LEN;

            if let Some((prev, _)) = entries.last() {
                if *prev >= name {
                    return Err(malformed("refmap entries not sorted by name".into()));
                }
            }
            entries.push((name, Address::from(raw)));
        }
        if pos != data.len() {
            return Err(malformed("refmap chunk has trailing bytes".into()));
        }

        Ok(Self { entries })
    }
}

// ---------------------------------------------------------------------------
// Uniform dispatch
// ---------------------------------------------------------------------------

/// The dataset map in whichever encoding the store dictates.
///
/// CAS edits in the update engine receive a `&mut DatasetsMap` loaded from
/// a root snapshot and mutate it through this uniform surface; the
/// encoding never influences edit logic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatasetsMap {
    Classic(ClassicMap),
    Refmap(RefMap),
}

impl DatasetsMap {
    /// An empty map in the given encoding.
    pub fn empty(format: Format) -> Self {
        match format {
            Format::Classic => Self::Classic(ClassicMap::new()),
            Format::Refmap => Self::Refmap(RefMap::new()),
        }
    }

    /// Load the map identified by `root` from the store, dispatching on
    /// the store's format. The empty root loads an empty map.
    pub fn load(ctx: &Context, store: &dyn ChunkStore, root: Address) -> DatasetResult<Self> {
        if root.is_empty() {
            return Ok(Self::empty(store.format()));
        }
        let chunk = store.get(ctx, root)?;
        if chunk.is_empty() {
            return Err(DatasetError::Malformed {
                reason: format!("root hash {} not found in database", root.abbrev()),
            });
        }
        match store.format() {
            Format::Classic => Ok(Self::Classic(ClassicMap::decode(&chunk)?)),
            Format::Refmap => Ok(Self::Refmap(RefMap::decode(&chunk)?)),
        }
    }

    /// The encoding of this map.
    pub fn format(&self) -> Format {
        match self {
            Self::Classic(_) => Format::Classic,
            Self::Refmap(_) => Format::Refmap,
        }
    }

    /// Number of datasets in the map.
    pub fn len(&self) -> usize {
        match self {
            Self::Classic(m) => m.len(),
            Self::Refmap(m) => m.len(),
        }
    }

    /// Returns `true` if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The head address for `name`, if present.
    pub fn lookup(&self, name: &str) -> Option<Address> {
        match self {
            Self::Classic(m) => m.lookup(name),
            Self::Refmap(m) => m.lookup(name),
        }
    }

    /// Point the entry for `name` at `r`.
    pub fn set(&mut self, name: &str, r: &Ref) {
        match self {
            Self::Classic(m) => *m = m.edit().set(name, *r).build(),
            Self::Refmap(m) => m.set(name, r.addr),
        }
    }

    /// Remove the entry for `name`, if present.
    pub fn delete(&mut self, name: &str) {
        match self {
            Self::Classic(m) => *m = m.edit().delete(name).build(),
            Self::Refmap(m) => m.delete(name),
        }
    }

    /// Name-scoped compare-and-set: point `name` at `new` iff the current
    /// entry equals `expected` (the empty address means "entry absent").
    /// Returns `false`, leaving the map untouched, on mismatch.
    pub fn compare_and_set(&mut self, name: &str, expected: Address, new: &Ref) -> bool {
        match self {
            Self::Classic(m) => m.compare_and_set(name, expected, *new),
            Self::Refmap(m) => m.compare_and_set(name, expected, new.addr),
        }
    }

    /// Entries in name order.
    pub fn entries(&self) -> Vec<(String, Address)> {
        match self {
            Self::Classic(m) => m.iter().map(|(n, a)| (n.to_string(), a)).collect(),
            Self::Refmap(m) => m.iter().map(|(n, a)| (n.to_string(), a)).collect(),
        }
    }

    /// Write this map to the store, returning its root address.
    pub fn serialize(&self, ctx: &Context, store: &dyn ChunkStore) -> DatasetResult<Address> {
        let chunk = match self {
            Self::Classic(m) => m.encode()?,
            Self::Refmap(m) => m.encode()?,
        };
        let addr = chunk.addr();
        store.put(ctx, chunk)?;
        Ok(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_chunks::InMemoryChunkStore;

    fn r(data: &[u8]) -> Ref {
        Ref::new(Address::digest(data), 1)
    }

    // -----------------------------------------------------------------------
    // Classic encoding
    // -----------------------------------------------------------------------

    #[test]
    fn classic_editor_batches_in_order() {
        let map = ClassicMap::new();
        let map = map
            .edit()
            .set("b", r(b"1"))
            .set("a", r(b"2"))
            .delete("b")
            .set("c", r(b"3"))
            .build();

        assert_eq!(map.len(), 2);
        assert_eq!(map.lookup("a"), Some(r(b"2").addr));
        assert_eq!(map.lookup("b"), None);
        assert_eq!(map.lookup("c"), Some(r(b"3").addr));
    }

    #[test]
    fn classic_editor_does_not_touch_base() {
        let map = ClassicMap::new().edit().set("a", r(b"1")).build();
        let _discarded = map.edit().delete("a");
        // Dropping the editor discards the batch.
        assert_eq!(map.lookup("a"), Some(r(b"1").addr));
    }

    #[test]
    fn classic_iterates_sorted() {
        let map = ClassicMap::new()
            .edit()
            .set("zeta", r(b"1"))
            .set("alpha", r(b"2"))
            .set("mid", r(b"3"))
            .build();
        let names: Vec<&str> = map.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn classic_preserves_ref_heights() {
        let tall = Ref::new(Address::digest(b"tall"), 9);
        let map = ClassicMap::new().edit().set("ds", tall).build();
        let chunk = map.encode().unwrap();
        let decoded = ClassicMap::decode(&chunk).unwrap();
        assert_eq!(decoded.lookup_ref("ds"), Some(&tall));
    }

    #[test]
    fn classic_chunk_roundtrip() {
        let map = ClassicMap::new()
            .edit()
            .set("refs/heads/main", r(b"main"))
            .set("refs/tags/v1", r(b"v1"))
            .build();
        let chunk = map.encode().unwrap();
        let decoded = ClassicMap::decode(&chunk).unwrap();
        assert_eq!(map, decoded);
    }

    // -----------------------------------------------------------------------
    // Refmap encoding
    // -----------------------------------------------------------------------

    #[test]
    fn refmap_set_maintains_sort() {
        let mut map = RefMap::new();
        map.set("zeta", Address::digest(b"1"));
        map.set("alpha", Address::digest(b"2"));
        map.set("mid", Address::digest(b"3"));
        let names: Vec<&str> = map.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn refmap_set_replaces_existing() {
        let mut map = RefMap::new();
        map.set("ds", Address::digest(b"old"));
        map.set("ds", Address::digest(b"new"));
        assert_eq!(map.len(), 1);
        assert_eq!(map.lookup("ds"), Some(Address::digest(b"new")));
    }

    #[test]
    fn refmap_delete_removes() {
        let mut map = RefMap::new();
        map.set("ds", Address::digest(b"x"));
        map.delete("ds");
        assert!(map.is_empty());
        // Deleting a missing entry is a no-op.
        map.delete("ds");
    }

    #[test]
    fn refmap_binary_roundtrip() {
        let mut map = RefMap::new();
        map.set("refs/heads/main", Address::digest(b"main"));
        map.set("refs/tags/v1", Address::digest(b"v1"));
        map.set("workingSets/main", Address::digest(b"ws"));

        let chunk = map.encode().unwrap();
        let decoded = RefMap::decode(&chunk).unwrap();
        assert_eq!(map, decoded);
    }

    #[test]
    fn refmap_layout_is_exactly_specified() {
        let mut map = RefMap::new();
        let addr = Address::digest(b"target");
        map.set("ab", addr);

        let chunk = map.encode().unwrap();
        let data = chunk.data();
        // count=1, name_len=2, "ab", 20 address bytes.
        assert_eq!(&data[..4], &1u32.to_le_bytes());
        assert_eq!(&data[4..6], &2u16.to_le_bytes());
        assert_eq!(&data[6..8], b"ab");
        assert_eq!(&data[8..], addr.as_bytes());
    }

    #[test]
    fn refmap_decode_rejects_truncation() {
        let mut map = RefMap::new();
        map.set("ds", Address::digest(b"x"));
        let good = map.encode().unwrap().into_data();

        for cut in [2, 5, good.len() - 1] {
            let chunk = Chunk::new(good[..cut].to_vec());
            let err = RefMap::decode(&chunk).unwrap_err();
            assert!(matches!(err, DatasetError::Malformed { .. }), "cut at {cut}");
        }
    }

    #[test]
    fn refmap_decode_rejects_unsorted_entries() {
        // Handcraft a chunk with entries out of order.
        let mut buf = Vec::new();
        buf.extend_from_slice(&2u32.to_le_bytes());
        for name in ["b", "a"] {
            buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(Address::digest(name.as_bytes()).as_bytes());
        }
        let err = RefMap::decode(&Chunk::new(buf)).unwrap_err();
        assert!(matches!(err, DatasetError::Malformed { .. }));
    }

    #[test]
    fn refmap_decode_rejects_trailing_bytes() {
        let map = RefMap::new();
        let mut data = map.encode().unwrap().into_data();
        data.push(0xff);
        let err = RefMap::decode(&Chunk::new(data)).unwrap_err();
        assert!(matches!(err, DatasetError::Malformed { .. }));
    }

    // -----------------------------------------------------------------------
    // Uniform dispatch
    // -----------------------------------------------------------------------

    #[test]
    fn load_of_empty_root_is_empty_map() {
        let ctx = Context::background();
        for format in [Format::Classic, Format::Refmap] {
            let store = InMemoryChunkStore::new(format);
            let map = DatasetsMap::load(&ctx, &store, Address::EMPTY).unwrap();
            assert!(map.is_empty());
            assert_eq!(map.format(), format);
        }
    }

    #[test]
    fn load_of_dangling_root_is_malformed() {
        let ctx = Context::background();
        let store = InMemoryChunkStore::new(Format::Refmap);
        let err = DatasetsMap::load(&ctx, &store, Address::digest(b"dangling")).unwrap_err();
        assert!(matches!(err, DatasetError::Malformed { .. }));
    }

    #[test]
    fn serialize_then_load_yields_equal_iteration() {
        let ctx = Context::background();
        for format in [Format::Classic, Format::Refmap] {
            let store = InMemoryChunkStore::new(format);
            let mut map = DatasetsMap::empty(format);
            map.set("refs/heads/main", &r(b"main"));
            map.set("refs/heads/dev", &r(b"dev"));
            map.set("refs/tags/v1", &r(b"v1"));

            let root = map.serialize(&ctx, &store).unwrap();
            let loaded = DatasetsMap::load(&ctx, &store, root).unwrap();
            assert_eq!(loaded.entries(), map.entries(), "{format}");
        }
    }

    #[test]
    fn serialize_is_deterministic() {
        let ctx = Context::background();
        for format in [Format::Classic, Format::Refmap] {
            let store = InMemoryChunkStore::new(format);
            let mut m1 = DatasetsMap::empty(format);
            let mut m2 = DatasetsMap::empty(format);
            // Same entries inserted in different orders.
            m1.set("a", &r(b"1"));
            m1.set("b", &r(b"2"));
            m2.set("b", &r(b"2"));
            m2.set("a", &r(b"1"));
            assert_eq!(
                m1.serialize(&ctx, &store).unwrap(),
                m2.serialize(&ctx, &store).unwrap(),
                "{format}"
            );
        }
    }

    #[test]
    fn compare_and_set_semantics() {
        for format in [Format::Classic, Format::Refmap] {
            let mut map = DatasetsMap::empty(format);

            // Absent entry: empty expected succeeds, anything else fails.
            assert!(!map.compare_and_set("ds", Address::digest(b"wrong"), &r(b"v1")));
            assert!(map.compare_and_set("ds", Address::EMPTY, &r(b"v1")));
            assert_eq!(map.lookup("ds"), Some(r(b"v1").addr));

            // Present entry: stale expected fails and leaves the map alone.
            assert!(!map.compare_and_set("ds", Address::EMPTY, &r(b"v2")));
            assert_eq!(map.lookup("ds"), Some(r(b"v1").addr));
            assert!(map.compare_and_set("ds", r(b"v1").addr, &r(b"v2")));
            assert_eq!(map.lookup("ds"), Some(r(b"v2").addr));
        }
    }

    #[test]
    fn set_and_delete_dispatch_uniformly() {
        for format in [Format::Classic, Format::Refmap] {
            let mut map = DatasetsMap::empty(format);
            map.set("ds", &r(b"v1"));
            assert_eq!(map.len(), 1);
            map.delete("ds");
            assert!(map.is_empty());
        }
    }
}
