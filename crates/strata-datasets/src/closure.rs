//! The parents closure: an indexed transitive-ancestor map.
//!
//! Every commit may carry a ref to a *parents closure* chunk: a map keyed
//! by `(height, address)` covering all transitive parents of the commit,
//! where each entry's value is that ancestor's own parents list. Ancestry
//! queries use it as an O(lookup) index instead of walking the graph.
//!
//! Closure tracking degrades monotonically: if any parent has parents but
//! no closure, the new commit records no closure either. A database that
//! stops tracking closures never pretends to resume.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use strata_chunks::{Chunk, ChunkStore};
use strata_types::{Address, Context};

use crate::error::{DatasetError, DatasetResult};
use crate::head::{validate_ref_as_commit, Head, Ref};

/// Key of a closure entry: the ancestor's `(height, address)`.
pub type ClosureKey = (u64, Address);

/// One serialized closure entry. Entries are stored sorted by key.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct ClosureEntry {
    height: u64,
    addr: Address,
    parents: Vec<Ref>,
}

/// The in-memory form of a parents closure.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParentsClosure {
    entries: BTreeMap<ClosureKey, Vec<Ref>>,
}

impl ParentsClosure {
    /// An empty closure.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of ancestors indexed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no ancestors are indexed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if the closure indexes the given ancestor ref.
    pub fn contains(&self, r: &Ref) -> bool {
        self.entries.contains_key(&(r.height, r.addr))
    }

    /// Insert an ancestor entry.
    pub fn insert(&mut self, key: ClosureKey, parents: Vec<Ref>) {
        self.entries.insert(key, parents);
    }

    /// Iterate entries in `(height, address)` order.
    pub fn iter(&self) -> impl Iterator<Item = (&ClosureKey, &Vec<Ref>)> {
        self.entries.iter()
    }

    /// Serialize into a chunk (entries sorted by key).
    pub fn encode(&self) -> DatasetResult<Chunk> {
        let entries: Vec<ClosureEntry> = self
            .entries
            .iter()
            .map(|(&(height, addr), parents)| ClosureEntry {
                height,
                addr,
                parents: parents.clone(),
            })
            .collect();
        let data = serde_json::to_vec(&entries).map_err(|e| DatasetError::Malformed {
            reason: format!("closure serialization failed: {e}"),
        })?;
        Ok(Chunk::new(data))
    }

    /// Decode from a chunk.
    pub fn decode(chunk: &Chunk) -> DatasetResult<Self> {
        let entries: Vec<ClosureEntry> =
            serde_json::from_slice(chunk.data()).map_err(|e| DatasetError::Malformed {
                reason: format!(
                    "closure chunk {} does not decode: {e}",
                    chunk.addr().abbrev()
                ),
            })?;
        let mut map = BTreeMap::new();
        for e in entries {
            map.insert((e.height, e.addr), e.parents);
        }
        Ok(Self { entries: map })
    }

    /// Load the closure referenced by `r`.
    pub fn load(ctx: &Context, store: &dyn ChunkStore, r: &Ref) -> DatasetResult<Self> {
        let chunk = store.get(ctx, r.addr)?;
        if chunk.is_empty() {
            return Err(DatasetError::Malformed {
                reason: format!("parents closure {} not found", r.addr.abbrev()),
            });
        }
        Self::decode(&chunk)
    }
}

/// Build the parents closure for a new commit with the given parents,
/// write it, and return a ref to it.
///
/// Construction, given parents `p[0..n]`:
/// 1. Start from `p[0]`'s closure (empty if absent).
/// 2. For each additional `p[i]`, merge in the keys present in `p[i]`'s
///    closure but not `p[0]`'s. Values agree wherever keys collide, since
///    keys are content addresses.
/// 3. For every `p[i]`, set the key `(p[i].height, p[i].addr)` to
///    `p[i]`'s parents list.
///
/// Returns `None` for a parentless commit, and `None` whenever any parent
/// has a non-empty parents list but no closure of its own -- closure
/// tracking is not resumed once dropped.
pub fn build_parents_closure(
    ctx: &Context,
    store: &dyn ChunkStore,
    parents: &[Ref],
) -> DatasetResult<Option<Ref>> {
    if parents.is_empty() {
        return Ok(None);
    }

    let mut parent_lists: Vec<Vec<Ref>> = Vec::with_capacity(parents.len());
    let mut parent_closures: Vec<ParentsClosure> = Vec::with_capacity(parents.len());
    for p in parents {
        let head = validate_ref_as_commit(ctx, store, p)?;
        let Head::Commit {
            parents: p_parents,
            parents_closure,
            ..
        } = head
        else {
            unreachable!("validate_ref_as_commit returned a non-commit");
        };
        let closure = match &parents_closure {
            Some(r) => ParentsClosure::load(ctx, store, r)?,
            None => ParentsClosure::empty(),
        };
        if closure.is_empty() && !p_parents.is_empty() {
            // This ancestor's closure was never tracked; do not record one
            // on the new commit.
            return Ok(None);
        }
        parent_lists.push(p_parents);
        parent_closures.push(closure);
    }

    let mut result = parent_closures[0].clone();
    for other in &parent_closures[1..] {
        for (key, parents_of_key) in other.iter() {
            if !parent_closures[0].entries.contains_key(key) {
                result.insert(*key, parents_of_key.clone());
            }
        }
    }
    for (p, p_parents) in parents.iter().zip(parent_lists) {
        result.insert((p.height, p.addr), p_parents);
    }

    let chunk = result.encode()?;
    let r = Ref::to_value(chunk.addr());
    store.put(ctx, chunk)?;
    Ok(Some(r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_chunks::{Format, InMemoryChunkStore};

    use crate::head::CommitMeta;

    /// Write a commit with the given parents, building its closure, and
    /// return its ref.
    fn write_commit(
        ctx: &Context,
        store: &dyn ChunkStore,
        value: &[u8],
        parents: Vec<Ref>,
    ) -> Ref {
        let parents_closure = build_parents_closure(ctx, store, &parents).unwrap();
        let head = Head::Commit {
            value: Ref::to_value(Address::digest(value)),
            parents,
            parents_closure,
            meta: CommitMeta::default(),
        };
        let chunk = head.encode().unwrap();
        let r = Ref::new(chunk.addr(), head.height());
        store.put(ctx, chunk).unwrap();
        r
    }

    fn load_closure_of(ctx: &Context, store: &dyn ChunkStore, r: &Ref) -> Option<ParentsClosure> {
        let head = validate_ref_as_commit(ctx, store, r).unwrap();
        match head {
            Head::Commit {
                parents_closure, ..
            } => parents_closure.map(|cr| ParentsClosure::load(ctx, store, &cr).unwrap()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn parentless_commit_has_no_closure() {
        let ctx = Context::background();
        let store = InMemoryChunkStore::new(Format::Refmap);
        let r = build_parents_closure(&ctx, &store, &[]).unwrap();
        assert!(r.is_none());
    }

    #[test]
    fn closure_of_child_indexes_parent() {
        let ctx = Context::background();
        let store = InMemoryChunkStore::new(Format::Refmap);
        let c1 = write_commit(&ctx, &store, b"v1", vec![]);
        let c2 = write_commit(&ctx, &store, b"v2", vec![c1]);

        let closure = load_closure_of(&ctx, &store, &c2).expect("closure present");
        assert_eq!(closure.len(), 1);
        assert!(closure.contains(&c1));
    }

    #[test]
    fn closure_is_transitive() {
        let ctx = Context::background();
        let store = InMemoryChunkStore::new(Format::Refmap);
        let c1 = write_commit(&ctx, &store, b"v1", vec![]);
        let c2 = write_commit(&ctx, &store, b"v2", vec![c1]);
        let c3 = write_commit(&ctx, &store, b"v3", vec![c2]);

        let closure = load_closure_of(&ctx, &store, &c3).expect("closure present");
        assert_eq!(closure.len(), 2);
        assert!(closure.contains(&c1));
        assert!(closure.contains(&c2));
    }

    #[test]
    fn merge_commit_closure_covers_both_lineages() {
        let ctx = Context::background();
        let store = InMemoryChunkStore::new(Format::Refmap);
        let base = write_commit(&ctx, &store, b"base", vec![]);
        let left = write_commit(&ctx, &store, b"left", vec![base]);
        let right = write_commit(&ctx, &store, b"right", vec![base]);
        let merge = write_commit(&ctx, &store, b"merge", vec![left, right]);

        let closure = load_closure_of(&ctx, &store, &merge).expect("closure present");
        assert!(closure.contains(&base));
        assert!(closure.contains(&left));
        assert!(closure.contains(&right));
        assert_eq!(closure.len(), 3);
    }

    #[test]
    fn closure_entry_records_ancestor_parents() {
        let ctx = Context::background();
        let store = InMemoryChunkStore::new(Format::Refmap);
        let c1 = write_commit(&ctx, &store, b"v1", vec![]);
        let c2 = write_commit(&ctx, &store, b"v2", vec![c1]);
        let c3 = write_commit(&ctx, &store, b"v3", vec![c2]);

        let closure = load_closure_of(&ctx, &store, &c3).unwrap();
        let (_, parents_of_c2) = closure
            .iter()
            .find(|(&(_, addr), _)| addr == c2.addr)
            .expect("c2 indexed");
        assert_eq!(parents_of_c2, &vec![c1]);
    }

    #[test]
    fn untracked_parent_suppresses_closure() {
        let ctx = Context::background();
        let store = InMemoryChunkStore::new(Format::Refmap);
        let c1 = write_commit(&ctx, &store, b"v1", vec![]);

        // Handcraft a commit with a parent but no closure, as an old
        // database would have written it.
        let legacy = Head::Commit {
            value: Ref::to_value(Address::digest(b"legacy")),
            parents: vec![c1],
            parents_closure: None,
            meta: CommitMeta::default(),
        };
        let chunk = legacy.encode().unwrap();
        let legacy_ref = Ref::new(chunk.addr(), legacy.height());
        store.put(&ctx, chunk).unwrap();

        // A child of the legacy commit must not record a closure.
        let r = build_parents_closure(&ctx, &store, &[legacy_ref]).unwrap();
        assert!(r.is_none());

        // And neither must a merge that includes it.
        let c2 = write_commit(&ctx, &store, b"v2", vec![c1]);
        let r = build_parents_closure(&ctx, &store, &[c2, legacy_ref]).unwrap();
        assert!(r.is_none());
    }

    #[test]
    fn closure_roundtrips_through_chunk() {
        let mut closure = ParentsClosure::empty();
        closure.insert((1, Address::digest(b"a")), vec![]);
        closure.insert(
            (2, Address::digest(b"b")),
            vec![Ref::new(Address::digest(b"a"), 1)],
        );

        let chunk = closure.encode().unwrap();
        let decoded = ParentsClosure::decode(&chunk).unwrap();
        assert_eq!(closure, decoded);
    }

    #[test]
    fn entries_iterate_in_key_order() {
        let mut closure = ParentsClosure::empty();
        closure.insert((3, Address::digest(b"tall")), vec![]);
        closure.insert((1, Address::digest(b"short")), vec![]);
        let heights: Vec<u64> = closure.iter().map(|(&(h, _), _)| h).collect();
        assert_eq!(heights, vec![1, 3]);
    }
}
