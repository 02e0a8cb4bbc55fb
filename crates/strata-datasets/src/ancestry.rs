//! Ancestry queries over the commit graph.
//!
//! [`find_common_ancestor`] answers the question every head advance asks:
//! is the proposed commit a descendant of the current one? It prefers the
//! parents-closure index when the commits carry one and falls back to a
//! height-synchronized walk over parent refs.

use std::collections::HashMap;

use strata_chunks::ChunkStore;
use strata_types::{Address, Context};

use crate::closure::ParentsClosure;
use crate::error::{DatasetError, DatasetResult};
use crate::head::{validate_ref_as_commit, Head, Ref};

/// Returns `true` iff advancing from `current` is *not* a fast-forward,
/// i.e. the common ancestor is not `current` itself.
pub fn merge_needed(current: &Ref, ancestor: &Ref) -> bool {
    current.addr != ancestor.addr
}

/// Find the deepest common ancestor of two commits.
///
/// Returns `None` when the commits share no history. Fails with
/// `Malformed` if either ref (or any ancestor reached during the walk)
/// does not resolve to a commit.
pub fn find_common_ancestor(
    ctx: &Context,
    store: &dyn ChunkStore,
    a: &Ref,
    b: &Ref,
) -> DatasetResult<Option<Ref>> {
    if a.addr == b.addr {
        return Ok(Some(*a));
    }

    let head_a = validate_ref_as_commit(ctx, store, a)?;
    let head_b = validate_ref_as_commit(ctx, store, b)?;

    // Closure fast path: membership in one commit's closure settles the
    // query without a walk.
    if let Some(closure) = load_closure(ctx, store, &head_a)? {
        if closure.contains(b) {
            return Ok(Some(*b));
        }
    }
    if let Some(closure) = load_closure(ctx, store, &head_b)? {
        if closure.contains(a) {
            return Ok(Some(*a));
        }
    }

    // Height-synchronized frontier walk. Each frontier holds the maximal
    // unexpanded ancestors of its side; the taller frontier expands until
    // the frontiers meet or one side runs out of history.
    let mut frontier_a: HashMap<Address, u64> = HashMap::from([(a.addr, a.height)]);
    let mut frontier_b: HashMap<Address, u64> = HashMap::from([(b.addr, b.height)]);

    loop {
        if ctx.is_cancelled() {
            return Err(DatasetError::Canceled);
        }

        if let Some(common) = intersect(&frontier_a, &frontier_b) {
            return Ok(Some(common));
        }

        if frontier_a.is_empty() || frontier_b.is_empty() {
            return Ok(None);
        }

        let top_a = frontier_a.values().copied().max().unwrap_or(0);
        let top_b = frontier_b.values().copied().max().unwrap_or(0);
        if top_a >= top_b {
            expand(ctx, store, &mut frontier_a, top_a)?;
        } else {
            expand(ctx, store, &mut frontier_b, top_b)?;
        }
    }
}

fn load_closure(
    ctx: &Context,
    store: &dyn ChunkStore,
    head: &Head,
) -> DatasetResult<Option<ParentsClosure>> {
    match head {
        Head::Commit {
            parents_closure: Some(r),
            ..
        } => Ok(Some(ParentsClosure::load(ctx, store, r)?)),
        _ => Ok(None),
    }
}

/// The tallest member present in both frontiers, if any.
fn intersect(a: &HashMap<Address, u64>, b: &HashMap<Address, u64>) -> Option<Ref> {
    a.iter()
        .filter(|(addr, _)| b.contains_key(*addr))
        .max_by_key(|(addr, height)| (**height, **addr))
        .map(|(addr, height)| Ref::new(*addr, *height))
}

/// Replace every frontier member at `height` with its parents.
fn expand(
    ctx: &Context,
    store: &dyn ChunkStore,
    frontier: &mut HashMap<Address, u64>,
    height: u64,
) -> DatasetResult<()> {
    let tallest: Vec<Address> = frontier
        .iter()
        .filter(|(_, h)| **h == height)
        .map(|(addr, _)| *addr)
        .collect();
    for addr in tallest {
        frontier.remove(&addr);
        let head = validate_ref_as_commit(ctx, store, &Ref::new(addr, height))?;
        if let Some(parents) = head.parents() {
            for p in parents {
                frontier.insert(p.addr, p.height);
            }
        }
    }
    Ok(())
}
