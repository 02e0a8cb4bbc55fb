//! Head objects: the values dataset entries point at.
//!
//! A dataset's head is one of three variants: a [`Head::Commit`] (a node
//! in the history graph), a [`Head::Tag`] (an immutable alias to a
//! commit), or a [`Head::WorkingSet`] (an in-progress working/staged root
//! pair). A dataset's variant is fixed at creation and must never change
//! across updates.
//!
//! Heads are serialized as kind-tagged JSON chunks; the serde field names
//! below are stable wire names.

use serde::{Deserialize, Serialize};

use strata_chunks::{Chunk, ChunkStore};
use strata_types::{Address, Context};

use crate::error::{DatasetError, DatasetResult};

/// A pointer to a stored chunk, carrying the DAG height of its target.
///
/// Heights order the commit graph: a commit's height is one more than the
/// tallest of its parents, and refs to plain values have height 1. The
/// parents closure is keyed by `(height, address)`, so heights must be
/// preserved wherever refs are re-serialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ref {
    pub addr: Address,
    pub height: u64,
}

impl Ref {
    /// Create a ref to `addr` with the given height.
    pub fn new(addr: Address, height: u64) -> Self {
        Self { addr, height }
    }

    /// A ref to a plain value chunk (height 1).
    pub fn to_value(addr: Address) -> Self {
        Self { addr, height: 1 }
    }
}

/// Author/actor metadata attached to a commit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMeta {
    pub name: String,
    pub email: String,
    pub timestamp_millis: u64,
    pub description: String,
}

/// Metadata attached to a tag at creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMeta {
    pub name: String,
    pub email: String,
    pub timestamp_millis: u64,
    pub description: String,
}

/// Metadata attached to a working-set update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingSetMeta {
    pub name: String,
    pub email: String,
    pub timestamp_millis: u64,
    pub description: String,
}

/// In-progress merge bookkeeping carried by a working set.
///
/// Opaque to the registry: stored and returned, never interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeState {
    pub working_pre_merge_root: Ref,
    pub from_commit: Ref,
}

/// The object a dataset entry points at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Head {
    /// A node in the history graph.
    Commit {
        value: Ref,
        parents: Vec<Ref>,
        parents_closure: Option<Ref>,
        meta: CommitMeta,
    },

    /// An immutable alias to a commit. Cannot be moved once created.
    Tag { commit_ref: Ref, meta: TagMeta },

    /// An in-progress working/staged root pair, overwritten on each
    /// update.
    WorkingSet {
        working_root_ref: Ref,
        staged_root_ref: Option<Ref>,
        merge_state: Option<MergeState>,
        meta: WorkingSetMeta,
    },
}

impl Head {
    /// The stable name of this head's variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Commit { .. } => "commit",
            Self::Tag { .. } => "tag",
            Self::WorkingSet { .. } => "working_set",
        }
    }

    /// Returns `true` if this head is a commit.
    pub fn is_commit(&self) -> bool {
        matches!(self, Self::Commit { .. })
    }

    /// Returns `true` if this head is a tag.
    pub fn is_tag(&self) -> bool {
        matches!(self, Self::Tag { .. })
    }

    /// Returns `true` if this head is a working set.
    pub fn is_working_set(&self) -> bool {
        matches!(self, Self::WorkingSet { .. })
    }

    /// The DAG height of a ref pointing at this head.
    ///
    /// A commit sits one level above its tallest parent; tags and working
    /// sets are leaves.
    pub fn height(&self) -> u64 {
        match self {
            Self::Commit { parents, .. } => {
                1 + parents.iter().map(|p| p.height).max().unwrap_or(0)
            }
            Self::Tag { .. } | Self::WorkingSet { .. } => 1,
        }
    }

    /// The commit's parents, if this head is a commit.
    pub fn parents(&self) -> Option<&[Ref]> {
        match self {
            Self::Commit { parents, .. } => Some(parents),
            _ => None,
        }
    }

    /// Serialize into a chunk.
    pub fn encode(&self) -> DatasetResult<Chunk> {
        let data = serde_json::to_vec(self).map_err(|e| DatasetError::Malformed {
            reason: format!("head serialization failed: {e}"),
        })?;
        Ok(Chunk::new(data))
    }

    /// Decode from a chunk, failing with `Malformed` on garbage.
    pub fn decode(chunk: &Chunk) -> DatasetResult<Self> {
        serde_json::from_slice(chunk.data()).map_err(|e| DatasetError::Malformed {
            reason: format!("head chunk {} does not decode: {e}", chunk.addr().abbrev()),
        })
    }
}

/// Load and decode the head at `addr`. Returns `None` for a store miss.
pub fn load_head(
    ctx: &Context,
    store: &dyn ChunkStore,
    addr: Address,
) -> DatasetResult<Option<Head>> {
    let chunk = store.get(ctx, addr)?;
    if chunk.is_empty() {
        return Ok(None);
    }
    Ok(Some(Head::decode(&chunk)?))
}

/// Dereference `r` and assert the target is a well-formed commit.
pub fn validate_ref_as_commit(
    ctx: &Context,
    store: &dyn ChunkStore,
    r: &Ref,
) -> DatasetResult<Head> {
    let head = load_head(ctx, store, r.addr)?.ok_or_else(|| DatasetError::Malformed {
        reason: format!("commit {} not found", r.addr.abbrev()),
    })?;
    if !head.is_commit() {
        return Err(DatasetError::Malformed {
            reason: format!("referred value {} is not a commit", r.addr.abbrev()),
        });
    }
    Ok(head)
}

/// Validate a tag head: the `commit_ref` must dereference to a commit.
pub fn validate_tag(ctx: &Context, store: &dyn ChunkStore, head: &Head) -> DatasetResult<()> {
    match head {
        Head::Tag { commit_ref, .. } => {
            validate_ref_as_commit(ctx, store, commit_ref)?;
            Ok(())
        }
        other => Err(DatasetError::Malformed {
            reason: format!("expected tag, got {}", other.type_name()),
        }),
    }
}

/// Validate a working-set head: the working root ref must be present.
pub fn validate_working_set(head: &Head) -> DatasetResult<()> {
    match head {
        Head::WorkingSet {
            working_root_ref, ..
        } => {
            if working_root_ref.addr.is_empty() {
                return Err(DatasetError::Malformed {
                    reason: "working set is missing working_root_ref".to_string(),
                });
            }
            Ok(())
        }
        other => Err(DatasetError::Malformed {
            reason: format!("expected working_set, got {}", other.type_name()),
        }),
    }
}
