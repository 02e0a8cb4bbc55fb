//! The registry database: per-dataset operations over a chunk store,
//! serialized through one optimistic root-update loop.
//!
//! All mutation funnels through [`Database::update`]: read the root, load
//! the dataset map, apply an edit closure, write the new map, and
//! compare-and-set the root. A lost CAS race reloads and retries; every
//! error the edit itself returns surfaces immediately. The edit closures
//! are pure over their snapshot, so re-running them against a fresh map
//! is always safe.

use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::debug;

use strata_chunks::{Chunk, ChunkStore, Format, StoreStats};
use strata_types::{Address, AddressSet, Context};

use crate::ancestry::{find_common_ancestor, merge_needed};
use crate::closure::build_parents_closure;
use crate::dataset::Dataset;
use crate::error::{DatasetError, DatasetResult};
use crate::head::{
    load_head, validate_ref_as_commit, validate_tag, validate_working_set, CommitMeta, Head,
    MergeState, Ref, TagMeta, WorkingSetMeta,
};
use crate::map::DatasetsMap;
use crate::names::validate_dataset_id;

/// Options for [`Database::commit`].
///
/// An empty `parents` list means "the dataset's current head" (or no
/// parents for a new dataset). A non-empty list must include the current
/// head, or the commit is not a fast-forward and fails with
/// `MergeNeeded`.
#[derive(Clone, Debug, Default)]
pub struct CommitOptions {
    pub parents: Vec<Ref>,
    pub meta: Option<CommitMeta>,
}

/// Options for [`Database::tag`].
#[derive(Clone, Debug, Default)]
pub struct TagOptions {
    pub meta: TagMeta,
}

/// The desired contents of a working set, provided by the caller on each
/// update.
#[derive(Clone, Debug)]
pub struct WorkingSetSpec {
    pub meta: WorkingSetMeta,
    pub working_root: Ref,
    pub staged_root: Option<Ref>,
    pub merge_state: Option<MergeState>,
}

impl WorkingSetSpec {
    fn into_head(self) -> Head {
        Head::WorkingSet {
            working_root_ref: self.working_root,
            staged_root_ref: self.staged_root,
            merge_state: self.merge_state,
            meta: self.meta,
        }
    }
}

/// A versioned dataset registry over a [`ChunkStore`].
///
/// The database owns no mutable state of its own; the store's root
/// pointer is the single point of coordination between writers. The
/// `gc_gate` only serializes [`gc`] against in-flight updates.
///
/// [`gc`]: Database::gc
pub struct Database {
    store: Arc<dyn ChunkStore>,
    gc_gate: RwLock<()>,
}

impl Database {
    /// Create a database over the given store.
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self {
            store,
            gc_gate: RwLock::new(()),
        }
    }

    /// The underlying chunk store.
    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    /// The dataset-map encoding of this database.
    pub fn format(&self) -> Format {
        self.store.format()
    }

    /// Operation counters of the underlying store.
    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Human-readable one-line stats rendering.
    pub fn stats_summary(&self) -> String {
        self.store.stats_summary()
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The dataset map at the current root.
    ///
    /// This is a snapshot: concurrent writers may advance the root at any
    /// time, so entries read here can be stale by the time they are used.
    pub fn datasets(&self, ctx: &Context) -> DatasetResult<DatasetsMap> {
        let root = self.store.root(ctx)?;
        DatasetsMap::load(ctx, self.store.as_ref(), root)
    }

    /// Fetch a dataset handle by ID.
    pub fn get_dataset(&self, ctx: &Context, id: &str) -> DatasetResult<Dataset> {
        validate_dataset_id(id)?;
        let map = self.datasets(ctx)?;
        self.dataset_from_map(ctx, id, &map)
    }

    fn dataset_from_map(
        &self,
        ctx: &Context,
        id: &str,
        map: &DatasetsMap,
    ) -> DatasetResult<Dataset> {
        match map.lookup(id) {
            None => Ok(Dataset::absent(id.to_string())),
            Some(addr) => {
                let head =
                    load_head(ctx, self.store.as_ref(), addr)?.ok_or(DatasetError::Malformed {
                        reason: format!("dataset {id} head {} not found", addr.abbrev()),
                    })?;
                Ok(Dataset::with_head(id.to_string(), addr, head))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Chunk helpers
    // -----------------------------------------------------------------------

    /// Write a raw value chunk, returning a ref to it.
    pub fn write_value(&self, ctx: &Context, data: Vec<u8>) -> DatasetResult<Ref> {
        let chunk = Chunk::new(data);
        let addr = chunk.addr();
        self.store.put(ctx, chunk)?;
        Ok(Ref::to_value(addr))
    }

    fn write_head(&self, ctx: &Context, head: &Head) -> DatasetResult<Ref> {
        let chunk = head.encode()?;
        let r = Ref::new(chunk.addr(), head.height());
        self.store.put(ctx, chunk)?;
        Ok(r)
    }

    // -----------------------------------------------------------------------
    // The root-update engine
    // -----------------------------------------------------------------------

    /// Apply `edit` to the dataset map under optimistic concurrency.
    ///
    /// Each attempt re-reads the root and loads a fresh map, so `edit`
    /// may run any number of times and must not carry side effects
    /// visible to other datasets. Only the store's stale-prev CAS
    /// rejection retries; an error from `edit` -- including
    /// `OptimisticLockFailed` raised by a name-scoped precondition --
    /// surfaces as-is.
    fn update<F>(&self, ctx: &Context, mut edit: F) -> DatasetResult<()>
    where
        F: FnMut(&Context, &mut DatasetsMap) -> DatasetResult<()>,
    {
        let _gate = self.gc_gate.read().expect("lock poisoned");
        loop {
            if ctx.is_cancelled() {
                return Err(DatasetError::Canceled);
            }

            let root = self.store.root(ctx)?;
            let mut map = DatasetsMap::load(ctx, self.store.as_ref(), root)?;
            edit(ctx, &mut map)?;
            let new_root = map.serialize(ctx, self.store.as_ref())?;

            if self.store.commit(ctx, new_root, root)? {
                return Ok(());
            }
            debug!(root = %root.abbrev(), "lost root CAS race, retrying");
        }
    }

    // -----------------------------------------------------------------------
    // Head updates
    // -----------------------------------------------------------------------

    /// Unconditionally retarget a dataset at a new commit or tag head.
    ///
    /// This is the administrative escape hatch: no ancestry is checked.
    /// The dataset's head variant must not change, and tag-typed datasets
    /// stay immutable even here.
    pub fn set_head(
        &self,
        ctx: &Context,
        ds: &Dataset,
        new_head_addr: Address,
    ) -> DatasetResult<Dataset> {
        let new_head = load_head(ctx, self.store.as_ref(), new_head_addr)?.ok_or(
            DatasetError::Malformed {
                reason: format!("head {} not found", new_head_addr.abbrev()),
            },
        )?;
        match &new_head {
            Head::Commit { .. } => {}
            Head::Tag { .. } => validate_tag(ctx, self.store.as_ref(), &new_head)?,
            Head::WorkingSet { .. } => {
                return Err(DatasetError::Malformed {
                    reason: "set_head target must be a commit or tag".to_string(),
                })
            }
        }
        let new_type = new_head.type_name();
        let new_ref = Ref::new(new_head_addr, new_head.height());
        let id = ds.id().to_string();

        self.update(ctx, |ctx, map| {
            if let Some(curr_addr) = map.lookup(&id) {
                let curr = load_head(ctx, self.store.as_ref(), curr_addr)?.ok_or(
                    DatasetError::Malformed {
                        reason: format!("dataset {id} head {} not found", curr_addr.abbrev()),
                    },
                )?;
                if curr.type_name() != new_type {
                    return Err(DatasetError::TypeMismatch {
                        current: curr.type_name().to_string(),
                        proposed: new_type.to_string(),
                    });
                }
                if curr.is_tag() && curr_addr != new_ref.addr {
                    return Err(DatasetError::ImmutableTag { id: id.clone() });
                }
            }
            map.set(&id, &new_ref);
            Ok(())
        })?;
        self.get_dataset(ctx, ds.id())
    }

    /// Advance a commit-typed dataset to a descendant of its current
    /// head.
    ///
    /// Fails with `MergeNeeded` if the new head does not have the current
    /// head in its history. Advancing to the head already in place is a
    /// no-op.
    pub fn fast_forward(
        &self,
        ctx: &Context,
        ds: &Dataset,
        new_head_addr: Address,
    ) -> DatasetResult<Dataset> {
        let new_head = load_head(ctx, self.store.as_ref(), new_head_addr)?.ok_or(
            DatasetError::Malformed {
                reason: format!("fast-forward target {} not found", new_head_addr.abbrev()),
            },
        )?;
        if !new_head.is_commit() {
            return Err(DatasetError::Malformed {
                reason: format!(
                    "fast-forward target {} is not a commit",
                    new_head_addr.abbrev()
                ),
            });
        }
        let new_ref = Ref::new(new_head_addr, new_head.height());

        let mut current_addr = Address::EMPTY;
        if let Some(current) = ds.head_ref() {
            current_addr = current.addr;
            let ancestor = find_common_ancestor(ctx, self.store.as_ref(), &current, &new_ref)?;
            match ancestor {
                Some(a) if !merge_needed(&current, &a) => {}
                _ => return Err(DatasetError::MergeNeeded),
            }
        }

        match self.do_commit(ctx, ds.id(), current_addr, &new_ref) {
            Err(DatasetError::AlreadyCommitted) => Ok(()),
            other => other,
        }?;
        self.get_dataset(ctx, ds.id())
    }

    /// Record a new commit on a dataset.
    ///
    /// The commit's parents default to the handle's observed head; a
    /// handle gone stale surfaces as `MergeNeeded`.
    pub fn commit(
        &self,
        ctx: &Context,
        ds: &Dataset,
        value: Ref,
        opts: CommitOptions,
    ) -> DatasetResult<Dataset> {
        let current_addr = ds.head_addr();
        let head = self.build_new_commit(ctx, ds, value, &opts)?;
        let new_ref = self.write_head(ctx, &head)?;
        self.do_commit(ctx, ds.id(), current_addr, &new_ref)?;
        self.get_dataset(ctx, ds.id())
    }

    /// [`commit`](Database::commit) with default options.
    pub fn commit_value(&self, ctx: &Context, ds: &Dataset, value: Ref) -> DatasetResult<Dataset> {
        self.commit(ctx, ds, value, CommitOptions::default())
    }

    fn build_new_commit(
        &self,
        ctx: &Context,
        ds: &Dataset,
        value: Ref,
        opts: &CommitOptions,
    ) -> DatasetResult<Head> {
        let parents = if opts.parents.is_empty() {
            ds.head_ref().into_iter().collect()
        } else {
            if let Some(current) = ds.head_ref() {
                let found = opts.parents.iter().any(|p| p.addr == current.addr);
                if !found {
                    return Err(DatasetError::MergeNeeded);
                }
            }
            opts.parents.clone()
        };

        let parents_closure = build_parents_closure(ctx, self.store.as_ref(), &parents)?;
        Ok(Head::Commit {
            value,
            parents,
            parents_closure,
            meta: opts.meta.clone().unwrap_or_default(),
        })
    }

    fn do_commit(
        &self,
        ctx: &Context,
        id: &str,
        expected_current: Address,
        new_ref: &Ref,
    ) -> DatasetResult<()> {
        self.update(ctx, |_, map| {
            match map.lookup(id) {
                Some(curr) => {
                    if curr != expected_current {
                        return Err(DatasetError::MergeNeeded);
                    }
                    if curr == new_ref.addr {
                        return Err(DatasetError::AlreadyCommitted);
                    }
                }
                None => {
                    if !expected_current.is_empty() {
                        return Err(DatasetError::MergeNeeded);
                    }
                }
            }
            map.set(id, new_ref);
            Ok(())
        })
    }

    /// Create an immutable tag pointing at an existing commit.
    pub fn tag(
        &self,
        ctx: &Context,
        ds: &Dataset,
        commit_addr: Address,
        opts: TagOptions,
    ) -> DatasetResult<Dataset> {
        let commit = validate_ref_as_commit(ctx, self.store.as_ref(), &Ref::to_value(commit_addr))?;
        let tag = Head::Tag {
            commit_ref: Ref::new(commit_addr, commit.height()),
            meta: opts.meta,
        };
        let tag_ref = self.write_head(ctx, &tag)?;
        let id = ds.id().to_string();

        self.update(ctx, |_, map| {
            if map.lookup(&id).is_some() {
                return Err(DatasetError::ImmutableTag { id: id.clone() });
            }
            map.set(&id, &tag_ref);
            Ok(())
        })?;
        self.get_dataset(ctx, ds.id())
    }

    /// Replace a working set, guarded by a name-scoped compare-and-set.
    ///
    /// `prev_hash` is the head address the caller last observed for this
    /// working set (empty for "does not exist yet"). A mismatch surfaces
    /// as `OptimisticLockFailed` without retry: the caller holds a stale
    /// working set and must refetch.
    pub fn update_working_set(
        &self,
        ctx: &Context,
        ds: &Dataset,
        spec: WorkingSetSpec,
        prev_hash: Address,
    ) -> DatasetResult<Dataset> {
        let ws = spec.into_head();
        validate_working_set(&ws)?;
        let ws_ref = self.write_head(ctx, &ws)?;
        let id = ds.id().to_string();

        self.update(ctx, |_, map| {
            if !map.compare_and_set(&id, prev_hash, &ws_ref) {
                return Err(DatasetError::OptimisticLockFailed);
            }
            Ok(())
        })?;
        self.get_dataset(ctx, ds.id())
    }

    /// Atomically record a commit and replace its working set in one
    /// root transition.
    ///
    /// The working-set entry is guarded by `prev_ws_hash` exactly as in
    /// [`update_working_set`]; the commit entry must remain a
    /// fast-forward from its current head. Either both entries move or
    /// neither does.
    ///
    /// [`update_working_set`]: Database::update_working_set
    #[allow(clippy::too_many_arguments)]
    pub fn commit_with_working_set(
        &self,
        ctx: &Context,
        commit_ds: &Dataset,
        ws_ds: &Dataset,
        value: Ref,
        ws_spec: WorkingSetSpec,
        prev_ws_hash: Address,
        opts: CommitOptions,
    ) -> DatasetResult<(Dataset, Dataset)> {
        let ws = ws_spec.into_head();
        validate_working_set(&ws)?;
        let ws_ref = self.write_head(ctx, &ws)?;

        let commit_head = self.build_new_commit(ctx, commit_ds, value, &opts)?;
        let commit_ref = self.write_head(ctx, &commit_head)?;

        let commit_id = commit_ds.id().to_string();
        let ws_id = ws_ds.id().to_string();

        self.update(ctx, |ctx, map| {
            if !map.compare_and_set(&ws_id, prev_ws_hash, &ws_ref) {
                return Err(DatasetError::OptimisticLockFailed);
            }

            if let Some(curr_addr) = map.lookup(&commit_id) {
                let curr_head = load_head(ctx, self.store.as_ref(), curr_addr)?.ok_or(
                    DatasetError::Malformed {
                        reason: format!(
                            "dataset {commit_id} head {} not found",
                            curr_addr.abbrev()
                        ),
                    },
                )?;
                let current = Ref::new(curr_addr, curr_head.height());
                let ancestor =
                    find_common_ancestor(ctx, self.store.as_ref(), &current, &commit_ref)?;
                match ancestor {
                    Some(a) if !merge_needed(&current, &a) => {}
                    _ => return Err(DatasetError::MergeNeeded),
                }
            }

            map.set(&commit_id, &commit_ref);
            Ok(())
        })?;

        let map = self.datasets(ctx)?;
        let commit_ds = self.dataset_from_map(ctx, &commit_id, &map)?;
        let ws_ds = self.dataset_from_map(ctx, &ws_id, &map)?;
        Ok((commit_ds, ws_ds))
    }

    /// Remove a dataset entry.
    ///
    /// Deleting an absent dataset is a no-op. The edit is idempotent
    /// across CAS retries: the first observed head is captured, and any
    /// retry that observes a different head (or an entry that reappeared
    /// or vanished underneath us) fails with `MergeNeeded`.
    pub fn delete(&self, ctx: &Context, ds: &Dataset) -> DatasetResult<Dataset> {
        let id = ds.id().to_string();
        let mut first: Option<Address> = None;

        self.update(ctx, |_, map| {
            match map.lookup(&id) {
                None => {
                    if first.is_some() {
                        return Err(DatasetError::MergeNeeded);
                    }
                    // Never observed and already absent: nothing to do.
                    Ok(())
                }
                Some(curr) => {
                    match first {
                        None => first = Some(curr),
                        Some(f) if f != curr => return Err(DatasetError::MergeNeeded),
                        Some(_) => {}
                    }
                    map.delete(&id);
                    Ok(())
                }
            }
        })?;
        self.get_dataset(ctx, ds.id())
    }

    // -----------------------------------------------------------------------
    // GC bridge
    // -----------------------------------------------------------------------

    /// Forward reachable-root sets to the store's collector.
    ///
    /// Holds the write side of the GC gate so no root update overlaps
    /// the collection.
    pub fn gc(
        &self,
        ctx: &Context,
        old_gen: &AddressSet,
        new_gen: &AddressSet,
    ) -> DatasetResult<()> {
        let _gate = self.gc_gate.write().expect("lock poisoned");
        self.store.gc(ctx, old_gen, new_gen)?;
        Ok(())
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("format", &self.format())
            .finish()
    }
}
