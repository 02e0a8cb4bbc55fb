//! Versioned, content-addressed dataset registry.
//!
//! A Strata database maintains a set of named *datasets* -- branches, tags,
//! and working sets -- each pointing at an immutable head object in a
//! content-addressed chunk store. All datasets live in a single map whose
//! serialized form is identified by the store's *root* address; every
//! mutation replaces the root through an optimistic compare-and-set loop,
//! so concurrent writers race without locks and observe well-defined
//! conflict outcomes.
//!
//! # History model
//!
//! Commit-typed datasets form a git-like graph: each [`Head::Commit`]
//! records its parents, and advancing a dataset requires the new commit to
//! be a descendant of the current head (*fast-forward*) unless explicit
//! merge parents say otherwise. Tags alias a commit and are immutable once
//! created. Working sets are mutable-per-update objects guarded by a
//! name-scoped compare-and-set.
//!
//! # Entry points
//!
//! [`Database`] wraps a [`ChunkStore`] and exposes the per-dataset
//! operations: [`commit`], [`tag`], [`fast_forward`], [`set_head`],
//! [`update_working_set`], [`commit_with_working_set`], and [`delete`].
//!
//! [`ChunkStore`]: strata_chunks::ChunkStore
//! [`commit`]: Database::commit
//! [`tag`]: Database::tag
//! [`fast_forward`]: Database::fast_forward
//! [`set_head`]: Database::set_head
//! [`update_working_set`]: Database::update_working_set
//! [`commit_with_working_set`]: Database::commit_with_working_set
//! [`delete`]: Database::delete

pub mod ancestry;
pub mod closure;
pub mod database;
pub mod dataset;
pub mod error;
pub mod head;
pub mod map;
pub mod names;

pub use ancestry::{find_common_ancestor, merge_needed};
pub use closure::ParentsClosure;
pub use database::{CommitOptions, Database, TagOptions, WorkingSetSpec};
pub use dataset::Dataset;
pub use error::{DatasetError, DatasetResult};
pub use head::{CommitMeta, Head, MergeState, Ref, TagMeta, WorkingSetMeta};
pub use map::{ClassicMap, DatasetsMap, MapEditor, RefMap};
pub use names::validate_dataset_id;
