//! Content-addressed chunk storage for the Strata dataset registry.
//!
//! This crate defines the contract between the registry core and its
//! backing blob store: immutable [`Chunk`]s keyed by their [`Address`],
//! plus a single atomically-swappable *root* pointer that identifies the
//! current dataset map. All registry mutations funnel through the root's
//! compare-and-set primitive.
//!
//! # Storage Backends
//!
//! All backends implement the [`ChunkStore`] trait:
//!
//! - [`InMemoryChunkStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Chunks are immutable once written (content-addressing guarantees this).
//! 2. The store never interprets chunk contents -- it is a pure key-value
//!    store plus one root pointer.
//! 3. Root swaps are atomic: `commit(new, prev)` succeeds iff the root was
//!    exactly `prev` at the instant of the swap.
//! 4. Concurrent reads are always safe (chunks are immutable).
//! 5. All I/O errors are propagated, never silently ignored.
//!
//! [`Address`]: strata_types::Address

pub mod chunk;
pub mod error;
pub mod memory;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use chunk::Chunk;
pub use error::{ChunkError, ChunkResult};
pub use memory::InMemoryChunkStore;
pub use traits::{ChunkStore, Format, StoreStats};
