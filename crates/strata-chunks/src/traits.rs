use serde::{Deserialize, Serialize};
use strata_types::{Address, AddressSet, Context};

use crate::chunk::Chunk;
use crate::error::ChunkResult;

/// The dataset-map encoding a store was created with.
///
/// The format is a property of the store, fixed for its lifetime. The
/// registry core dispatches on it uniformly and never mixes encodings
/// within one database.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    /// Persistent sorted map written as a serialized map chunk; entries
    /// carry full refs.
    Classic,
    /// Flat list of `(name, address)` entries in one binary chunk.
    Refmap,
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Classic => write!(f, "classic"),
            Self::Refmap => write!(f, "refmap"),
        }
    }
}

/// Point-in-time operation counters for a chunk store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of chunks currently stored.
    pub chunk_count: u64,
    /// Total bytes across all stored chunks.
    pub total_bytes: u64,
    /// Number of `get` calls served.
    pub gets: u64,
    /// Number of `put` calls served.
    pub puts: u64,
    /// Number of root CAS attempts that succeeded.
    pub commits: u64,
    /// Number of root CAS attempts rejected with a stale prev.
    pub failed_commits: u64,
}

/// Content-addressed blob store with an atomic-swap root pointer.
///
/// All implementations must satisfy these invariants:
/// - Chunks are write-once and immutable; the same data always produces
///   the same address.
/// - `get` on a missing address returns the empty chunk, never an error.
/// - `commit(new, prev)` is atomic: it succeeds iff the root was exactly
///   `prev`, and on success the root becomes `new`. No intermediate root
///   is ever observable.
/// - Every method honors its [`Context`]: a cancelled context aborts with
///   `ChunkError::Canceled` before touching storage.
/// - All I/O errors are propagated, never silently ignored.
pub trait ChunkStore: Send + Sync {
    /// Read a chunk by address. Returns the empty chunk on a miss.
    fn get(&self, ctx: &Context, addr: Address) -> ChunkResult<Chunk>;

    /// Write a chunk. Idempotent: writing an already-present chunk is a
    /// no-op.
    fn put(&self, ctx: &Context, chunk: Chunk) -> ChunkResult<()>;

    /// The current root address. Empty for a store that has never
    /// committed.
    fn root(&self, ctx: &Context) -> ChunkResult<Address>;

    /// Atomically swap the root from `prev` to `new`.
    ///
    /// Returns `true` iff the store's root was exactly `prev` at the
    /// moment of the swap; the root is then `new`. Returns `false` if
    /// another writer advanced the root first.
    fn commit(&self, ctx: &Context, new: Address, prev: Address) -> ChunkResult<bool>;

    /// Operation counters for this store.
    fn stats(&self) -> StoreStats;

    /// Human-readable one-line stats rendering.
    fn stats_summary(&self) -> String {
        let s = self.stats();
        format!(
            "chunks: {} ({} bytes), gets: {}, puts: {}, commits: {} ok / {} stale",
            s.chunk_count, s.total_bytes, s.gets, s.puts, s.commits, s.failed_commits
        )
    }

    /// The dataset-map encoding this store was created with.
    fn format(&self) -> Format;

    /// Reclaim chunks unreachable from the given generation root sets.
    ///
    /// The traversal and reclamation policy belong to the store; callers
    /// provide the reachable-root addresses partitioned by generation and
    /// must ensure no root update overlaps the call.
    fn gc(&self, ctx: &Context, old_gen: &AddressSet, new_gen: &AddressSet) -> ChunkResult<()>;
}
