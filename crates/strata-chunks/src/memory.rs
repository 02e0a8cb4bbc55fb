use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use tracing::trace;

use strata_types::{Address, AddressSet, Context};

use crate::chunk::Chunk;
use crate::error::{ChunkError, ChunkResult};
use crate::traits::{ChunkStore, Format, StoreStats};

/// In-memory, HashMap-based chunk store.
///
/// Intended for tests and embedding. Chunks are held in memory behind a
/// `RwLock`; the root pointer lives under its own `Mutex` so the
/// compare-and-set in [`commit`] is atomic with respect to concurrent
/// committers. Data is lost when the store is dropped.
///
/// [`commit`]: ChunkStore::commit
pub struct InMemoryChunkStore {
    chunks: RwLock<HashMap<Address, Vec<u8>>>,
    root: Mutex<Address>,
    format: Format,
    gets: AtomicU64,
    puts: AtomicU64,
    commits: AtomicU64,
    failed_commits: AtomicU64,
}

impl InMemoryChunkStore {
    /// Create a new empty store with the given dataset-map format.
    pub fn new(format: Format) -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
            root: Mutex::new(Address::EMPTY),
            format,
            gets: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            failed_commits: AtomicU64::new(0),
        }
    }

    /// Number of chunks currently stored.
    pub fn len(&self) -> usize {
        self.chunks.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.read().expect("lock poisoned").is_empty()
    }

    fn check(ctx: &Context) -> ChunkResult<()> {
        if ctx.is_cancelled() {
            return Err(ChunkError::Canceled);
        }
        Ok(())
    }
}

impl ChunkStore for InMemoryChunkStore {
    fn get(&self, ctx: &Context, addr: Address) -> ChunkResult<Chunk> {
        Self::check(ctx)?;
        self.gets.fetch_add(1, Ordering::Relaxed);
        let chunks = self.chunks.read().expect("lock poisoned");
        match chunks.get(&addr) {
            Some(data) => Ok(Chunk::new(data.clone())),
            None => Ok(Chunk::empty()),
        }
    }

    fn put(&self, ctx: &Context, chunk: Chunk) -> ChunkResult<()> {
        Self::check(ctx)?;
        if chunk.is_empty() {
            return Err(ChunkError::EmptyChunk);
        }
        let computed = Address::digest(chunk.data());
        if computed != chunk.addr() {
            return Err(ChunkError::AddressMismatch {
                addr: chunk.addr(),
                computed,
            });
        }
        self.puts.fetch_add(1, Ordering::Relaxed);
        let mut chunks = self.chunks.write().expect("lock poisoned");
        // Idempotent: content-addressing guarantees the same address
        // always maps to the same bytes.
        chunks.entry(chunk.addr()).or_insert_with(|| chunk.into_data());
        Ok(())
    }

    fn root(&self, ctx: &Context) -> ChunkResult<Address> {
        Self::check(ctx)?;
        Ok(*self.root.lock().expect("lock poisoned"))
    }

    fn commit(&self, ctx: &Context, new: Address, prev: Address) -> ChunkResult<bool> {
        Self::check(ctx)?;
        let mut root = self.root.lock().expect("lock poisoned");
        if *root != prev {
            self.failed_commits.fetch_add(1, Ordering::Relaxed);
            trace!(
                expected = %prev.abbrev(),
                actual = %root.abbrev(),
                "root CAS rejected"
            );
            return Ok(false);
        }
        *root = new;
        self.commits.fetch_add(1, Ordering::Relaxed);
        trace!(root = %new.abbrev(), "root advanced");
        Ok(true)
    }

    fn stats(&self) -> StoreStats {
        let chunks = self.chunks.read().expect("lock poisoned");
        StoreStats {
            chunk_count: chunks.len() as u64,
            total_bytes: chunks.values().map(|d| d.len() as u64).sum(),
            gets: self.gets.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            failed_commits: self.failed_commits.load(Ordering::Relaxed),
        }
    }

    fn format(&self) -> Format {
        self.format
    }

    fn gc(&self, ctx: &Context, _old_gen: &AddressSet, _new_gen: &AddressSet) -> ChunkResult<()> {
        Self::check(ctx)?;
        // The in-memory store retains everything; reclamation is a
        // backend concern and this backend's lifetime is the test run.
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryChunkStore")
            .field("chunk_count", &self.len())
            .field("format", &self.format)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryChunkStore {
        InMemoryChunkStore::new(Format::Refmap)
    }

    // -----------------------------------------------------------------------
    // Get / Put
    // -----------------------------------------------------------------------

    #[test]
    fn put_and_get_roundtrip() {
        let ctx = Context::background();
        let store = store();
        let chunk = Chunk::new(b"hello world".to_vec());
        let addr = chunk.addr();

        store.put(&ctx, chunk.clone()).unwrap();
        let read_back = store.get(&ctx, addr).unwrap();
        assert_eq!(read_back, chunk);
    }

    #[test]
    fn get_missing_returns_empty_chunk() {
        let ctx = Context::background();
        let store = store();
        let miss = store.get(&ctx, Address::digest(b"never written")).unwrap();
        assert!(miss.is_empty());
    }

    #[test]
    fn put_is_idempotent() {
        let ctx = Context::background();
        let store = store();
        let chunk = Chunk::new(b"dup".to_vec());
        store.put(&ctx, chunk.clone()).unwrap();
        store.put(&ctx, chunk).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn put_empty_chunk_rejected() {
        let ctx = Context::background();
        let store = store();
        let err = store.put(&ctx, Chunk::empty()).unwrap_err();
        assert!(matches!(err, ChunkError::EmptyChunk));
    }

    // -----------------------------------------------------------------------
    // Root CAS
    // -----------------------------------------------------------------------

    #[test]
    fn fresh_store_has_empty_root() {
        let ctx = Context::background();
        let store = store();
        assert!(store.root(&ctx).unwrap().is_empty());
    }

    #[test]
    fn commit_from_empty_root() {
        let ctx = Context::background();
        let store = store();
        let new = Address::digest(b"root-1");
        assert!(store.commit(&ctx, new, Address::EMPTY).unwrap());
        assert_eq!(store.root(&ctx).unwrap(), new);
    }

    #[test]
    fn commit_with_stale_prev_rejected() {
        let ctx = Context::background();
        let store = store();
        let r1 = Address::digest(b"root-1");
        let r2 = Address::digest(b"root-2");
        assert!(store.commit(&ctx, r1, Address::EMPTY).unwrap());

        // Stale prev: root is r1 now, not empty.
        assert!(!store.commit(&ctx, r2, Address::EMPTY).unwrap());
        assert_eq!(store.root(&ctx).unwrap(), r1);

        // Correct prev succeeds.
        assert!(store.commit(&ctx, r2, r1).unwrap());
        assert_eq!(store.root(&ctx).unwrap(), r2);
    }

    #[test]
    fn concurrent_commits_have_one_winner_per_transition() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(store());
        let ctx = Context::background();
        let prev = Address::EMPTY;

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let ctx = ctx.clone();
                thread::spawn(move || {
                    let new = Address::digest(format!("candidate-{i}").as_bytes());
                    store.commit(&ctx, new, prev).unwrap()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    #[test]
    fn cancelled_context_aborts_operations() {
        let ctx = Context::background();
        ctx.cancel();
        let store = store();
        assert!(matches!(
            store.get(&ctx, Address::EMPTY).unwrap_err(),
            ChunkError::Canceled
        ));
        assert!(matches!(
            store.put(&ctx, Chunk::new(b"x".to_vec())).unwrap_err(),
            ChunkError::Canceled
        ));
        assert!(matches!(store.root(&ctx).unwrap_err(), ChunkError::Canceled));
        assert!(matches!(
            store
                .commit(&ctx, Address::EMPTY, Address::EMPTY)
                .unwrap_err(),
            ChunkError::Canceled
        ));
    }

    // -----------------------------------------------------------------------
    // Stats / format
    // -----------------------------------------------------------------------

    #[test]
    fn stats_track_operations() {
        let ctx = Context::background();
        let store = store();
        store.put(&ctx, Chunk::new(b"12345".to_vec())).unwrap();
        store.put(&ctx, Chunk::new(b"123456789".to_vec())).unwrap();
        store.get(&ctx, Address::digest(b"12345")).unwrap();

        let stats = store.stats();
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.total_bytes, 14);
        assert_eq!(stats.puts, 2);
        assert_eq!(stats.gets, 1);
    }

    #[test]
    fn stats_summary_mentions_counts() {
        let store = store();
        let summary = store.stats_summary();
        assert!(summary.contains("chunks: 0"));
    }

    #[test]
    fn format_is_fixed_at_construction() {
        assert_eq!(InMemoryChunkStore::new(Format::Classic).format(), Format::Classic);
        assert_eq!(InMemoryChunkStore::new(Format::Refmap).format(), Format::Refmap);
    }

    #[test]
    fn debug_format() {
        let store = store();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryChunkStore"));
        assert!(debug.contains("chunk_count"));
    }
}
