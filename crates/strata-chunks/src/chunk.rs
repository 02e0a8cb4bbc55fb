use strata_types::Address;

/// An immutable binary blob identified by its content address.
///
/// A `Chunk` pairs raw bytes with the [`Address`] computed from them. The
/// empty chunk (empty address, no data) is the sentinel returned by
/// [`ChunkStore::get`] for a miss.
///
/// [`ChunkStore::get`]: crate::ChunkStore::get
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    addr: Address,
    data: Vec<u8>,
}

impl Chunk {
    /// Create a chunk from raw bytes, computing its address.
    pub fn new(data: Vec<u8>) -> Self {
        let addr = Address::digest(&data);
        Self { addr, data }
    }

    /// The empty chunk: no data, empty address. Signals a store miss.
    pub fn empty() -> Self {
        Self {
            addr: Address::EMPTY,
            data: Vec::new(),
        }
    }

    /// Returns `true` if this is the empty (miss) chunk.
    pub fn is_empty(&self) -> bool {
        self.addr.is_empty()
    }

    /// The content address of this chunk.
    pub fn addr(&self) -> Address {
        self.addr
    }

    /// The chunk's raw bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The size of the chunk's data in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Consume the chunk, returning its bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}
