use strata_types::Address;

/// Errors from chunk store operations.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    /// Attempted to store the empty (miss-sentinel) chunk.
    #[error("cannot store the empty chunk")]
    EmptyChunk,

    /// Content hash mismatch between a chunk's address and its data.
    #[error("address mismatch for {addr}: computed {computed}")]
    AddressMismatch { addr: Address, computed: Address },

    /// The operation's context was cancelled or its deadline passed.
    #[error("operation cancelled")]
    Canceled,

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for chunk store operations.
pub type ChunkResult<T> = Result<T, ChunkError>;
