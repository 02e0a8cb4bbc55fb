use thiserror::Error;

use strata_chunks::ChunkError;

/// Errors surfaced by registry operations.
///
/// The kinds are caller-observable and deliberately distinct: layered
/// products branch on them. Only the chunk store's own stale-prev CAS
/// rejection is retried, and that happens inside the update engine; every
/// `OptimisticLockFailed` a caller sees came from a name-scoped
/// compare-and-set precondition and means "refetch and try again".
#[derive(Debug, Error)]
pub enum DatasetError {
    /// A compare-and-set precondition observed a value other than the
    /// caller's expected one.
    #[error("optimistic lock failed on database root update")]
    OptimisticLockFailed,

    /// The dataset head is not an ancestor of the proposed commit; the
    /// requested advance is not a fast-forward.
    #[error("dataset head is not ancestor of commit")]
    MergeNeeded,

    /// The dataset head already points at the given commit.
    #[error("dataset head already pointing at given commit")]
    AlreadyCommitted,

    /// The dataset name failed the identifier grammar.
    #[error("invalid dataset ID: {id}: {reason}")]
    InvalidDatasetId { id: String, reason: String },

    /// Attempted to overwrite a dataset with a head of a different
    /// variant.
    #[error("cannot change type of head; currently points at {current} but new value would point at {proposed}")]
    TypeMismatch { current: String, proposed: String },

    /// Attempted to update a tag after creation.
    #[error("tag {id} already exists and cannot be altered after creation")]
    ImmutableTag { id: String },

    /// A head object or map chunk failed structural validation.
    #[error("malformed object: {reason}")]
    Malformed { reason: String },

    /// Failure in the underlying chunk store.
    #[error("chunk store: {0}")]
    Chunks(ChunkError),

    /// The operation's context was cancelled or its deadline passed.
    #[error("operation cancelled")]
    Canceled,
}

impl From<ChunkError> for DatasetError {
    fn from(err: ChunkError) -> Self {
        match err {
            ChunkError::Canceled => Self::Canceled,
            other => Self::Chunks(other),
        }
    }
}

/// Result alias for registry operations.
pub type DatasetResult<T> = Result<T, DatasetError>;
