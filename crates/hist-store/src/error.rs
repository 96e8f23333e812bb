use hist_types::{DiffId, RecordRef, VersionId, VersionNumber};

/// Errors from history store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Another version already holds this `(target, version_number)` slot.
    #[error("version {number} of {target} already exists")]
    Conflict {
        target: RecordRef,
        number: VersionNumber,
    },

    /// A header with this ID is already stored.
    #[error("duplicate version id: {0}")]
    DuplicateVersion(VersionId),

    /// The requested version header does not exist.
    #[error("version not found: {0}")]
    VersionNotFound(VersionId),

    /// The requested diff document does not exist.
    #[error("diff document not found: {0}")]
    DiffNotFound(DiffId),

    /// A diff document would be stored without a version referencing it.
    #[error("diff document {0} has no owning version")]
    OrphanDiff(DiffId),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A lock guarding store state was poisoned by a panicking writer.
    #[error("store lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StoreError {
    /// Returns `true` for uniqueness violations the caller may retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
