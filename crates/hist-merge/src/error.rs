use hist_diff::DiffError;
use hist_ledger::LedgerError;
use hist_store::StoreError;
use hist_types::VersionId;

/// Errors produced by [`crate::merge`]. Any error means nothing was applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    /// The version cannot accept merges: unsaved, or a creation version.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The version was removed from the store before the merge committed.
    #[error("version {0} no longer exists")]
    VersionGone(VersionId),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<MergeError> for LedgerError {
    fn from(err: MergeError) -> Self {
        match err {
            MergeError::InvalidState(msg) => LedgerError::InvalidState(msg),
            MergeError::VersionGone(id) => LedgerError::VersionNotFound(id),
            MergeError::Diff(e) => LedgerError::Diff(e),
            MergeError::Store(e) => LedgerError::Store(e),
        }
    }
}

pub type MergeResult<T> = Result<T, MergeError>;
