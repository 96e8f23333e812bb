use hist_diff::DiffError;
use hist_store::StoreError;
use hist_types::{DiffId, RecordKind, RecordRef, VersionId, VersionNumber};

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The operation does not apply to the version in its current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("version {0} not found")]
    VersionNotFound(VersionId),

    #[error("{target} has no version {number}")]
    VersionNumberNotFound {
        target: RecordRef,
        number: VersionNumber,
    },

    #[error("diff document {0} is missing")]
    DiffMissing(DiffId),

    /// The attribute exists but did not change in this version.
    #[error("attribute '{attribute}' didn't change in version {version}")]
    AttributeNotChanged {
        version: VersionId,
        attribute: String,
    },

    #[error("{kind} has no attribute or association named '{name}'")]
    UnknownAttribute { kind: RecordKind, name: String },

    #[error("unsupported lookup: {0}")]
    Unsupported(String),

    /// Version numbering lost every race for this target.
    #[error("version number conflict on {target} after {attempts} attempt(s)")]
    Conflict { target: RecordRef, attempts: u32 },

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// `true` for lookup misses that callers may treat as "no value".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::AttributeNotChanged { .. }
                | Self::UnknownAttribute { .. }
                | Self::VersionNotFound(_)
                | Self::VersionNumberNotFound { .. }
        )
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
