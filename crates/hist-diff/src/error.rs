//! Error types for the diff crate.

use hist_types::{RecordRef, VersionId};

/// Errors that can occur while building or validating diffs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiffError {
    /// A value cannot be represented in the attribute's diff variant.
    #[error("type mismatch on '{attribute}': expected {expected}, got {found}")]
    TypeMismatch {
        attribute: String,
        expected: String,
        found: String,
    },

    /// A diff or attribute diff failed required-field validation.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// An entry for this attribute already exists in the diff.
    #[error("duplicate entry for attribute '{0}'")]
    DuplicateAttribute(String),

    /// The two snapshots passed to a comparison describe different records.
    #[error("cannot compare {from} with {to}")]
    TargetMismatch { from: RecordRef, to: RecordRef },

    /// The diff already belongs to a different version.
    #[error("diff already attached to version {0}")]
    AlreadyAttached(VersionId),
}

impl DiffError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed(message.into())
    }
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
