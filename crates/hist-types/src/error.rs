use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid record reference: {0}")]
    InvalidRecordRef(String),

    #[error("record kind must not be empty")]
    EmptyKind,

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}
