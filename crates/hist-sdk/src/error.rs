use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("diff error: {0}")]
    Diff(#[from] hist_diff::DiffError),

    #[error("store error: {0}")]
    Store(#[from] hist_store::StoreError),

    #[error("ledger error: {0}")]
    Ledger(#[from] hist_ledger::LedgerError),

    #[error("merge error: {0}")]
    Merge(#[from] hist_merge::MergeError),
}

pub type SdkResult<T> = Result<T, SdkError>;
