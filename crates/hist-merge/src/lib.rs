//! Merge protocol for attribute-level record history.
//!
//! Folds a host-detected [`ChangeSet`] into an existing, persisted update
//! [`Version`](hist_ledger::Version). Repeated merges collapse into one
//! before/after pair per attribute; entries that revert are dropped, and a
//! version left with no entries is destroyed. Each merge is one store
//! transaction: it applies fully or not at all.

pub mod changes;
pub mod error;
pub mod merge;

pub use changes::ChangeSet;
pub use error::{MergeError, MergeResult};
pub use merge::{merge, MergeOutcome};
