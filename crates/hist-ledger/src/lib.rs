//! Version ledger for attribute-level record history.
//!
//! This crate turns diffs into numbered versions and reads them back. It
//! provides:
//! - [`Version`] with its two variants, Creation (number 0) and Update (> 0)
//! - [`VersionLedger`] for recording, numbering, loading, and author reassignment
//! - Historical attribute and association lookup ([`lookup_old`] / [`lookup_new`])
//! - Point-in-time reconstruction ([`HistoryReplay`])
//! - History validation ([`HistoryValidator`])

pub mod error;
pub mod ledger;
pub mod lookup;
pub mod replay;
pub mod validation;
pub mod version;

pub use error::{LedgerError, LedgerResult};
pub use ledger::{VersionLedger, DEFAULT_MAX_CONFLICT_RETRIES};
pub use lookup::{lookup, lookup_new, lookup_old, HistoricalValue, Side};
pub use replay::HistoryReplay;
pub use validation::{HistoryValidator, ValidationReport, Violation, ViolationKind};
pub use version::{Version, VersionKind};
