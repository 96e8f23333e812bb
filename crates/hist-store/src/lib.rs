//! Persistence boundary for attribute-level record history.
//!
//! History is persisted in two shapes: a relational-style [`VersionHeader`]
//! row per version, unique on `(target kind, target id, version number)`, and
//! a [`DiffDocument`] holding the per-attribute entries of that version.
//!
//! # Storage Backends
//!
//! All backends implement the [`HistoryStore`] trait:
//!
//! - [`InMemoryHistoryStore`] -- optimistic, `RwLock`-guarded store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Every write goes through a [`StoreTx`]; nothing is visible to other
//!    readers until [`StoreTx::commit`] succeeds.
//! 2. Dropping a transaction without committing discards all of its writes.
//! 3. Commit is all-or-nothing: either every staged write lands or none does.
//! 4. Two versions can never share `(target, version_number)`; the loser of
//!    a race receives [`StoreError::Conflict`].
//! 5. The store never interprets diff contents.

pub mod error;
pub mod memory;
pub mod object;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryHistoryStore, InMemoryTx};
pub use object::{DiffDocument, DiffEntryDocument, DiffType, VersionHeader};
pub use traits::{with_transaction, HistoryStore, StoreTx};
