use hist_types::{DiffId, RecordRef, VersionId, VersionNumber};

use crate::error::{StoreError, StoreResult};
use crate::object::{DiffDocument, VersionHeader};

/// A unit of work against a [`HistoryStore`].
///
/// Reads inside a transaction observe the transaction's own staged writes.
/// Writes become visible to other readers only after [`StoreTx::commit`].
/// Dropping a transaction without committing rolls it back.
pub trait StoreTx {
    /// Read a header, including writes staged in this transaction.
    fn version(&self, id: &VersionId) -> StoreResult<Option<VersionHeader>>;

    /// Highest version number currently held for `target`, if any.
    fn latest_version_number(&self, target: &RecordRef) -> StoreResult<Option<VersionNumber>>;

    /// Stage a new header.
    ///
    /// Fails with [`StoreError::Conflict`] when `(target, version_number)` is
    /// already taken, either in the committed state or in this transaction.
    fn insert_version(&mut self, header: VersionHeader) -> StoreResult<()>;

    /// Stage a replacement for an existing header (same ID).
    fn update_version(&mut self, header: VersionHeader) -> StoreResult<()>;

    /// Stage the removal of a header. Returns `true` if it existed.
    fn delete_version(&mut self, id: &VersionId) -> StoreResult<bool>;

    /// Read a diff document, including writes staged in this transaction.
    fn diff(&self, id: &DiffId) -> StoreResult<Option<DiffDocument>>;

    /// Stage an insert-or-replace of a diff document.
    fn put_diff(&mut self, document: DiffDocument) -> StoreResult<()>;

    /// Stage the removal of a diff document. Returns `true` if it existed.
    fn delete_diff(&mut self, id: &DiffId) -> StoreResult<bool>;

    /// Atomically publish every staged write.
    ///
    /// Uniqueness is re-checked at commit time; a writer that lost a race
    /// since staging receives [`StoreError::Conflict`] and nothing is applied.
    fn commit(self) -> StoreResult<()>
    where
        Self: Sized;
}

/// Storage backend for version headers and diff documents.
///
/// Implementations must be thread-safe and must enforce uniqueness of
/// `(target kind, target id, version number)` at commit.
pub trait HistoryStore: Send + Sync {
    type Tx<'a>: StoreTx
    where
        Self: 'a;

    /// Open a new transaction.
    fn begin(&self) -> StoreResult<Self::Tx<'_>>;

    /// Read a committed header by ID.
    fn version(&self, id: &VersionId) -> StoreResult<Option<VersionHeader>>;

    /// Find the committed header holding `number` for `target`.
    fn find_version(
        &self,
        target: &RecordRef,
        number: VersionNumber,
    ) -> StoreResult<Option<VersionHeader>>;

    /// All committed headers of `target`, ordered by version number.
    fn versions_for(&self, target: &RecordRef) -> StoreResult<Vec<VersionHeader>>;

    /// Every target that has at least one committed version, in sorted order.
    fn targets(&self) -> StoreResult<Vec<RecordRef>>;

    /// Read a committed diff document.
    fn diff(&self, id: &DiffId) -> StoreResult<Option<DiffDocument>>;

    /// Highest committed version number of `target`.
    fn latest_version_number(&self, target: &RecordRef) -> StoreResult<Option<VersionNumber>> {
        Ok(self
            .versions_for(target)?
            .last()
            .map(|h| h.version_number))
    }
}

/// Run `f` inside a transaction on `store`.
///
/// Commits when `f` returns `Ok`; on `Err` the transaction is dropped and
/// every staged write is discarded.
pub fn with_transaction<'s, S, T, E, F>(store: &'s S, f: F) -> Result<T, E>
where
    S: HistoryStore,
    E: From<StoreError>,
    F: FnOnce(&mut S::Tx<'s>) -> Result<T, E>,
{
    let mut tx = store.begin()?;
    let out = f(&mut tx)?;
    tx.commit()?;
    Ok(out)
}
