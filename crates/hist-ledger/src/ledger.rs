//! Recording, numbering, and loading versions.

use std::sync::Arc;

use hist_diff::{Diff, DiffEngine};
use hist_store::{with_transaction, HistoryStore, StoreError, StoreTx};
use hist_types::{Record, RecordRef, VersionId, VersionNumber, CREATION_VERSION};
use tracing::{debug, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::lookup::{self, HistoricalValue, Side};
use crate::version::Version;

/// Retries granted to an update that keeps losing the race for its number.
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// Version log over a [`HistoryStore`].
///
/// Numbers are assigned here, never by callers: creation is always 0 and
/// each update takes one more than the target's highest stored number. The
/// store's uniqueness constraint serializes concurrent writers; losers
/// recompute and retry.
pub struct VersionLedger<S> {
    store: Arc<S>,
    engine: Arc<DiffEngine>,
    max_conflict_retries: u32,
}

impl<S: HistoryStore> VersionLedger<S> {
    pub fn new(store: Arc<S>, engine: Arc<DiffEngine>) -> Self {
        Self {
            store,
            engine,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn engine(&self) -> &DiffEngine {
        &self.engine
    }

    // ----- writing -----

    /// Store version 0 for a newly created record.
    ///
    /// A target has at most one creation version; a second attempt fails
    /// with [`LedgerError::Conflict`].
    pub fn record_creation(&self, record: &Record, author: Option<&RecordRef>) -> LedgerResult<Version> {
        let mut diff = self.engine.compute_creation_diff(record);
        self.engine.prepare(&mut diff)?;
        let mut version = Version::creation(diff, author.cloned())?;
        self.insert(&version).map_err(|err| conflict_or(err, record.reference.clone(), 1))?;
        version.mark_persisted();
        debug!(target_ref = %version.target(), version = %version.id(), "creation version recorded");
        Ok(version)
    }

    /// Store the update from `from` to `to`.
    ///
    /// Returns `Ok(None)` when nothing changed. The target must already have
    /// a creation version.
    pub fn record_update(
        &self,
        from: &Record,
        to: &Record,
        author: Option<&RecordRef>,
    ) -> LedgerResult<Option<Version>> {
        let mut diff = self.engine.compute_diff(Some(from), to)?;
        if diff.is_empty() {
            return Ok(None);
        }
        self.engine.prepare(&mut diff)?;
        self.record_update_diff(diff, author).map(Some)
    }

    /// Store a prepared update diff under the next free number.
    pub fn record_update_diff(&self, diff: Diff, author: Option<&RecordRef>) -> LedgerResult<Version> {
        let target = diff.target().clone();
        let first = self.next_number(&target)?;
        let mut version = Version::update(diff, first, author.cloned())?;

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.insert(&version) {
                Ok(()) => break,
                Err(err) if is_conflict(&err) && attempts <= self.max_conflict_retries => {
                    let next = self.next_number(&target)?;
                    warn!(
                        target_ref = %target,
                        lost = version.number(),
                        retry_with = next,
                        attempt = attempts,
                        "version number taken; retrying"
                    );
                    version.renumber(next);
                }
                Err(err) => return Err(conflict_or(err, target, attempts)),
            }
        }
        version.mark_persisted();
        debug!(
            target_ref = %target,
            number = version.number(),
            entries = version.diff().len(),
            "update version recorded"
        );
        Ok(version)
    }

    /// Record creation when `from` is absent, an update otherwise.
    pub fn record(
        &self,
        from: Option<&Record>,
        to: &Record,
        author: Option<&RecordRef>,
    ) -> LedgerResult<Option<Version>> {
        match from {
            None => self.record_creation(to, author).map(Some),
            Some(from) => self.record_update(from, to, author),
        }
    }

    /// Replace a persisted version's author. Allowed on both variants.
    pub fn reassign_author(&self, version: &mut Version, author: Option<&RecordRef>) -> LedgerResult<()> {
        if !version.is_persisted() {
            return Err(LedgerError::invalid_state(format!(
                "version {} is not persisted",
                version.id()
            )));
        }
        let mut header = version.header();
        header.set_author(author);
        with_transaction(&*self.store, |tx| -> LedgerResult<()> {
            tx.update_version(header)?;
            Ok(())
        })?;
        version.set_author(author.cloned());
        Ok(())
    }

    fn insert(&self, version: &Version) -> LedgerResult<()> {
        let header = version.header();
        let document = version.diff().to_document();
        with_transaction(&*self.store, |tx| -> LedgerResult<()> {
            tx.insert_version(header)?;
            tx.put_diff(document)?;
            Ok(())
        })
    }

    fn next_number(&self, target: &RecordRef) -> LedgerResult<VersionNumber> {
        match self.store.latest_version_number(target)? {
            Some(latest) => Ok(latest + 1),
            None => Err(LedgerError::invalid_state(format!(
                "{target} has no creation version"
            ))),
        }
    }

    // ----- reading -----

    /// Load a persisted version and re-cast its diff through the current
    /// schema.
    pub fn load(&self, id: &VersionId) -> LedgerResult<Version> {
        let header = self
            .store
            .version(id)?
            .ok_or(LedgerError::VersionNotFound(*id))?;
        let document = self
            .store
            .diff(&header.diff_ref)?
            .ok_or(LedgerError::DiffMissing(header.diff_ref))?;
        let schema = self.engine.schema_for(&header.target_kind);
        let diff = Diff::from_document(&document, &schema)?;
        Version::from_parts(header, diff)
    }

    pub fn find(&self, target: &RecordRef, number: VersionNumber) -> LedgerResult<Option<Version>> {
        match self.store.find_version(target, number)? {
            Some(header) => self.load(&header.id).map(Some),
            None => Ok(None),
        }
    }

    pub fn creation_version(&self, target: &RecordRef) -> LedgerResult<Option<Version>> {
        self.find(target, CREATION_VERSION)
    }

    pub fn latest(&self, target: &RecordRef) -> LedgerResult<Option<Version>> {
        match self.store.latest_version_number(target)? {
            Some(number) => self.find(target, number),
            None => Ok(None),
        }
    }

    /// All versions of `target`, ordered by number.
    pub fn versions(&self, target: &RecordRef) -> LedgerResult<Vec<Version>> {
        self.store
            .versions_for(target)?
            .iter()
            .map(|header| self.load(&header.id))
            .collect()
    }

    /// Every stored version, ordered by target kind, target id, and number.
    pub fn all_versions(&self) -> LedgerResult<Vec<Version>> {
        let mut out = Vec::new();
        for target in self.store.targets()? {
            out.extend(self.versions(&target)?);
        }
        Ok(out)
    }

    /// The version immediately before `version`: the old side of its diff.
    pub fn previous(&self, version: &Version) -> LedgerResult<Option<Version>> {
        match version.number().checked_sub(1) {
            Some(number) => self.find(version.target(), number),
            None => Ok(None),
        }
    }
}

impl<S: HistoryStore> VersionLedger<S> {
    /// Old side of attribute or association `name` in `version`.
    pub fn lookup_old(&self, version: &Version, name: &str) -> LedgerResult<HistoricalValue> {
        self.lookup(version, name, Side::Old)
    }

    /// New side of attribute or association `name` in `version`.
    pub fn lookup_new(&self, version: &Version, name: &str) -> LedgerResult<HistoricalValue> {
        self.lookup(version, name, Side::New)
    }

    fn lookup(&self, version: &Version, name: &str, side: Side) -> LedgerResult<HistoricalValue> {
        let schema = self.engine.schema_for(&version.target().kind);
        lookup::lookup(version, &schema, name, side)
    }
}

impl<S> std::fmt::Debug for VersionLedger<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionLedger")
            .field("max_conflict_retries", &self.max_conflict_retries)
            .finish_non_exhaustive()
    }
}

fn is_conflict(err: &LedgerError) -> bool {
    matches!(err, LedgerError::Store(store) if store.is_conflict())
}

fn conflict_or(err: LedgerError, target: RecordRef, attempts: u32) -> LedgerError {
    if is_conflict(&err) {
        LedgerError::Conflict { target, attempts }
    } else {
        err
    }
}
