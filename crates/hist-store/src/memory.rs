//! In-memory history store for tests and embedding.
//!
//! [`InMemoryHistoryStore`] keeps committed state behind a `RwLock`.
//! Transactions are optimistic: an [`InMemoryTx`] buffers its writes locally
//! and only takes the write lock at commit, where uniqueness of
//! `(target, version_number)` is re-validated before anything is applied.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use hist_types::{DiffId, RecordRef, VersionId, VersionNumber};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::{DiffDocument, VersionHeader};
use crate::traits::{HistoryStore, StoreTx};

#[derive(Default)]
struct StoreState {
    versions: HashMap<VersionId, VersionHeader>,
    by_target: BTreeMap<RecordRef, BTreeMap<VersionNumber, VersionId>>,
    diffs: HashMap<DiffId, DiffDocument>,
}

impl StoreState {
    fn slot(&self, target: &RecordRef, number: VersionNumber) -> Option<VersionId> {
        self.by_target
            .get(target)
            .and_then(|numbers| numbers.get(&number))
            .copied()
    }

    fn remove_version(&mut self, id: &VersionId) -> Option<VersionHeader> {
        let header = self.versions.remove(id)?;
        let target = header.target();
        if let Some(numbers) = self.by_target.get_mut(&target) {
            numbers.remove(&header.version_number);
            if numbers.is_empty() {
                self.by_target.remove(&target);
            }
        }
        Some(header)
    }

    fn put_version(&mut self, header: VersionHeader) {
        self.remove_version(&header.id);
        self.by_target
            .entry(header.target())
            .or_default()
            .insert(header.version_number, header.id);
        self.versions.insert(header.id, header);
    }
}

/// In-memory, `HashMap`-based history store.
///
/// Committed state lives behind a `RwLock`; data is lost when the store is
/// dropped.
pub struct InMemoryHistoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryHistoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Number of committed version headers.
    pub fn version_count(&self) -> StoreResult<usize> {
        Ok(self.read_state()?.versions.len())
    }

    /// Number of committed diff documents.
    pub fn diff_count(&self) -> StoreResult<usize> {
        Ok(self.read_state()?.diffs.len())
    }

    fn read_state(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write_state(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryHistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (versions, diffs) = match self.state.read() {
            Ok(state) => (state.versions.len(), state.diffs.len()),
            Err(_) => (0, 0),
        };
        f.debug_struct("InMemoryHistoryStore")
            .field("version_count", &versions)
            .field("diff_count", &diffs)
            .finish()
    }
}

impl HistoryStore for InMemoryHistoryStore {
    type Tx<'a> = InMemoryTx<'a>;

    fn begin(&self) -> StoreResult<InMemoryTx<'_>> {
        Ok(InMemoryTx {
            store: self,
            versions: HashMap::new(),
            inserted: HashSet::new(),
            diffs: HashMap::new(),
        })
    }

    fn version(&self, id: &VersionId) -> StoreResult<Option<VersionHeader>> {
        Ok(self.read_state()?.versions.get(id).cloned())
    }

    fn find_version(
        &self,
        target: &RecordRef,
        number: VersionNumber,
    ) -> StoreResult<Option<VersionHeader>> {
        let state = self.read_state()?;
        Ok(state
            .slot(target, number)
            .and_then(|id| state.versions.get(&id))
            .cloned())
    }

    fn versions_for(&self, target: &RecordRef) -> StoreResult<Vec<VersionHeader>> {
        let state = self.read_state()?;
        Ok(state
            .by_target
            .get(target)
            .into_iter()
            .flat_map(|numbers| numbers.values())
            .filter_map(|id| state.versions.get(id))
            .cloned()
            .collect())
    }

    fn targets(&self) -> StoreResult<Vec<RecordRef>> {
        Ok(self.read_state()?.by_target.keys().cloned().collect())
    }

    fn diff(&self, id: &DiffId) -> StoreResult<Option<DiffDocument>> {
        Ok(self.read_state()?.diffs.get(id).cloned())
    }

    fn latest_version_number(&self, target: &RecordRef) -> StoreResult<Option<VersionNumber>> {
        Ok(self
            .read_state()?
            .by_target
            .get(target)
            .and_then(|numbers| numbers.keys().next_back())
            .copied())
    }
}

/// Optimistic transaction over an [`InMemoryHistoryStore`].
///
/// Staged entries map to `Some(value)` for writes and `None` for deletes.
pub struct InMemoryTx<'a> {
    store: &'a InMemoryHistoryStore,
    versions: HashMap<VersionId, Option<VersionHeader>>,
    inserted: HashSet<VersionId>,
    diffs: HashMap<DiffId, Option<DiffDocument>>,
}

impl InMemoryTx<'_> {
    /// Number of staged writes (inserts, updates and deletes).
    pub fn staged_len(&self) -> usize {
        self.versions.len() + self.diffs.len()
    }

    /// Headers of `target` as seen from inside this transaction.
    fn visible_versions(&self, target: &RecordRef) -> StoreResult<Vec<VersionHeader>> {
        let mut visible: HashMap<VersionId, VersionHeader> = self
            .store
            .versions_for(target)?
            .into_iter()
            .map(|h| (h.id, h))
            .collect();
        for (id, staged) in &self.versions {
            match staged {
                Some(header) if header.is_for(target) => {
                    visible.insert(*id, header.clone());
                }
                _ => {
                    visible.remove(id);
                }
            }
        }
        Ok(visible.into_values().collect())
    }

    fn slot_taken(&self, header: &VersionHeader) -> StoreResult<bool> {
        Ok(self
            .visible_versions(&header.target())?
            .iter()
            .any(|h| h.version_number == header.version_number && h.id != header.id))
    }
}

impl StoreTx for InMemoryTx<'_> {
    fn version(&self, id: &VersionId) -> StoreResult<Option<VersionHeader>> {
        match self.versions.get(id) {
            Some(staged) => Ok(staged.clone()),
            None => self.store.version(id),
        }
    }

    fn latest_version_number(&self, target: &RecordRef) -> StoreResult<Option<VersionNumber>> {
        Ok(self
            .visible_versions(target)?
            .iter()
            .map(|h| h.version_number)
            .max())
    }

    fn insert_version(&mut self, header: VersionHeader) -> StoreResult<()> {
        if self.version(&header.id)?.is_some() {
            return Err(StoreError::DuplicateVersion(header.id));
        }
        if self.slot_taken(&header)? {
            return Err(StoreError::Conflict {
                target: header.target(),
                number: header.version_number,
            });
        }
        self.inserted.insert(header.id);
        self.versions.insert(header.id, Some(header));
        Ok(())
    }

    fn update_version(&mut self, header: VersionHeader) -> StoreResult<()> {
        if self.version(&header.id)?.is_none() {
            return Err(StoreError::VersionNotFound(header.id));
        }
        if self.slot_taken(&header)? {
            return Err(StoreError::Conflict {
                target: header.target(),
                number: header.version_number,
            });
        }
        self.versions.insert(header.id, Some(header));
        Ok(())
    }

    fn delete_version(&mut self, id: &VersionId) -> StoreResult<bool> {
        let existed = self.version(id)?.is_some();
        if existed {
            self.versions.insert(*id, None);
        }
        Ok(existed)
    }

    fn diff(&self, id: &DiffId) -> StoreResult<Option<DiffDocument>> {
        match self.diffs.get(id) {
            Some(staged) => Ok(staged.clone()),
            None => self.store.diff(id),
        }
    }

    fn put_diff(&mut self, document: DiffDocument) -> StoreResult<()> {
        self.diffs.insert(document.id, Some(document));
        Ok(())
    }

    fn delete_diff(&mut self, id: &DiffId) -> StoreResult<bool> {
        let existed = self.diff(id)?.is_some();
        if existed {
            self.diffs.insert(*id, None);
        }
        Ok(existed)
    }

    fn commit(self) -> StoreResult<()> {
        let mut state = self.store.write_state()?;

        // Validate everything before touching committed state.
        for (id, staged) in &self.versions {
            let Some(header) = staged else { continue };
            let is_insert = self.inserted.contains(id);
            if is_insert && state.versions.contains_key(id) {
                return Err(StoreError::DuplicateVersion(*id));
            }
            if !is_insert && !state.versions.contains_key(id) {
                return Err(StoreError::VersionNotFound(*id));
            }
            if let Some(holder) = state.slot(&header.target(), header.version_number) {
                let holder_leaves = matches!(self.versions.get(&holder), Some(None));
                if holder != *id && !holder_leaves {
                    return Err(StoreError::Conflict {
                        target: header.target(),
                        number: header.version_number,
                    });
                }
            }
        }

        for (id, staged) in &self.diffs {
            if staged.is_none() {
                continue;
            }
            let staged_owner = self.versions.values().flatten().any(|h| h.diff_ref == *id);
            let committed_owner = state.versions.values().any(|h| {
                h.diff_ref == *id && !matches!(self.versions.get(&h.id), Some(None))
            });
            if !staged_owner && !committed_owner {
                return Err(StoreError::OrphanDiff(*id));
            }
        }

        let mut applied = 0usize;
        for (id, staged) in &self.versions {
            if staged.is_none() {
                state.remove_version(id);
                applied += 1;
            }
        }
        for staged in self.versions.into_values().flatten() {
            state.put_version(staged);
            applied += 1;
        }
        for (id, staged) in self.diffs {
            match staged {
                Some(document) => {
                    state.diffs.insert(id, document);
                }
                None => {
                    state.diffs.remove(&id);
                }
            }
            applied += 1;
        }

        debug!(writes = applied, "history store transaction committed");
        Ok(())
    }
}
