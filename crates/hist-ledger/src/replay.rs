use hist_store::HistoryStore;
use hist_types::{Record, VersionNumber};

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::VersionLedger;
use crate::version::Version;

/// Point-in-time reconstruction of a record from its current snapshot.
///
/// Walks update versions newer than the requested number from newest to
/// oldest, restoring each entry's old value. Version 0 yields the state the
/// record had when it was created.
pub struct HistoryReplay;

impl HistoryReplay {
    pub fn state_at<S: HistoryStore>(
        ledger: &VersionLedger<S>,
        current: &Record,
        number: VersionNumber,
    ) -> LedgerResult<Record> {
        let target = &current.reference;
        let versions = ledger.versions(target)?;
        if !versions.iter().any(|v| v.number() == number) {
            return Err(LedgerError::VersionNumberNotFound {
                target: target.clone(),
                number,
            });
        }

        let mut state = current.clone();
        for version in versions.iter().rev().take_while(|v| v.number() > number) {
            rewind(&mut state, version);
        }
        Ok(state)
    }

    /// Every historical state of the record, oldest first, paired with the
    /// version number that produced it.
    pub fn timeline<S: HistoryStore>(
        ledger: &VersionLedger<S>,
        current: &Record,
    ) -> LedgerResult<Vec<(VersionNumber, Record)>> {
        let versions = ledger.versions(&current.reference)?;
        let mut states = Vec::with_capacity(versions.len());
        let mut state = current.clone();
        for version in versions.iter().rev() {
            states.push((version.number(), state.clone()));
            rewind(&mut state, version);
        }
        states.reverse();
        Ok(states)
    }
}

/// Undo one version's entries. An attribute whose old value is null was
/// unset before the version, so it is removed rather than set to null.
fn rewind(state: &mut Record, version: &Version) {
    for entry in version.diff().entries() {
        if entry.old_value().is_null() {
            state.attributes.remove(entry.attribute());
        } else {
            state.set(entry.attribute(), entry.old_value().to_json());
        }
    }
}
