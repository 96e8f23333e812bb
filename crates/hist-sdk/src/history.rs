use std::sync::Arc;

use hist_diff::{Customizations, Diff, DiffEngine, HostSchema, SchemaBuilder};
use hist_ledger::{
    HistoricalValue, HistoryReplay, HistoryValidator, ValidationReport, Version, VersionLedger,
};
use hist_merge::{merge, ChangeSet, MergeOutcome};
use hist_store::{HistoryStore, InMemoryHistoryStore};
use hist_types::{Record, RecordKind, RecordRef, VersionId, VersionNumber};
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::SdkResult;

/// What [`History::save`] did with an observed save.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing historical changed.
    Unchanged,
    /// A new version was recorded under this number.
    Recorded(VersionNumber),
    /// The changes were folded into the open update version.
    Merged(MergeOutcome),
}

/// Builder for [`History`].
pub struct HistoryBuilder {
    config: EngineConfig,
    host: Arc<dyn HostSchema>,
    customizations: Customizations,
}

impl HistoryBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn customizations(mut self, customizations: Customizations) -> Self {
        self.customizations = customizations;
        self
    }

    /// Register one schema extension for `kind`.
    pub fn customize(
        mut self,
        kind: impl Into<RecordKind>,
        customization: impl Fn(&mut SchemaBuilder) + Send + Sync + 'static,
    ) -> Self {
        self.customizations.register(kind, customization);
        self
    }

    pub fn build<S: HistoryStore>(self, store: S) -> History<S> {
        let engine = Arc::new(
            DiffEngine::new(self.host, self.customizations)
                .with_ignored_attributes(self.config.ignored_attributes.iter().cloned())
                .with_base(self.config.base()),
        );
        let ledger = VersionLedger::new(Arc::new(store), Arc::clone(&engine))
            .with_max_conflict_retries(self.config.max_conflict_retries);
        History {
            config: self.config,
            engine,
            ledger,
        }
    }

    pub fn in_memory(self) -> History<InMemoryHistoryStore> {
        self.build(InMemoryHistoryStore::new())
    }
}

/// High-level record history API.
pub struct History<S = InMemoryHistoryStore> {
    config: EngineConfig,
    engine: Arc<DiffEngine>,
    ledger: VersionLedger<S>,
}

impl History<InMemoryHistoryStore> {
    pub fn builder(host: Arc<dyn HostSchema>) -> HistoryBuilder {
        HistoryBuilder {
            config: EngineConfig::default(),
            host,
            customizations: Customizations::new(),
        }
    }
}

impl<S: HistoryStore> History<S> {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn engine(&self) -> &DiffEngine {
        &self.engine
    }

    pub fn ledger(&self) -> &VersionLedger<S> {
        &self.ledger
    }

    pub fn store(&self) -> &S {
        self.ledger.store()
    }

    // ---- Diffing ----

    pub fn compute_diff(&self, from: Option<&Record>, to: &Record) -> SdkResult<Diff> {
        Ok(self.engine.compute_diff(from, to)?)
    }

    pub fn compute_creation_diff(&self, to: &Record) -> Diff {
        self.engine.compute_creation_diff(to)
    }

    // ---- Recording ----

    pub fn record_creation(&self, record: &Record, author: Option<&RecordRef>) -> SdkResult<Version> {
        Ok(self.ledger.record_creation(record, author)?)
    }

    pub fn record_update(
        &self,
        from: &Record,
        to: &Record,
        author: Option<&RecordRef>,
    ) -> SdkResult<Option<Version>> {
        Ok(self.ledger.record_update(from, to, author)?)
    }

    pub fn merge(
        &self,
        version: &mut Version,
        changes: &ChangeSet,
        author: Option<&RecordRef>,
    ) -> SdkResult<MergeOutcome> {
        Ok(merge(self.ledger.store(), &self.engine, version, changes, author)?)
    }

    /// Route one observed save.
    ///
    /// With no prior snapshot the record is new and gets its creation
    /// version. Otherwise, if `open` holds a persisted update version the
    /// changes to declared, non-ignored attributes are merged into it; if not, a new update version is recorded
    /// and left in `open` for later saves to merge into. A merge that
    /// destroys the open version clears `open`.
    pub fn save(
        &self,
        open: &mut Option<Version>,
        from: Option<&Record>,
        to: &Record,
        author: Option<&RecordRef>,
    ) -> SdkResult<SaveOutcome> {
        let Some(from) = from else {
            let version = self.ledger.record_creation(to, author)?;
            return Ok(SaveOutcome::Recorded(version.number()));
        };

        if let Some(version) = open.as_mut().filter(|v| v.is_persisted() && v.is_update()) {
            let schema = self.engine.schema_for(to.kind());
            let mut changes = ChangeSet::between(from, to);
            changes.retain(|attribute| self.engine.is_tracked(&schema, attribute));
            if changes.is_empty() {
                return Ok(SaveOutcome::Unchanged);
            }
            let outcome = merge(self.ledger.store(), &self.engine, version, &changes, author)?;
            if outcome.is_destroyed() {
                *open = None;
            }
            return Ok(SaveOutcome::Merged(outcome));
        }

        match self.ledger.record_update(from, to, author)? {
            Some(version) => {
                let number = version.number();
                debug!(target_ref = %version.target(), number, "opened update version");
                *open = Some(version);
                Ok(SaveOutcome::Recorded(number))
            }
            None => Ok(SaveOutcome::Unchanged),
        }
    }

    pub fn reassign_author(&self, version: &mut Version, author: Option<&RecordRef>) -> SdkResult<()> {
        Ok(self.ledger.reassign_author(version, author)?)
    }

    // ---- Reading ----

    pub fn load(&self, id: &VersionId) -> SdkResult<Version> {
        Ok(self.ledger.load(id)?)
    }

    pub fn versions(&self, target: &RecordRef) -> SdkResult<Vec<Version>> {
        Ok(self.ledger.versions(target)?)
    }

    pub fn all_versions(&self) -> SdkResult<Vec<Version>> {
        Ok(self.ledger.all_versions()?)
    }

    pub fn previous(&self, version: &Version) -> SdkResult<Option<Version>> {
        Ok(self.ledger.previous(version)?)
    }

    pub fn lookup_old(&self, version: &Version, name: &str) -> SdkResult<HistoricalValue> {
        Ok(self.ledger.lookup_old(version, name)?)
    }

    pub fn lookup_new(&self, version: &Version, name: &str) -> SdkResult<HistoricalValue> {
        Ok(self.ledger.lookup_new(version, name)?)
    }

    pub fn state_at(&self, current: &Record, number: VersionNumber) -> SdkResult<Record> {
        Ok(HistoryReplay::state_at(&self.ledger, current, number)?)
    }

    pub fn timeline(&self, current: &Record) -> SdkResult<Vec<(VersionNumber, Record)>> {
        Ok(HistoryReplay::timeline(&self.ledger, current)?)
    }

    // ---- Validation ----

    pub fn validate(&self, target: &RecordRef) -> SdkResult<ValidationReport> {
        Ok(HistoryValidator::validate_target(self.ledger.store(), target)?)
    }

    pub fn validate_all(&self) -> SdkResult<Vec<ValidationReport>> {
        Ok(HistoryValidator::validate_all(self.ledger.store())?)
    }
}

impl<S> std::fmt::Debug for History<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("History")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
