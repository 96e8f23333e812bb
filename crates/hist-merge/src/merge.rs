use hist_diff::DiffEngine;
use hist_ledger::Version;
use hist_store::{with_transaction, HistoryStore, StoreTx};
use hist_types::RecordRef;
use tracing::{debug, info};

use crate::changes::ChangeSet;
use crate::error::{MergeError, MergeResult};

/// What a successful merge did to the version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The version survives with `entries` changes.
    Updated { entries: usize, author_changed: bool },
    /// Every change reverted; the version and its diff were removed.
    Destroyed,
}

impl MergeOutcome {
    pub fn is_destroyed(&self) -> bool {
        matches!(self, Self::Destroyed)
    }
}

/// Fold `changes` into a persisted update version.
///
/// Only the latest version of a target can be merged into; destroying an
/// earlier one would leave a hole in the numbering. Changes to ignored
/// attributes are skipped. For each remaining attribute the entry keeps its earliest old value and takes the
/// latest new value; an entry whose values end up equal is removed. If no
/// entries remain the version is destroyed, even when `author` differs.
/// Otherwise a differing `author` replaces the stored one.
///
/// Runs in one store transaction. On any error neither the store nor
/// `version` is modified.
pub fn merge<S: HistoryStore>(
    store: &S,
    engine: &DiffEngine,
    version: &mut Version,
    changes: &ChangeSet,
    author: Option<&RecordRef>,
) -> MergeResult<MergeOutcome> {
    if !version.is_persisted() {
        return Err(MergeError::InvalidState(format!(
            "version {} has not been persisted",
            version.id()
        )));
    }
    if version.is_creation() {
        return Err(MergeError::InvalidState(format!(
            "version {} is a creation version",
            version.id()
        )));
    }

    let schema = engine.schema_for(&version.target().kind);
    let mut staged = version.diff().clone();
    for (attribute, change) in changes.iter() {
        if engine.is_ignored(&schema, attribute) {
            continue;
        }
        let fresh = staged.entry(attribute).is_none();
        let mut entry = match staged.entry(attribute) {
            Some(existing) => existing.clone(),
            None => schema.blank_entry(attribute)?,
        };
        entry.apply_change(change, fresh)?;
        if entry.is_noop() {
            staged.remove(attribute);
        } else {
            staged.upsert(entry);
        }
    }

    let destroy = staged.is_empty();
    let new_author = author.filter(|a| version.author() != Some(*a));
    if !destroy {
        engine.prepare(&mut staged)?;
    }

    let mut header = version.header();
    with_transaction(store, |tx| -> MergeResult<()> {
        if tx.version(&header.id)?.is_none() {
            return Err(MergeError::VersionGone(header.id));
        }
        let target = header.target();
        let latest = tx.latest_version_number(&target)?;
        if latest != Some(header.version_number) {
            return Err(MergeError::InvalidState(format!(
                "version {} of {target} is not the latest ({})",
                header.version_number,
                latest.map_or_else(|| "none".to_string(), |n| n.to_string()),
            )));
        }
        if destroy {
            tx.delete_version(&header.id)?;
            tx.delete_diff(&header.diff_ref)?;
            return Ok(());
        }
        tx.put_diff(staged.to_document())?;
        if new_author.is_some() {
            header.set_author(new_author);
            tx.update_version(header.clone())?;
        }
        Ok(())
    })?;

    *version.diff_mut() = staged;
    if destroy {
        version.mark_destroyed();
        info!(
            target_ref = %version.target(),
            number = version.number(),
            "update version destroyed by merge"
        );
        return Ok(MergeOutcome::Destroyed);
    }
    if let Some(author) = new_author {
        version.set_author(Some(author.clone()));
    }
    debug!(
        target_ref = %version.target(),
        number = version.number(),
        merged = changes.len(),
        entries = version.diff().len(),
        "merge applied"
    );
    Ok(MergeOutcome::Updated {
        entries: version.diff().len(),
        author_changed: new_author.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hist_diff::{
        Customizations, DiffError, HostSchema, StaticSchema, TypedValue,
    };
    use hist_ledger::VersionLedger;
    use hist_store::InMemoryHistoryStore;
    use hist_types::{AttributeType, Record};
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    struct Fixture {
        ledger: VersionLedger<InMemoryHistoryStore>,
        engine: Arc<DiffEngine>,
    }

    fn fixture_with(customizations: Customizations) -> Fixture {
        let host: Arc<dyn HostSchema> = Arc::new(
            StaticSchema::new()
                .with_attribute("Doc", "status", AttributeType::Text)
                .with_attribute("Doc", "pages", AttributeType::Integer)
                .with_attribute("Doc", "title", AttributeType::Text),
        );
        let engine = Arc::new(DiffEngine::new(host, customizations));
        let ledger = VersionLedger::new(Arc::new(InMemoryHistoryStore::new()), Arc::clone(&engine));
        Fixture { ledger, engine }
    }

    fn fixture() -> Fixture {
        fixture_with(Customizations::new())
    }

    fn doc(status: &str, pages: i64) -> Record {
        Record::new(RecordRef::new("Doc", 1u64))
            .with("status", status)
            .with("pages", pages)
            .with("title", "Spec")
    }

    impl Fixture {
        /// Versions 0..=3, where version 3 changes only status draft -> review.
        fn version_three(&self) -> Version {
            let states = [doc("draft", 1), doc("draft", 2), doc("draft", 3), doc("review", 3)];
            self.ledger.record_creation(&states[0], None).unwrap();
            let mut last = None;
            for pair in states.windows(2) {
                last = self.ledger.record_update(&pair[0], &pair[1], None).unwrap();
            }
            last.unwrap()
        }

        fn merge(&self, version: &mut Version, changes: &ChangeSet, author: Option<&RecordRef>) -> MergeResult<MergeOutcome> {
            merge(self.ledger.store(), &self.engine, version, changes, author)
        }
    }

    // ------------------------------------------------------------------
    // Collapsing
    // ------------------------------------------------------------------

    #[test]
    fn revert_of_only_entry_destroys_version() {
        let fx = fixture();
        let mut v3 = fx.version_three();
        assert_eq!(v3.number(), 3);

        let changes = ChangeSet::new().with("status", "review", "draft");
        let outcome = fx.merge(&mut v3, &changes, None).unwrap();

        assert_eq!(outcome, MergeOutcome::Destroyed);
        assert!(!v3.is_persisted());
        assert!(v3.diff().is_empty());
        assert!(fx.ledger.find(v3.target(), 3).unwrap().is_none());
        assert!(fx.ledger.store().diff(&v3.diff().id()).unwrap().is_none());
        assert_eq!(fx.ledger.store().version_count().unwrap(), 3);
    }

    #[test]
    fn revert_removes_entry_but_keeps_others() {
        let fx = fixture();
        let mut v3 = fx.version_three();
        let changes = ChangeSet::new()
            .with("status", "review", "draft")
            .with("pages", 3, 4);
        let outcome = fx.merge(&mut v3, &changes, None).unwrap();

        assert_eq!(outcome, MergeOutcome::Updated { entries: 1, author_changed: false });
        assert!(v3.diff().entry("status").is_none());
        let stored = fx.ledger.load(&v3.id()).unwrap();
        assert_eq!(stored.diff().entries(), v3.diff().entries());
        assert_eq!(stored.diff().entry("pages").unwrap().old_value(), &TypedValue::Integer(3));
    }

    #[test]
    fn repeated_changes_keep_earliest_old() {
        let fx = fixture();
        let mut v3 = fx.version_three();
        fx.merge(&mut v3, &ChangeSet::new().with("status", "review", "approved"), None)
            .unwrap();
        fx.merge(&mut v3, &ChangeSet::new().with("status", "approved", "published"), None)
            .unwrap();

        let entry = fx.ledger.load(&v3.id()).unwrap().diff().entry("status").cloned().unwrap();
        assert_eq!(entry.old_value().as_text(), Some("draft"));
        assert_eq!(entry.new_value().as_text(), Some("published"));
    }

    #[test]
    fn new_attribute_takes_both_sides() {
        let fx = fixture();
        let mut v3 = fx.version_three();
        fx.merge(&mut v3, &ChangeSet::new().with("title", "Spec", "Design"), None)
            .unwrap();
        let entry = v3.diff().entry("title").unwrap();
        assert_eq!(entry.old_value().as_text(), Some("Spec"));
        assert_eq!(entry.new_value().as_text(), Some("Design"));
        assert_eq!(entry.parent(), Some(v3.diff().id()));
    }

    #[test]
    fn noop_change_on_new_attribute_adds_nothing() {
        let fx = fixture();
        let mut v3 = fx.version_three();
        let outcome = fx
            .merge(&mut v3, &ChangeSet::new().with("pages", 3, "3"), None)
            .unwrap();
        assert_eq!(outcome, MergeOutcome::Updated { entries: 1, author_changed: false });
        assert!(v3.diff().entry("pages").is_none());
    }

    #[test]
    fn ignored_attributes_are_skipped() {
        let mut customizations = Customizations::new();
        customizations.register("Doc", |b| {
            b.ignore_attribute("title");
        });
        let fx = fixture_with(customizations);
        let mut v3 = fx.version_three();
        let changes = ChangeSet::new()
            .with("status", "review", "draft")
            .with("title", "Spec", "Design")
            .with("updated_at", "2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z");
        let outcome = fx.merge(&mut v3, &changes, None).unwrap();

        assert!(outcome.is_destroyed());
        assert!(fx.ledger.find(v3.target(), 3).unwrap().is_none());
    }

    // ------------------------------------------------------------------
    // Authors
    // ------------------------------------------------------------------

    #[test]
    fn differing_author_is_reassigned() {
        let fx = fixture();
        let mut v3 = fx.version_three();
        let editor = RecordRef::new("User", 5u64);
        let outcome = fx
            .merge(&mut v3, &ChangeSet::new().with("pages", 3, 9), Some(&editor))
            .unwrap();
        assert_eq!(outcome, MergeOutcome::Updated { entries: 2, author_changed: true });
        assert_eq!(v3.author(), Some(&editor));
        assert_eq!(fx.ledger.load(&v3.id()).unwrap().author(), Some(&editor));

        let again = fx
            .merge(&mut v3, &ChangeSet::new().with("pages", 9, 10), Some(&editor))
            .unwrap();
        assert_eq!(again, MergeOutcome::Updated { entries: 2, author_changed: false });
    }

    #[test]
    fn destroy_wins_over_author_change() {
        let fx = fixture();
        let mut v3 = fx.version_three();
        let editor = RecordRef::new("User", 5u64);
        let outcome = fx
            .merge(&mut v3, &ChangeSet::new().with("status", "review", "draft"), Some(&editor))
            .unwrap();
        assert!(outcome.is_destroyed());
        assert!(v3.author().is_none());
    }

    // ------------------------------------------------------------------
    // Preconditions
    // ------------------------------------------------------------------

    #[test]
    fn unsaved_version_is_rejected() {
        let fx = fixture();
        let diff = fx.engine.compute_diff(Some(&doc("a", 1)), &doc("b", 1)).unwrap();
        let mut version = Version::update(diff, 1, None).unwrap();
        let err = fx.merge(&mut version, &ChangeSet::new(), None).unwrap_err();
        assert!(matches!(err, MergeError::InvalidState(_)));
    }

    #[test]
    fn creation_version_is_rejected() {
        let fx = fixture();
        let mut v0 = fx.ledger.record_creation(&doc("a", 1), None).unwrap();
        let err = fx
            .merge(&mut v0, &ChangeSet::new().with("status", "a", "b"), None)
            .unwrap_err();
        assert!(matches!(err, MergeError::InvalidState(_)));
        assert!(matches!(
            hist_ledger::LedgerError::from(err),
            hist_ledger::LedgerError::InvalidState(_)
        ));
    }

    #[test]
    fn only_latest_version_accepts_merges() {
        let fx = fixture();
        let v3 = fx.version_three();
        let mut v2 = fx.ledger.find(v3.target(), 2).unwrap().unwrap();
        let before = v2.clone();

        let err = fx
            .merge(&mut v2, &ChangeSet::new().with("pages", 3, 2), None)
            .unwrap_err();
        assert!(matches!(err, MergeError::InvalidState(_)));
        assert_untouched(&fx, &before, &v2);

        let numbers: Vec<_> = fx
            .ledger
            .versions(v3.target())
            .unwrap()
            .iter()
            .map(Version::number)
            .collect();
        assert_eq!(numbers, [0, 1, 2, 3]);
    }

    #[test]
    fn version_deleted_underneath_is_reported() {
        let fx = fixture();
        let mut v3 = fx.version_three();
        let mut stale = v3.clone();
        fx.merge(&mut v3, &ChangeSet::new().with("status", "review", "draft"), None)
            .unwrap();
        let err = fx
            .merge(&mut stale, &ChangeSet::new().with("pages", 3, 4), None)
            .unwrap_err();
        assert_eq!(err, MergeError::VersionGone(stale.id()));
        assert!(stale.diff().entry("pages").is_none());
    }

    // ------------------------------------------------------------------
    // Rollback
    // ------------------------------------------------------------------

    fn assert_untouched(fx: &Fixture, before: &Version, after: &Version) {
        assert_eq!(before, after);
        let stored = fx.ledger.load(&before.id()).unwrap();
        assert_eq!(stored.diff().entries(), before.diff().entries());
    }

    #[test]
    fn type_mismatch_rolls_back_everything() {
        let fx = fixture();
        let mut v3 = fx.version_three();
        let before = v3.clone();
        let changes = ChangeSet::new()
            .with("status", "review", "draft")
            .with("pages", 3, "many");
        let err = fx.merge(&mut v3, &changes, None).unwrap_err();
        assert!(matches!(err, MergeError::Diff(DiffError::TypeMismatch { .. })));
        assert_untouched(&fx, &before, &v3);
    }

    #[test]
    fn undeclared_attribute_rolls_back() {
        let fx = fixture();
        let mut v3 = fx.version_three();
        let before = v3.clone();
        let changes = ChangeSet::new()
            .with("pages", 3, 4)
            .with("shoe_size", 40, 41);
        let err = fx.merge(&mut v3, &changes, None).unwrap_err();
        assert!(matches!(err, MergeError::Diff(DiffError::ValidationFailed(_))));
        assert_untouched(&fx, &before, &v3);
    }

    #[test]
    fn hook_rejection_rolls_back() {
        let mut customizations = Customizations::new();
        customizations.register("Doc", |b| {
            b.on_validate(|diff| match diff.entry("pages") {
                Some(e) if e.new_value() == &TypedValue::Integer(0) => Err("empty document".into()),
                _ => Ok(()),
            });
        });
        let fx = fixture_with(customizations);
        let mut v3 = fx.version_three();
        let before = v3.clone();
        let err = fx
            .merge(&mut v3, &ChangeSet::new().with("pages", 3, 0), Some(&RecordRef::new("User", 1u64)))
            .unwrap_err();
        assert!(matches!(err, MergeError::Diff(DiffError::ValidationFailed(_))));
        assert_untouched(&fx, &before, &v3);
        assert!(fx.ledger.load(&v3.id()).unwrap().author().is_none());
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    proptest! {
        #[test]
        fn net_revert_always_destroys(path in proptest::collection::vec("[a-d]", 0..6)) {
            let fx = fixture();
            let mut v3 = fx.version_three();
            let mut current = "review".to_string();
            for next in path {
                fx.merge(&mut v3, &ChangeSet::new().with("status", current.as_str(), next.as_str()), None).unwrap();
                current = next;
            }
            let outcome = fx
                .merge(&mut v3, &ChangeSet::new().with("status", current.as_str(), "draft"), None)
                .unwrap();
            prop_assert!(outcome.is_destroyed());
            prop_assert!(fx.ledger.find(&RecordRef::new("Doc", 1u64), 3).unwrap().is_none());
        }
    }

    #[test]
    fn json_changes_merge_like_typed_ones() {
        let fx = fixture();
        let mut v3 = fx.version_three();
        let changes: ChangeSet = serde_json::from_value(json!({
            "pages": {"old": 3, "new": "12"}
        }))
        .unwrap();
        fx.merge(&mut v3, &changes, None).unwrap();
        assert_eq!(v3.diff().entry("pages").unwrap().new_value(), &TypedValue::Integer(12));
    }
}
