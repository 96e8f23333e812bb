use std::collections::HashSet;

use hist_store::{DiffType, HistoryStore};
use hist_types::{RecordRef, VersionNumber, CREATION_VERSION};

use crate::error::LedgerResult;

/// Result of validating one target's history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationReport {
    pub target: RecordRef,
    pub version_count: u64,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A specific inconsistency found in stored history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub number: Option<VersionNumber>,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    MissingCreation,
    SequenceGap,
    DuplicateNumber,
    MissingDiff,
    DiffTypeMismatch,
    EmptyUpdate,
    PopulatedCreation,
    NoopEntry,
    TargetMismatch,
}

/// Consistency checks over stored headers and diff documents.
pub struct HistoryValidator;

impl HistoryValidator {
    pub fn validate_target<S: HistoryStore>(store: &S, target: &RecordRef) -> LedgerResult<ValidationReport> {
        let headers = store.versions_for(target)?;
        let mut violations = Vec::new();
        let mut seen = HashSet::new();

        let first = headers.first().map(|h| h.version_number);
        if first.is_some_and(|n| n != CREATION_VERSION) {
            violations.push(Violation {
                number: None,
                kind: ViolationKind::MissingCreation,
                description: format!("{target} has no version 0"),
            });
        }

        let mut expected = first.unwrap_or(CREATION_VERSION);
        for header in &headers {
            let number = header.version_number;
            if !seen.insert(number) {
                violations.push(Violation {
                    number: Some(number),
                    kind: ViolationKind::DuplicateNumber,
                    description: format!("version {number} stored more than once"),
                });
                continue;
            }
            if number != expected {
                violations.push(Violation {
                    number: Some(number),
                    kind: ViolationKind::SequenceGap,
                    description: format!("expected version {expected}, got {number}"),
                });
            }
            expected = number + 1;

            let Some(document) = store.diff(&header.diff_ref)? else {
                violations.push(Violation {
                    number: Some(number),
                    kind: ViolationKind::MissingDiff,
                    description: format!("diff {} is missing", header.diff_ref),
                });
                continue;
            };

            if document.target() != *target {
                violations.push(Violation {
                    number: Some(number),
                    kind: ViolationKind::TargetMismatch,
                    description: format!("diff belongs to {}", document.target()),
                });
            }

            let expected_type = if number == CREATION_VERSION {
                DiffType::Creation
            } else {
                DiffType::Update
            };
            if document.diff_type != expected_type {
                violations.push(Violation {
                    number: Some(number),
                    kind: ViolationKind::DiffTypeMismatch,
                    description: format!("expected a {expected_type} diff, got {}", document.diff_type),
                });
            }

            match document.diff_type {
                DiffType::Update if document.entries.is_empty() => violations.push(Violation {
                    number: Some(number),
                    kind: ViolationKind::EmptyUpdate,
                    description: "update diff has no entries".into(),
                }),
                DiffType::Creation if !document.entries.is_empty() => violations.push(Violation {
                    number: Some(number),
                    kind: ViolationKind::PopulatedCreation,
                    description: format!("creation diff has {} entries", document.entries.len()),
                }),
                _ => {}
            }

            for entry in document.entries.iter().filter(|e| e.old_value == e.new_value) {
                violations.push(Violation {
                    number: Some(number),
                    kind: ViolationKind::NoopEntry,
                    description: format!("entry for '{}' does not change its value", entry.attribute),
                });
            }
        }

        Ok(ValidationReport {
            target: target.clone(),
            version_count: headers.len() as u64,
            violations,
        })
    }

    /// Validate every target in the store.
    pub fn validate_all<S: HistoryStore>(store: &S) -> LedgerResult<Vec<ValidationReport>> {
        let targets = store.targets()?;
        let mut reports = Vec::with_capacity(targets.len());
        for target in &targets {
            reports.push(Self::validate_target(store, target)?);
        }
        Ok(reports)
    }
}
