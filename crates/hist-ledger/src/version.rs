//! Versions: numbered points in a record's history, each owning a diff.

use std::fmt;

use hist_diff::Diff;
use hist_store::VersionHeader;
use hist_types::{RecordRef, VersionId, VersionNumber, CREATION_VERSION};

use crate::error::{LedgerError, LedgerResult};

/// The two version lifecycles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VersionKind {
    /// Version 0, written once when the record is created.
    Creation,
    /// Any later version; open to merges until finalized by the host.
    Update,
}

impl fmt::Display for VersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creation => f.write_str("creation"),
            Self::Update => f.write_str("update"),
        }
    }
}

/// One version of one record, with its diff.
///
/// The version exclusively owns its diff; the diff refers back to the
/// version by id only.
#[derive(Clone, Debug, PartialEq)]
pub struct Version {
    id: VersionId,
    target: RecordRef,
    author: Option<RecordRef>,
    number: VersionNumber,
    diff: Diff,
    persisted: bool,
}

impl Version {
    /// A new, unsaved creation version around a creation diff.
    pub fn creation(diff: Diff, author: Option<RecordRef>) -> LedgerResult<Self> {
        if !diff.is_creation() {
            return Err(LedgerError::invalid_state(
                "a creation version needs a creation diff",
            ));
        }
        Self::assemble(VersionId::new(), diff, author, CREATION_VERSION, false)
    }

    /// A new, unsaved update version around an update diff.
    pub fn update(diff: Diff, number: VersionNumber, author: Option<RecordRef>) -> LedgerResult<Self> {
        if !diff.is_update() {
            return Err(LedgerError::invalid_state("an update version needs an update diff"));
        }
        if number == CREATION_VERSION {
            return Err(LedgerError::invalid_state("update versions are numbered from 1"));
        }
        Self::assemble(VersionId::new(), diff, author, number, false)
    }

    /// Reassemble a persisted version from its stored header and loaded diff.
    pub fn from_parts(header: VersionHeader, diff: Diff) -> LedgerResult<Self> {
        if header.diff_ref != diff.id() {
            return Err(LedgerError::invalid_state(format!(
                "version {} references diff {}, got {}",
                header.id,
                header.diff_ref,
                diff.id()
            )));
        }
        let creation_number = header.version_number == CREATION_VERSION;
        if creation_number != diff.is_creation() {
            return Err(LedgerError::invalid_state(format!(
                "version {} is numbered {} but holds a {} diff",
                header.id,
                header.version_number,
                diff.diff_type()
            )));
        }
        let author = header.author();
        Self::assemble(header.id, diff, author, header.version_number, true)
    }

    fn assemble(
        id: VersionId,
        mut diff: Diff,
        author: Option<RecordRef>,
        number: VersionNumber,
        persisted: bool,
    ) -> LedgerResult<Self> {
        diff.attach_to_version(id)?;
        Ok(Self {
            id,
            target: diff.target().clone(),
            author,
            number,
            diff,
            persisted,
        })
    }

    pub fn id(&self) -> VersionId {
        self.id
    }

    pub fn target(&self) -> &RecordRef {
        &self.target
    }

    pub fn author(&self) -> Option<&RecordRef> {
        self.author.as_ref()
    }

    pub fn set_author(&mut self, author: Option<RecordRef>) {
        self.author = author;
    }

    pub fn number(&self) -> VersionNumber {
        self.number
    }

    pub(crate) fn renumber(&mut self, number: VersionNumber) {
        self.number = number;
    }

    pub fn kind(&self) -> VersionKind {
        if self.number == CREATION_VERSION {
            VersionKind::Creation
        } else {
            VersionKind::Update
        }
    }

    pub fn is_creation(&self) -> bool {
        self.kind() == VersionKind::Creation
    }

    pub fn is_update(&self) -> bool {
        self.kind() == VersionKind::Update
    }

    pub fn diff(&self) -> &Diff {
        &self.diff
    }

    pub fn diff_mut(&mut self) -> &mut Diff {
        &mut self.diff
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub fn mark_persisted(&mut self) {
        self.persisted = true;
    }

    /// Called once the stored rows are gone.
    pub fn mark_destroyed(&mut self) {
        self.persisted = false;
    }

    pub fn header(&self) -> VersionHeader {
        VersionHeader::new(
            self.id,
            &self.target,
            self.author.as_ref(),
            self.number,
            self.diff.id(),
        )
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v{} ({}, {} change(s))",
            self.target,
            self.number,
            self.kind(),
            self.diff.len()
        )
    }
}
