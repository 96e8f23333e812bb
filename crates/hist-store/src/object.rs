//! Persisted, store-agnostic shapes for version headers and diff documents.

use std::fmt;

use hist_types::{DiffId, RecordId, RecordKind, RecordRef, VersionId, VersionNumber};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// Whether a diff records a record's creation or a later update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffType {
    Creation,
    Update,
}

impl DiffType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creation => "creation",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for DiffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted version row.
///
/// Unique on `(target_kind, target_id, version_number)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionHeader {
    pub id: VersionId,
    pub target_kind: RecordKind,
    pub target_id: RecordId,
    pub author_kind: Option<RecordKind>,
    pub author_id: Option<RecordId>,
    pub version_number: VersionNumber,
    pub diff_ref: DiffId,
}

impl VersionHeader {
    pub fn new(
        id: VersionId,
        target: &RecordRef,
        author: Option<&RecordRef>,
        version_number: VersionNumber,
        diff_ref: DiffId,
    ) -> Self {
        Self {
            id,
            target_kind: target.kind.clone(),
            target_id: target.id.clone(),
            author_kind: author.map(|a| a.kind.clone()),
            author_id: author.map(|a| a.id.clone()),
            version_number,
            diff_ref,
        }
    }

    pub fn target(&self) -> RecordRef {
        RecordRef {
            kind: self.target_kind.clone(),
            id: self.target_id.clone(),
        }
    }

    /// The author reference, present only when both halves are set.
    pub fn author(&self) -> Option<RecordRef> {
        match (&self.author_kind, &self.author_id) {
            (Some(kind), Some(id)) => Some(RecordRef {
                kind: kind.clone(),
                id: id.clone(),
            }),
            _ => None,
        }
    }

    pub fn set_author(&mut self, author: Option<&RecordRef>) {
        self.author_kind = author.map(|a| a.kind.clone());
        self.author_id = author.map(|a| a.id.clone());
    }

    pub fn is_for(&self, target: &RecordRef) -> bool {
        self.target_kind == target.kind && self.target_id == target.id
    }
}

/// One persisted attribute entry inside a [`DiffDocument`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiffEntryDocument {
    pub attribute: String,
    pub attribute_type: String,
    pub old_value: Value,
    pub new_value: Value,
}

/// The persisted form of a diff, as held by the document store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiffDocument {
    pub id: DiffId,
    pub diff_type: DiffType,
    pub target_kind: RecordKind,
    pub target_id: RecordId,
    #[serde(default)]
    pub entries: Vec<DiffEntryDocument>,
}

impl DiffDocument {
    pub fn target(&self) -> RecordRef {
        RecordRef {
            kind: self.target_kind.clone(),
            id: self.target_id.clone(),
        }
    }

    pub fn entry(&self, attribute: &str) -> Option<&DiffEntryDocument> {
        self.entries.iter().find(|e| e.attribute == attribute)
    }

    pub fn to_json(&self) -> StoreResult<String> {
        serde_json::to_string(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> StoreResult<Self> {
        serde_json::from_str(json).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}
