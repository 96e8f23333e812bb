//! The set of attribute-level changes behind one version.

use hist_store::{DiffDocument, DiffType};
use hist_types::{AttributeType, DiffId, RecordRef, VersionId};

use crate::attribute_diff::TypedAttributeDiff;
use crate::error::{DiffError, DiffResult};
use crate::schema::DiffSchema;
use crate::variant::DiffVariant;

/// Attribute-level changes of one record, unique by attribute name.
///
/// A `creation` diff carries no entries; an `update` diff carries one entry
/// per changed attribute, in the target kind's declaration order. The
/// owning version is a set-once id reference.
#[derive(Clone, Debug, PartialEq)]
pub struct Diff {
    id: DiffId,
    diff_type: DiffType,
    target: RecordRef,
    entries: Vec<TypedAttributeDiff>,
    version: Option<VersionId>,
}

impl Diff {
    pub fn creation(target: RecordRef) -> Self {
        Self::empty(DiffType::Creation, target)
    }

    pub fn update(target: RecordRef) -> Self {
        Self::empty(DiffType::Update, target)
    }

    fn empty(diff_type: DiffType, target: RecordRef) -> Self {
        Self {
            id: DiffId::new(),
            diff_type,
            target,
            entries: Vec::new(),
            version: None,
        }
    }

    pub fn id(&self) -> DiffId {
        self.id
    }

    pub fn diff_type(&self) -> DiffType {
        self.diff_type
    }

    pub fn is_creation(&self) -> bool {
        self.diff_type == DiffType::Creation
    }

    pub fn is_update(&self) -> bool {
        self.diff_type == DiffType::Update
    }

    pub fn target(&self) -> &RecordRef {
        &self.target
    }

    pub fn entries(&self) -> &[TypedAttributeDiff] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.attribute())
    }

    pub fn entry(&self, attribute: &str) -> Option<&TypedAttributeDiff> {
        self.entries.iter().find(|e| e.attribute() == attribute)
    }

    pub fn entry_mut(&mut self, attribute: &str) -> Option<&mut TypedAttributeDiff> {
        self.entries.iter_mut().find(|e| e.attribute() == attribute)
    }

    /// The version this diff belongs to, once attached.
    pub fn new_version(&self) -> Option<VersionId> {
        self.version
    }

    /// Bind this diff to its owning version. Re-attaching to the same
    /// version is a no-op; any other version is rejected.
    pub fn attach_to_version(&mut self, version: VersionId) -> DiffResult<()> {
        match self.version {
            Some(existing) if existing != version => Err(DiffError::AlreadyAttached(existing)),
            _ => {
                self.version = Some(version);
                Ok(())
            }
        }
    }

    /// Append an entry. Fails if the attribute already has one.
    pub fn push(&mut self, mut entry: TypedAttributeDiff) -> DiffResult<()> {
        if self.entry(entry.attribute()).is_some() {
            return Err(DiffError::DuplicateAttribute(entry.attribute().to_string()));
        }
        entry.set_parent(self.id);
        self.entries.push(entry);
        Ok(())
    }

    /// Insert or replace the entry for the entry's attribute, keeping the
    /// position of a replaced entry.
    pub fn upsert(&mut self, mut entry: TypedAttributeDiff) {
        entry.set_parent(self.id);
        match self.entry_mut(entry.attribute()) {
            Some(slot) => *slot = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn remove(&mut self, attribute: &str) -> Option<TypedAttributeDiff> {
        let index = self.entries.iter().position(|e| e.attribute() == attribute)?;
        Some(self.entries.remove(index))
    }

    /// Check the diff is fit to persist.
    pub fn validate(&self) -> DiffResult<()> {
        for entry in &self.entries {
            entry.validate()?;
            if entry.is_noop() {
                return Err(DiffError::validation(format!(
                    "entry for '{}' does not change its value",
                    entry.attribute()
                )));
            }
        }
        match self.diff_type {
            DiffType::Creation if !self.entries.is_empty() => Err(DiffError::validation(
                "a creation diff carries no attribute entries",
            )),
            DiffType::Update if self.entries.is_empty() => {
                Err(DiffError::validation("an update diff needs at least one entry"))
            }
            _ => Ok(()),
        }
    }

    pub fn to_document(&self) -> DiffDocument {
        DiffDocument {
            id: self.id,
            diff_type: self.diff_type,
            target_kind: self.target.kind.clone(),
            target_id: self.target.id.clone(),
            entries: self.entries.iter().map(TypedAttributeDiff::to_document).collect(),
        }
    }

    /// Rebuild a diff from its stored document, re-casting values through
    /// `schema`. Attributes the schema no longer declares fall back to the
    /// type name recorded in the document.
    pub fn from_document(document: &DiffDocument, schema: &DiffSchema) -> DiffResult<Self> {
        let target = document.target();
        if &target.kind != schema.record_kind() {
            return Err(DiffError::validation(format!(
                "document for {target} cannot load through the {} schema",
                schema.record_kind()
            )));
        }
        let mut diff = Self {
            id: document.id,
            diff_type: document.diff_type,
            target,
            entries: Vec::with_capacity(document.entries.len()),
            version: None,
        };
        for stored in &document.entries {
            let entry = if schema.attribute_type(&stored.attribute).is_some() {
                schema.typed_entry(&stored.attribute, &stored.old_value, &stored.new_value)?
            } else {
                let attribute_type = AttributeType::parse(&stored.attribute_type);
                let variant = DiffVariant::for_type(&attribute_type);
                TypedAttributeDiff::typed(
                    stored.attribute.as_str(),
                    attribute_type,
                    variant,
                    &stored.old_value,
                    &stored.new_value,
                )?
            };
            diff.push(entry)?;
        }
        Ok(diff)
    }
}
