//! One attribute's before/after pair, typed through a [`DiffVariant`].

use hist_store::DiffEntryDocument;
use hist_types::{AttributeType, DiffId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DiffError, DiffResult};
use crate::value::TypedValue;
use crate::variant::DiffVariant;

/// A host-detected change to one attribute, as raw values.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub old: Value,
    pub new: Value,
}

impl AttributeChange {
    pub fn new(old: impl Into<Value>, new: impl Into<Value>) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
        }
    }
}

/// Before/after values of one attribute inside a [`crate::Diff`].
///
/// Values are only assignable through the casting setters; reads return
/// the cast value. The owning diff is a non-owning id back-reference.
#[derive(Clone, Debug, PartialEq)]
pub struct TypedAttributeDiff {
    attribute: String,
    attribute_type: Option<AttributeType>,
    variant: DiffVariant,
    old_value: TypedValue,
    new_value: TypedValue,
    parent: Option<DiffId>,
}

impl TypedAttributeDiff {
    /// An entry with no declared type yet. It will not validate until
    /// [`set_attribute_type`](Self::set_attribute_type) is called.
    pub fn new(attribute: impl Into<String>, variant: DiffVariant) -> Self {
        Self {
            attribute: attribute.into(),
            attribute_type: None,
            variant,
            old_value: TypedValue::Null,
            new_value: TypedValue::Null,
            parent: None,
        }
    }

    /// A typed entry with both values cast through `variant`.
    pub fn typed(
        attribute: impl Into<String>,
        attribute_type: AttributeType,
        variant: DiffVariant,
        old: &Value,
        new: &Value,
    ) -> DiffResult<Self> {
        let mut entry = Self::new(attribute, variant);
        entry.set_attribute_type(attribute_type);
        entry.set_old_value(old)?;
        entry.set_new_value(new)?;
        Ok(entry)
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn attribute_type(&self) -> Option<&AttributeType> {
        self.attribute_type.as_ref()
    }

    pub fn set_attribute_type(&mut self, attribute_type: AttributeType) {
        self.attribute_type = Some(attribute_type);
    }

    pub fn variant(&self) -> &DiffVariant {
        &self.variant
    }

    pub fn parent(&self) -> Option<DiffId> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: DiffId) {
        self.parent = Some(parent);
    }

    pub fn old_value(&self) -> &TypedValue {
        &self.old_value
    }

    pub fn new_value(&self) -> &TypedValue {
        &self.new_value
    }

    /// Cast and assign the old value. On mismatch the entry is unchanged.
    pub fn set_old_value(&mut self, raw: &Value) -> DiffResult<()> {
        self.old_value = self.variant.cast(&self.attribute, raw)?;
        Ok(())
    }

    /// Cast and assign the new value. On mismatch the entry is unchanged.
    pub fn set_new_value(&mut self, raw: &Value) -> DiffResult<()> {
        self.new_value = self.variant.cast(&self.attribute, raw)?;
        Ok(())
    }

    /// Fold a change into this entry.
    ///
    /// A fresh entry takes both sides of the change. An existing entry keeps
    /// its earliest old value and takes the latest new value. Both casts run
    /// before anything is assigned.
    pub fn apply_change(&mut self, change: &AttributeChange, fresh: bool) -> DiffResult<()> {
        let new = self.variant.cast(&self.attribute, &change.new)?;
        if fresh {
            self.old_value = self.variant.cast(&self.attribute, &change.old)?;
        }
        self.new_value = new;
        Ok(())
    }

    /// `true` when old and new are equal; such entries are never persisted.
    pub fn is_noop(&self) -> bool {
        self.old_value == self.new_value
    }

    pub fn validate(&self) -> DiffResult<()> {
        if self.attribute.is_empty() {
            return Err(DiffError::validation("attribute name is required"));
        }
        if self.attribute_type.is_none() {
            return Err(DiffError::validation(format!(
                "attribute type is required for '{}'",
                self.attribute
            )));
        }
        Ok(())
    }

    pub fn to_document(&self) -> DiffEntryDocument {
        DiffEntryDocument {
            attribute: self.attribute.clone(),
            attribute_type: self
                .attribute_type
                .as_ref()
                .map(|t| t.as_str().to_string())
                .unwrap_or_default(),
            old_value: self.old_value.to_json(),
            new_value: self.new_value.to_json(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn age(old: Value, new: Value) -> TypedAttributeDiff {
        TypedAttributeDiff::typed("age", AttributeType::Integer, DiffVariant::Integer, &old, &new)
            .unwrap()
    }

    // ------------------------------------------------------------------
    // Casting setters
    // ------------------------------------------------------------------

    #[test]
    fn typed_entry_casts_both_sides() {
        let entry = age(json!("30"), json!(31));
        assert_eq!(entry.old_value(), &TypedValue::Integer(30));
        assert_eq!(entry.new_value(), &TypedValue::Integer(31));
        assert!(!entry.is_noop());
    }

    #[test]
    fn failed_cast_leaves_value_untouched() {
        let mut entry = age(json!(30), json!(31));
        let err = entry.set_new_value(&json!("old")).unwrap_err();
        assert!(matches!(err, DiffError::TypeMismatch { .. }));
        assert_eq!(entry.new_value(), &TypedValue::Integer(31));
    }

    #[test]
    fn typed_rejects_uncastable_value() {
        let result = TypedAttributeDiff::typed(
            "born",
            AttributeType::Date,
            DiffVariant::Date,
            &json!("not a date"),
            &Value::Null,
        );
        assert!(matches!(result, Err(DiffError::TypeMismatch { .. })));
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    #[test]
    fn validation_requires_attribute_type() {
        let mut entry = TypedAttributeDiff::new("nickname", DiffVariant::Text);
        assert!(matches!(entry.validate(), Err(DiffError::ValidationFailed(_))));
        entry.set_attribute_type(AttributeType::Text);
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn validation_requires_attribute_name() {
        let mut entry = TypedAttributeDiff::new("", DiffVariant::Text);
        entry.set_attribute_type(AttributeType::Text);
        assert!(entry.validate().is_err());
    }

    // ------------------------------------------------------------------
    // Change folding
    // ------------------------------------------------------------------

    #[test]
    fn fresh_change_takes_both_sides() {
        let mut entry = TypedAttributeDiff::new("status", DiffVariant::Text);
        entry
            .apply_change(&AttributeChange::new("draft", "review"), true)
            .unwrap();
        assert_eq!(entry.old_value().as_text(), Some("draft"));
        assert_eq!(entry.new_value().as_text(), Some("review"));
    }

    #[test]
    fn existing_entry_keeps_earliest_old() {
        let mut entry = TypedAttributeDiff::new("status", DiffVariant::Text);
        entry
            .apply_change(&AttributeChange::new("draft", "review"), true)
            .unwrap();
        entry
            .apply_change(&AttributeChange::new("review", "draft"), false)
            .unwrap();
        assert_eq!(entry.old_value().as_text(), Some("draft"));
        assert_eq!(entry.new_value().as_text(), Some("draft"));
        assert!(entry.is_noop());
    }

    #[test]
    fn change_with_bad_old_side_is_atomic() {
        let mut entry = age(json!(30), json!(31));
        let err = entry
            .apply_change(&AttributeChange::new("thirty", 40), true)
            .unwrap_err();
        assert!(matches!(err, DiffError::TypeMismatch { .. }));
        assert_eq!(entry.old_value(), &TypedValue::Integer(30));
        assert_eq!(entry.new_value(), &TypedValue::Integer(31));
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    #[test]
    fn document_carries_type_name_and_encoded_values() {
        let doc = age(json!(30), json!(31)).to_document();
        assert_eq!(doc.attribute, "age");
        assert_eq!(doc.attribute_type, "integer");
        assert_eq!(doc.old_value, json!(30));
        assert_eq!(doc.new_value, json!(31));
    }
}
