//! Specialized diff schemas: one per (record kind, base diff kind).

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use hist_types::{AttributeDescriptor, AttributeType, RecordKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attribute_diff::TypedAttributeDiff;
use crate::diff::Diff;
use crate::error::{DiffError, DiffResult};
use crate::host::AssociationDescriptor;
use crate::variant::DiffVariant;

/// Name of the base schema a specialized schema extends.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaseDiffKind(String);

impl BaseDiffKind {
    pub const MODEL: &'static str = "model";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BaseDiffKind {
    fn default() -> Self {
        Self(Self::MODEL.to_string())
    }
}

impl From<&str> for BaseDiffKind {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Debug for BaseDiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BaseDiffKind({})", self.0)
    }
}

impl fmt::Display for BaseDiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validation callback run against a diff before it is persisted.
pub type DiffHook = Arc<dyn Fn(&mut Diff) -> Result<(), String> + Send + Sync>;

/// Entry of a schema's name lookup table.
#[derive(Clone, Debug, PartialEq)]
pub enum Accessor {
    Attribute {
        attribute_type: AttributeType,
        variant: DiffVariant,
    },
    Association(AssociationDescriptor),
}

/// Closed set of attribute-diff variants for one record kind.
///
/// Built once by [`crate::DiffSchemaPool`] and shared read-only. Every
/// declared attribute and association is resolved into the accessor table
/// at build time.
pub struct DiffSchema {
    record_kind: RecordKind,
    base: BaseDiffKind,
    attributes: Vec<AttributeDescriptor>,
    accessors: HashMap<String, Accessor>,
    ignored: BTreeSet<String>,
    hooks: Vec<DiffHook>,
}

impl DiffSchema {
    pub fn record_kind(&self) -> &RecordKind {
        &self.record_kind
    }

    pub fn base(&self) -> &BaseDiffKind {
        &self.base
    }

    /// Declared attributes in declaration order.
    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    pub fn accessor(&self, name: &str) -> Option<&Accessor> {
        self.accessors.get(name)
    }

    pub fn attribute_type(&self, attribute: &str) -> Option<&AttributeType> {
        match self.accessors.get(attribute)? {
            Accessor::Attribute { attribute_type, .. } => Some(attribute_type),
            Accessor::Association(_) => None,
        }
    }

    pub fn variant_for(&self, attribute: &str) -> Option<&DiffVariant> {
        match self.accessors.get(attribute)? {
            Accessor::Attribute { variant, .. } => Some(variant),
            Accessor::Association(_) => None,
        }
    }

    /// Attributes this schema excludes on top of the engine-wide set.
    pub fn is_ignored(&self, attribute: &str) -> bool {
        self.ignored.contains(attribute)
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// A typed entry for a declared attribute with both sides cast.
    pub fn typed_entry(&self, attribute: &str, old: &Value, new: &Value) -> DiffResult<TypedAttributeDiff> {
        let (attribute_type, variant) = self.declared(attribute)?;
        TypedAttributeDiff::typed(attribute, attribute_type.clone(), variant.clone(), old, new)
    }

    /// A typed entry with both sides null, to be filled by a change.
    pub fn blank_entry(&self, attribute: &str) -> DiffResult<TypedAttributeDiff> {
        let (attribute_type, variant) = self.declared(attribute)?;
        let mut entry = TypedAttributeDiff::new(attribute, variant.clone());
        entry.set_attribute_type(attribute_type.clone());
        Ok(entry)
    }

    /// Run every registered hook in registration order. The first failure
    /// stops the run.
    pub fn run_hooks(&self, diff: &mut Diff) -> DiffResult<()> {
        for hook in &self.hooks {
            hook(diff).map_err(|reason| {
                DiffError::validation(format!("{} hook rejected diff: {reason}", self.record_kind))
            })?;
        }
        Ok(())
    }

    fn declared(&self, attribute: &str) -> DiffResult<(&AttributeType, &DiffVariant)> {
        match self.accessors.get(attribute) {
            Some(Accessor::Attribute { attribute_type, variant }) => Ok((attribute_type, variant)),
            _ => Err(DiffError::validation(format!(
                "{} does not declare attribute '{attribute}'",
                self.record_kind
            ))),
        }
    }
}

impl fmt::Debug for DiffSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiffSchema")
            .field("record_kind", &self.record_kind)
            .field("base", &self.base)
            .field("attributes", &self.attributes.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Mutable schema under construction, handed to customizations.
pub struct SchemaBuilder {
    record_kind: RecordKind,
    base: BaseDiffKind,
    attributes: Vec<AttributeDescriptor>,
    associations: Vec<AssociationDescriptor>,
    type_variants: HashMap<AttributeType, DiffVariant>,
    pinned: HashMap<String, DiffVariant>,
    ignored: BTreeSet<String>,
    hooks: Vec<DiffHook>,
}

impl SchemaBuilder {
    pub fn new(
        record_kind: RecordKind,
        base: BaseDiffKind,
        attributes: Vec<AttributeDescriptor>,
        associations: Vec<AssociationDescriptor>,
    ) -> Self {
        Self {
            record_kind,
            base,
            attributes,
            associations,
            type_variants: HashMap::new(),
            pinned: HashMap::new(),
            ignored: BTreeSet::new(),
            hooks: Vec::new(),
        }
    }

    pub fn record_kind(&self) -> &RecordKind {
        &self.record_kind
    }

    pub fn base(&self) -> &BaseDiffKind {
        &self.base
    }

    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    /// Use `variant` for every attribute declared with `attribute_type`.
    pub fn register_variant(&mut self, attribute_type: AttributeType, variant: DiffVariant) -> &mut Self {
        self.type_variants.insert(attribute_type, variant);
        self
    }

    /// Use `variant` for one attribute regardless of its declared type.
    pub fn pin_variant(&mut self, attribute: impl Into<String>, variant: DiffVariant) -> &mut Self {
        self.pinned.insert(attribute.into(), variant);
        self
    }

    pub fn ignore_attribute(&mut self, attribute: impl Into<String>) -> &mut Self {
        self.ignored.insert(attribute.into());
        self
    }

    /// Declare an attribute the host schema does not report, or redeclare
    /// the type of one it does.
    pub fn declare_attribute(&mut self, name: impl Into<String>, attribute_type: AttributeType) -> &mut Self {
        let name = name.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.attribute_type = attribute_type,
            None => self.attributes.push(AttributeDescriptor::new(name, attribute_type)),
        }
        self
    }

    pub fn declare_association(&mut self, association: AssociationDescriptor) -> &mut Self {
        self.associations.retain(|a| a.name != association.name);
        self.associations.push(association);
        self
    }

    pub fn on_validate(
        &mut self,
        hook: impl Fn(&mut Diff) -> Result<(), String> + Send + Sync + 'static,
    ) -> &mut Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Freeze into a schema. Variant precedence: pinned, then registered
    /// for the type, then the built-in for the type.
    pub(crate) fn build(self) -> DiffSchema {
        let mut accessors = HashMap::with_capacity(self.attributes.len() + self.associations.len());
        for association in &self.associations {
            accessors.insert(association.name.clone(), Accessor::Association(association.clone()));
        }
        for descriptor in &self.attributes {
            let variant = self
                .pinned
                .get(&descriptor.name)
                .or_else(|| self.type_variants.get(&descriptor.attribute_type))
                .cloned()
                .unwrap_or_else(|| DiffVariant::for_type(&descriptor.attribute_type));
            accessors.insert(
                descriptor.name.clone(),
                Accessor::Attribute {
                    attribute_type: descriptor.attribute_type.clone(),
                    variant,
                },
            );
        }
        DiffSchema {
            record_kind: self.record_kind,
            base: self.base,
            attributes: self.attributes,
            accessors,
            ignored: self.ignored,
            hooks: self.hooks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TypedValue;
    use hist_types::RecordRef;
    use serde_json::json;
    use std::sync::Mutex;

    fn builder() -> SchemaBuilder {
        SchemaBuilder::new(
            RecordKind::from("Person"),
            BaseDiffKind::default(),
            vec![
                AttributeDescriptor::new("name", AttributeType::Text),
                AttributeDescriptor::new("age", AttributeType::Integer),
                AttributeDescriptor::new("price", AttributeType::Custom("money".into())),
            ],
            vec![AssociationDescriptor::belongs_to("team", "Team")],
        )
    }

    // ------------------------------------------------------------------
    // Accessor table
    // ------------------------------------------------------------------

    #[test]
    fn builtin_types_get_builtin_variants() {
        let schema = builder().build();
        assert_eq!(schema.variant_for("name"), Some(&DiffVariant::Text));
        assert_eq!(schema.variant_for("age"), Some(&DiffVariant::Integer));
        assert_eq!(schema.variant_for("price"), Some(&DiffVariant::Untyped));
        assert!(schema.variant_for("missing").is_none());
    }

    #[test]
    fn associations_are_in_the_table() {
        let schema = builder().build();
        assert!(matches!(schema.accessor("team"), Some(Accessor::Association(_))));
        assert!(schema.attribute_type("team").is_none());
    }

    #[test]
    fn registered_variant_applies_to_custom_type() {
        let mut b = builder();
        b.register_variant(
            AttributeType::Custom("money".into()),
            DiffVariant::custom("money", |v| Ok(v.clone())),
        );
        let schema = b.build();
        assert_eq!(schema.variant_for("price").map(|v| v.name()), Some("money"));
    }

    #[test]
    fn pinned_variant_beats_type_variant() {
        let mut b = builder();
        b.register_variant(AttributeType::Integer, DiffVariant::Text)
            .pin_variant("age", DiffVariant::Untyped);
        let schema = b.build();
        assert_eq!(schema.variant_for("age"), Some(&DiffVariant::Untyped));
    }

    #[test]
    fn declared_attribute_is_appended_or_retyped() {
        let mut b = builder();
        b.declare_attribute("nickname", AttributeType::Text)
            .declare_attribute("age", AttributeType::Text);
        let schema = b.build();
        let names: Vec<_> = schema.attributes().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["name", "age", "price", "nickname"]);
        assert_eq!(schema.attribute_type("age"), Some(&AttributeType::Text));
    }

    // ------------------------------------------------------------------
    // Entries
    // ------------------------------------------------------------------

    #[test]
    fn typed_entry_for_declared_attribute() {
        let schema = builder().build();
        let entry = schema.typed_entry("age", &json!(30), &json!(31)).unwrap();
        assert_eq!(entry.new_value(), &TypedValue::Integer(31));
        assert_eq!(entry.attribute_type(), Some(&AttributeType::Integer));
    }

    #[test]
    fn undeclared_attribute_fails_validation() {
        let schema = builder().build();
        assert!(matches!(
            schema.blank_entry("shoe_size"),
            Err(DiffError::ValidationFailed(_))
        ));
        assert!(schema.typed_entry("team", &json!(1), &json!(2)).is_err());
    }

    // ------------------------------------------------------------------
    // Hooks
    // ------------------------------------------------------------------

    #[test]
    fn hooks_run_in_registration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut b = builder();
        for id in 1..=4 {
            let calls = Arc::clone(&calls);
            b.on_validate(move |_| {
                calls.lock().unwrap().push(id);
                if id == 3 {
                    Err(format!("hook {id} rejected"))
                } else {
                    Ok(())
                }
            });
        }
        let schema = b.build();
        assert_eq!(schema.hook_count(), 4);

        let mut diff = Diff::update(RecordRef::new("Person", 1u64));
        let err = schema.run_hooks(&mut diff).unwrap_err();
        match err {
            DiffError::ValidationFailed(msg) => assert!(msg.contains("hook 3")),
            other => panic!("expected ValidationFailed, got {other:?}"),
        }
        assert_eq!(*calls.lock().unwrap(), [1, 2, 3]);
    }

    #[test]
    fn ignored_attributes_are_schema_local() {
        let mut b = builder();
        b.ignore_attribute("age");
        let schema = b.build();
        assert!(schema.is_ignored("age"));
        assert!(!schema.is_ignored("name"));
    }
}
