//! The host application's schema, as seen by the engine.

use std::collections::BTreeMap;

use hist_types::{AttributeDescriptor, AttributeType, RecordKind};
use serde::{Deserialize, Serialize};

/// Schema lookup supplied by the host.
///
/// `attributes` lists every attribute declared on a kind, in declaration
/// order. Diff entries follow that order.
pub trait HostSchema: Send + Sync {
    fn attributes(&self, kind: &RecordKind) -> Vec<AttributeDescriptor>;

    fn attribute_type(&self, kind: &RecordKind, attribute: &str) -> Option<AttributeType> {
        self.attributes(kind)
            .into_iter()
            .find(|a| a.name == attribute)
            .map(|a| a.attribute_type)
    }

    /// Associations declared on `kind`. Hosts without associations keep the
    /// default.
    fn associations(&self, _kind: &RecordKind) -> Vec<AssociationDescriptor> {
        Vec::new()
    }

    fn association(&self, kind: &RecordKind, name: &str) -> Option<AssociationDescriptor> {
        self.associations(kind).into_iter().find(|a| a.name == name)
    }
}

/// How an association is declared on the host side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationMacro {
    BelongsTo,
    HasOne,
    HasMany,
}

/// A reference from one record kind to another.
///
/// Only non-polymorphic `belongs_to` associations have a resolvable
/// historical target: their foreign key is an attribute whose old and new
/// values identify the referenced record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationDescriptor {
    pub name: String,
    #[serde(rename = "macro")]
    pub macro_kind: AssociationMacro,
    pub foreign_key: String,
    #[serde(default)]
    pub target: Option<RecordKind>,
    #[serde(default)]
    pub polymorphic: bool,
}

impl AssociationDescriptor {
    /// A `belongs_to` with the conventional `<name>_id` foreign key.
    pub fn belongs_to(name: impl Into<String>, target: impl Into<RecordKind>) -> Self {
        let name = name.into();
        Self {
            foreign_key: format!("{name}_id"),
            name,
            macro_kind: AssociationMacro::BelongsTo,
            target: Some(target.into()),
            polymorphic: false,
        }
    }

    /// A polymorphic `belongs_to`; its target kind lives in `<name>_type`.
    pub fn polymorphic(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            foreign_key: format!("{name}_id"),
            name,
            macro_kind: AssociationMacro::BelongsTo,
            target: None,
            polymorphic: true,
        }
    }

    pub fn with_foreign_key(mut self, foreign_key: impl Into<String>) -> Self {
        self.foreign_key = foreign_key.into();
        self
    }

    pub fn has_many(name: impl Into<String>, target: impl Into<RecordKind>) -> Self {
        let name = name.into();
        Self {
            foreign_key: String::new(),
            name,
            macro_kind: AssociationMacro::HasMany,
            target: Some(target.into()),
            polymorphic: false,
        }
    }
}

/// Declared attributes and associations of one record kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSchema {
    #[serde(default)]
    pub attributes: Vec<AttributeDescriptor>,
    #[serde(default)]
    pub associations: Vec<AssociationDescriptor>,
}

/// A [`HostSchema`] backed by a fixed table, loadable from TOML or JSON.
///
/// ```toml
/// [kinds.Person]
/// attributes = [
///     { name = "name", type = "text" },
///     { name = "team_id", type = "integer" },
/// ]
/// associations = [
///     { name = "team", macro = "belongs_to", foreign_key = "team_id", target = "Team" },
/// ]
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticSchema {
    #[serde(default)]
    pub kinds: BTreeMap<RecordKind, KindSchema>,
}

impl StaticSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(
        mut self,
        kind: impl Into<RecordKind>,
        name: impl Into<String>,
        attribute_type: AttributeType,
    ) -> Self {
        self.kinds
            .entry(kind.into())
            .or_default()
            .attributes
            .push(AttributeDescriptor::new(name, attribute_type));
        self
    }

    pub fn with_association(
        mut self,
        kind: impl Into<RecordKind>,
        association: AssociationDescriptor,
    ) -> Self {
        self.kinds
            .entry(kind.into())
            .or_default()
            .associations
            .push(association);
        self
    }

    pub fn kind(&self, kind: &RecordKind) -> Option<&KindSchema> {
        self.kinds.get(kind)
    }
}

impl HostSchema for StaticSchema {
    fn attributes(&self, kind: &RecordKind) -> Vec<AttributeDescriptor> {
        self.kinds
            .get(kind)
            .map(|k| k.attributes.clone())
            .unwrap_or_default()
    }

    fn attribute_type(&self, kind: &RecordKind, attribute: &str) -> Option<AttributeType> {
        self.kinds
            .get(kind)?
            .attributes
            .iter()
            .find(|a| a.name == attribute)
            .map(|a| a.attribute_type.clone())
    }

    fn associations(&self, kind: &RecordKind) -> Vec<AssociationDescriptor> {
        self.kinds
            .get(kind)
            .map(|k| k.associations.clone())
            .unwrap_or_default()
    }

    fn association(&self, kind: &RecordKind, name: &str) -> Option<AssociationDescriptor> {
        self.kinds
            .get(kind)?
            .associations
            .iter()
            .find(|a| a.name == name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> RecordKind {
        RecordKind::from("Person")
    }

    #[test]
    fn static_schema_preserves_declaration_order() {
        let schema = StaticSchema::new()
            .with_attribute("Person", "name", AttributeType::Text)
            .with_attribute("Person", "age", AttributeType::Integer);
        let names: Vec<_> = schema
            .attributes(&person())
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, ["name", "age"]);
    }

    #[test]
    fn unknown_kind_has_no_attributes() {
        let schema = StaticSchema::new();
        assert!(schema.attributes(&person()).is_empty());
        assert!(schema.attribute_type(&person(), "name").is_none());
    }

    #[test]
    fn attribute_type_lookup() {
        let schema = StaticSchema::new().with_attribute("Person", "born", AttributeType::Date);
        assert_eq!(schema.attribute_type(&person(), "born"), Some(AttributeType::Date));
        assert_eq!(schema.attribute_type(&person(), "age"), None);
    }

    #[test]
    fn belongs_to_uses_conventional_foreign_key() {
        let team = AssociationDescriptor::belongs_to("team", "Team");
        assert_eq!(team.foreign_key, "team_id");
        assert_eq!(team.macro_kind, AssociationMacro::BelongsTo);
        assert!(!team.polymorphic);
        assert!(AssociationDescriptor::polymorphic("owner").polymorphic);
    }

    #[test]
    fn schema_loads_from_toml() {
        let source = r#"
            [kinds.Person]
            attributes = [
                { name = "name", type = "string" },
                { name = "team_id", type = "integer" },
            ]
            associations = [
                { name = "team", macro = "belongs_to", foreign_key = "team_id", target = "Team" },
                { name = "owner", macro = "belongs_to", foreign_key = "owner_id", polymorphic = true },
            ]
        "#;
        let schema: StaticSchema = toml::from_str(source).unwrap();
        assert_eq!(schema.attribute_type(&person(), "name"), Some(AttributeType::Text));
        let team = schema.association(&person(), "team").unwrap();
        assert_eq!(team.target, Some(RecordKind::from("Team")));
        assert!(schema.association(&person(), "owner").unwrap().polymorphic);
        assert!(schema.association(&person(), "friends").is_none());
    }
}
