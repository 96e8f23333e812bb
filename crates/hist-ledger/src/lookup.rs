//! Old/new value lookup by attribute or association name.

use hist_diff::{Accessor, AssociationMacro, DiffSchema, TypedValue};
use hist_types::{RecordId, RecordRef};

use crate::error::{LedgerError, LedgerResult};
use crate::version::Version;

/// Which side of a change to read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Old,
    New,
}

/// Result of a historical lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum HistoricalValue {
    /// The cast value of a plain attribute.
    Value(TypedValue),
    /// The record a `belongs_to` association pointed at, or `None` when its
    /// foreign key was null.
    Reference(Option<RecordRef>),
}

impl HistoricalValue {
    pub fn as_value(&self) -> Option<&TypedValue> {
        match self {
            Self::Value(v) => Some(v),
            Self::Reference(_) => None,
        }
    }

    pub fn as_reference(&self) -> Option<&RecordRef> {
        match self {
            Self::Reference(r) => r.as_ref(),
            Self::Value(_) => None,
        }
    }
}

pub fn lookup_old(version: &Version, schema: &DiffSchema, name: &str) -> LedgerResult<HistoricalValue> {
    lookup(version, schema, name, Side::Old)
}

pub fn lookup_new(version: &Version, schema: &DiffSchema, name: &str) -> LedgerResult<HistoricalValue> {
    lookup(version, schema, name, Side::New)
}

/// Resolve `name` through the schema's accessor table and read one side of
/// the version's diff.
///
/// Associations resolve through their foreign key's entry. Only
/// non-polymorphic `belongs_to` associations are supported.
pub fn lookup(version: &Version, schema: &DiffSchema, name: &str, side: Side) -> LedgerResult<HistoricalValue> {
    let accessor = schema
        .accessor(name)
        .ok_or_else(|| LedgerError::UnknownAttribute {
            kind: schema.record_kind().clone(),
            name: name.to_string(),
        })?;

    match accessor {
        Accessor::Attribute { .. } => changed(version, name, side).map(HistoricalValue::Value),
        Accessor::Association(association) => {
            if association.macro_kind != AssociationMacro::BelongsTo {
                return Err(LedgerError::Unsupported(format!(
                    "'{name}' is not a to-one reference"
                )));
            }
            if association.polymorphic {
                return Err(LedgerError::Unsupported(format!(
                    "'{name}' is polymorphic; its historical target kind is unknown"
                )));
            }
            let kind = association.target.clone().ok_or_else(|| {
                LedgerError::Unsupported(format!("'{name}' declares no target kind"))
            })?;
            let key = changed(version, &association.foreign_key, side)?;
            Ok(HistoricalValue::Reference(
                RecordId::from_value(&key.to_json()).map(|id| RecordRef { kind, id }),
            ))
        }
    }
}

fn changed(version: &Version, attribute: &str, side: Side) -> LedgerResult<TypedValue> {
    let entry = version
        .diff()
        .entry(attribute)
        .ok_or_else(|| LedgerError::AttributeNotChanged {
            version: version.id(),
            attribute: attribute.to_string(),
        })?;
    Ok(match side {
        Side::Old => entry.old_value().clone(),
        Side::New => entry.new_value().clone(),
    })
}
