//! Cast attribute values held by typed attribute diffs.

use std::fmt;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::Value;

/// An attribute value after casting through a [`crate::DiffVariant`].
///
/// `Untyped` carries values of attributes whose declared type has no
/// dedicated variant, and the normalized output of custom variants.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum TypedValue {
    #[default]
    Null,
    Date(NaiveDate),
    Text(String),
    Timestamp(DateTime<Utc>),
    Boolean(bool),
    Integer(i64),
    Untyped(Value),
}

impl TypedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Encode as a JSON scalar for storage.
    ///
    /// Dates become `YYYY-MM-DD`, timestamps RFC 3339 in UTC with
    /// millisecond precision.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            Self::Text(s) => Value::String(s.clone()),
            Self::Timestamp(t) => Value::String(t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Self::Boolean(b) => Value::Bool(*b),
            Self::Integer(i) => Value::from(*i),
            Self::Untyped(v) => v.clone(),
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Text(s) => write!(f, "{s:?}"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}
