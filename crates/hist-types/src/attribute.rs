use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type of a record attribute, as reported by the host schema.
///
/// The five built-in types have dedicated diff variants. Anything else is a
/// `Custom` type; it diffs untyped unless a customization registers a
/// variant for it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AttributeType {
    Date,
    Text,
    Timestamp,
    Boolean,
    Integer,
    Custom(String),
}

impl AttributeType {
    /// Parse a host column type name. Common aliases are folded onto the
    /// built-in types (`string` → text, `datetime` → timestamp, …).
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "date" => Self::Date,
            "text" | "string" => Self::Text,
            "timestamp" | "datetime" | "time" => Self::Timestamp,
            "boolean" | "bool" => Self::Boolean,
            "integer" | "int" => Self::Integer,
            _ => Self::Custom(name.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Date => "date",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Custom(name) => name,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl From<String> for AttributeType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<AttributeType> for String {
    fn from(value: AttributeType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Debug for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttributeType({})", self.as_str())
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name and declared type of one attribute of a record kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
}

impl AttributeDescriptor {
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
        }
    }
}
