//! Attribute-diff variants: one casting rule per attribute type.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, TimeZone, Utc};
use hist_types::AttributeType;
use serde_json::Value;

use crate::error::{DiffError, DiffResult};
use crate::value::TypedValue;

/// Host-supplied casting function for a custom variant.
///
/// Receives a non-null raw value and returns its normalized form, or a
/// description of why it cannot be represented.
pub type CastFn = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

/// The casting rule applied to an attribute's old and new values.
///
/// Five built-in variants match the built-in attribute types. `Untyped` is
/// the fallback for declared types without a variant and performs no
/// casting. `Custom` variants are registered by schema customizations.
#[derive(Clone)]
pub enum DiffVariant {
    Date,
    Text,
    Timestamp,
    Boolean,
    Integer,
    Untyped,
    Custom { name: String, cast: CastFn },
}

impl DiffVariant {
    /// The built-in variant whose backing type matches `attribute_type`.
    pub fn for_type(attribute_type: &AttributeType) -> Self {
        match attribute_type {
            AttributeType::Date => Self::Date,
            AttributeType::Text => Self::Text,
            AttributeType::Timestamp => Self::Timestamp,
            AttributeType::Boolean => Self::Boolean,
            AttributeType::Integer => Self::Integer,
            AttributeType::Custom(_) => Self::Untyped,
        }
    }

    /// A custom variant backed by `cast`.
    pub fn custom(
        name: impl Into<String>,
        cast: impl Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        Self::Custom {
            name: name.into(),
            cast: Arc::new(cast),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Date => "date",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Untyped => "untyped",
            Self::Custom { name, .. } => name,
        }
    }

    /// Cast `raw` into this variant's native representation.
    ///
    /// `null` is accepted by every variant.
    pub fn cast(&self, attribute: &str, raw: &Value) -> DiffResult<TypedValue> {
        if raw.is_null() {
            return Ok(TypedValue::Null);
        }
        let cast = match self {
            Self::Date => cast_date(raw).map(TypedValue::Date),
            Self::Text => cast_text(raw).map(TypedValue::Text),
            Self::Timestamp => cast_timestamp(raw).map(TypedValue::Timestamp),
            Self::Boolean => cast_bool(raw).map(TypedValue::Boolean),
            Self::Integer => cast_integer(raw).map(TypedValue::Integer),
            Self::Untyped => Some(TypedValue::Untyped(raw.clone())),
            Self::Custom { cast, .. } => {
                return cast(raw)
                    .map(TypedValue::Untyped)
                    .map_err(|reason| DiffError::TypeMismatch {
                        attribute: attribute.to_string(),
                        expected: self.name().to_string(),
                        found: format!("{raw} ({reason})"),
                    });
            }
        };
        cast.ok_or_else(|| DiffError::TypeMismatch {
            attribute: attribute.to_string(),
            expected: self.name().to_string(),
            found: raw.to_string(),
        })
    }
}

impl PartialEq for DiffVariant {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl fmt::Debug for DiffVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DiffVariant({})", self.name())
    }
}

fn cast_date(raw: &Value) -> Option<NaiveDate> {
    let s = raw.as_str()?.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|t| t.date_naive()))
}

/// Timestamps are kept at millisecond precision, the precision they are
/// stored with.
fn cast_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    let parsed = match raw {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                        .ok()
                        .map(|naive| naive.and_utc())
                })
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    };
    parsed.map(|t| t.trunc_subsecs(3))
}

fn cast_bool(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Some(true),
            "false" | "f" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn cast_integer(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64().or_else(|| {
            let f = n.as_f64()?;
            (f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64).then_some(f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn cast_text(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mismatch(result: DiffResult<TypedValue>) -> bool {
        matches!(result, Err(DiffError::TypeMismatch { .. }))
    }

    #[test]
    fn for_type_selects_builtin_variants() {
        assert_eq!(DiffVariant::for_type(&AttributeType::Date), DiffVariant::Date);
        assert_eq!(DiffVariant::for_type(&AttributeType::Integer), DiffVariant::Integer);
        assert_eq!(
            DiffVariant::for_type(&AttributeType::Custom("money".into())),
            DiffVariant::Untyped
        );
    }

    #[test]
    fn null_passes_every_variant() {
        for v in [
            DiffVariant::Date,
            DiffVariant::Text,
            DiffVariant::Timestamp,
            DiffVariant::Boolean,
            DiffVariant::Integer,
            DiffVariant::Untyped,
        ] {
            assert_eq!(v.cast("a", &Value::Null).unwrap(), TypedValue::Null);
        }
    }

    #[test]
    fn date_parses_day_and_rfc3339() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        assert_eq!(
            DiffVariant::Date.cast("born", &json!("2024-05-17")).unwrap(),
            TypedValue::Date(expected)
        );
        assert_eq!(
            DiffVariant::Date
                .cast("born", &json!("2024-05-17T10:00:00+00:00"))
                .unwrap(),
            TypedValue::Date(expected)
        );
        assert!(mismatch(DiffVariant::Date.cast("born", &json!("17/05/2024"))));
        assert!(mismatch(DiffVariant::Date.cast("born", &json!(20240517))));
    }

    #[test]
    fn timestamp_normalizes_to_utc() {
        let cast = DiffVariant::Timestamp
            .cast("seen_at", &json!("2024-01-01T02:00:00+02:00"))
            .unwrap();
        assert_eq!(
            cast.as_timestamp().unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn timestamp_drops_sub_millisecond_digits() {
        let a = DiffVariant::Timestamp
            .cast("seen_at", &json!("2024-01-01T10:00:00.0001Z"))
            .unwrap();
        let b = DiffVariant::Timestamp
            .cast("seen_at", &json!("2024-01-01T10:00:00.0002Z"))
            .unwrap();
        assert_eq!(a, b);

        let c = DiffVariant::Timestamp
            .cast("seen_at", &json!("2024-01-01T10:00:00.123456Z"))
            .unwrap();
        assert_eq!(c.as_timestamp().unwrap().timestamp_subsec_micros(), 123_000);
    }

    #[test]
    fn timestamp_accepts_epoch_millis_and_naive_form() {
        let from_ms = DiffVariant::Timestamp.cast("t", &json!(0)).unwrap();
        assert_eq!(from_ms.as_timestamp().unwrap().timestamp(), 0);

        let naive = DiffVariant::Timestamp
            .cast("t", &json!("2024-01-01 12:30:00"))
            .unwrap();
        assert_eq!(
            naive.as_timestamp().unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap()
        );
        assert!(mismatch(DiffVariant::Timestamp.cast("t", &json!(true))));
    }

    #[test]
    fn boolean_accepts_common_encodings() {
        let b = DiffVariant::Boolean;
        assert_eq!(b.cast("x", &json!(true)).unwrap(), TypedValue::Boolean(true));
        assert_eq!(b.cast("x", &json!("false")).unwrap(), TypedValue::Boolean(false));
        assert_eq!(b.cast("x", &json!("1")).unwrap(), TypedValue::Boolean(true));
        assert_eq!(b.cast("x", &json!(0)).unwrap(), TypedValue::Boolean(false));
        assert!(mismatch(b.cast("x", &json!(2))));
        assert!(mismatch(b.cast("x", &json!("yes please"))));
    }

    #[test]
    fn integer_accepts_numbers_and_numeric_strings() {
        let i = DiffVariant::Integer;
        assert_eq!(i.cast("age", &json!(31)).unwrap(), TypedValue::Integer(31));
        assert_eq!(i.cast("age", &json!("31")).unwrap(), TypedValue::Integer(31));
        assert_eq!(i.cast("age", &json!(31.0)).unwrap(), TypedValue::Integer(31));
        assert!(mismatch(i.cast("age", &json!(31.5))));
        assert!(mismatch(i.cast("age", &json!("thirty"))));
    }

    #[test]
    fn text_stringifies_scalars_only() {
        let t = DiffVariant::Text;
        assert_eq!(t.cast("n", &json!("Bob")).unwrap(), TypedValue::Text("Bob".into()));
        assert_eq!(t.cast("n", &json!(12)).unwrap(), TypedValue::Text("12".into()));
        assert_eq!(t.cast("n", &json!(false)).unwrap(), TypedValue::Text("false".into()));
        assert!(mismatch(t.cast("n", &json!({"a": 1}))));
        assert!(mismatch(t.cast("n", &json!([1]))));
    }

    #[test]
    fn untyped_keeps_raw_value() {
        let raw = json!({"nested": [1, 2]});
        assert_eq!(
            DiffVariant::Untyped.cast("blob", &raw).unwrap(),
            TypedValue::Untyped(raw)
        );
    }

    #[test]
    fn custom_variant_runs_host_cast() {
        let cents = DiffVariant::custom("money", |raw| {
            raw.as_f64()
                .map(|f| json!((f * 100.0).round() as i64))
                .ok_or_else(|| "not a number".to_string())
        });
        assert_eq!(cents.name(), "money");
        assert_eq!(
            cents.cast("price", &json!(1.25)).unwrap(),
            TypedValue::Untyped(json!(125))
        );
        let err = cents.cast("price", &json!("cheap")).unwrap_err();
        match err {
            DiffError::TypeMismatch { attribute, expected, found } => {
                assert_eq!(attribute, "price");
                assert_eq!(expected, "money");
                assert!(found.contains("not a number"));
            }
            other => panic!("expected TypeMismatch, got {other:?}"),
        }
    }
}
