/// LiveGrid Scalar Values
///
/// A `Scalar` is a single primitive cell or filter value as it travels between
/// the grid widget, the query builder and the remote data service. Values are
/// serialized as plain JSON primitives so tuples like `["qty", ">", 5]` read the
/// same on both sides of the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::fmt;

/// Primitive value carried by filters and rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Scalar {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Null or an empty/whitespace-only string
    pub fn is_blank(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of the value. Numeric strings are parsed, so `"12.5"`
    /// compares against `12.5` the way the remote service would.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            Scalar::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(v) => Some(v),
            _ => None,
        }
    }

    /// Truthiness the way check columns store it: `1`, `true`, `"1"`, `"true"`
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(v) => Some(*v),
            Scalar::Int(v) => Some(*v != 0),
            Scalar::Float(v) => Some(*v != 0.0),
            Scalar::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => Some(true),
                "0" | "false" | "no" => Some(false),
                _ => None,
            },
            Scalar::Null => None,
        }
    }

    /// Text form used for pattern matching and for text filter inputs
    pub fn to_text(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Bool(v) => v.to_string(),
            Scalar::Int(v) => v.to_string(),
            Scalar::Float(v) => v.to_string(),
            Scalar::String(v) => v.clone(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Scalar::Null => JsonValue::Null,
            Scalar::Bool(v) => JsonValue::Bool(*v),
            Scalar::Int(v) => JsonValue::Number((*v).into()),
            Scalar::Float(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Scalar::String(v) => JsonValue::String(v.clone()),
        }
    }

    /// Lossy conversion from any JSON value. Arrays and objects keep their
    /// JSON text so nothing is silently turned into null.
    pub fn from_json(value: &JsonValue) -> Scalar {
        match value {
            JsonValue::Null => Scalar::Null,
            JsonValue::Bool(b) => Scalar::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Scalar::Int(i)
                } else {
                    Scalar::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => Scalar::String(s.clone()),
            other => Scalar::String(other.to_string()),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Scalar::Null => 0,
            Scalar::Bool(_) => 1,
            Scalar::Int(_) | Scalar::Float(_) => 2,
            Scalar::String(_) => 3,
        }
    }

    /// Total order used for sorting.
    ///
    /// Values rank by type first: null < bool < number < string. Numbers
    /// compare numerically across `Int` and `Float`; strings never coerce.
    pub fn compare(&self, other: &Scalar) -> Ordering {
        match (self, other) {
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Int(a), Scalar::Int(b)) => a.cmp(b),
            (Scalar::Int(a), Scalar::Float(b)) => (*a as f64).total_cmp(b),
            (Scalar::Float(a), Scalar::Int(b)) => a.total_cmp(&(*b as f64)),
            (Scalar::Float(a), Scalar::Float(b)) => a.total_cmp(b),
            (Scalar::String(a), Scalar::String(b)) => a.cmp(b),
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }

    /// Comparison used by filter predicates, where `"10"` against `9` is a
    /// numeric comparison. Not transitive across types, so never sort with it.
    pub fn loose_cmp(&self, other: &Scalar) -> Ordering {
        match (self, other) {
            (Scalar::Null, _) | (_, Scalar::Null) => self.compare(other),
            (Scalar::String(a), Scalar::String(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => a.to_text().cmp(&b.to_text()),
            },
        }
    }

    /// Loose equality: `1 == 1.0 == "1"`, case-sensitive for text
    pub fn loose_eq(&self, other: &Scalar) -> bool {
        if self.is_null() || other.is_null() {
            return self.is_null() && other.is_null();
        }
        self.loose_cmp(other) == Ordering::Equal
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::String(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::String(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int(v as i64)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_json_shape() {
        assert_eq!(serde_json::to_value(Scalar::from("a")).unwrap(), json!("a"));
        assert_eq!(serde_json::to_value(Scalar::Int(3)).unwrap(), json!(3));
        assert_eq!(serde_json::to_value(Scalar::Null).unwrap(), json!(null));

        let parsed: Vec<Scalar> = serde_json::from_value(json!([null, true, 4, 1.5, "x"])).unwrap();
        assert_eq!(
            parsed,
            vec![
                Scalar::Null,
                Scalar::Bool(true),
                Scalar::Int(4),
                Scalar::Float(1.5),
                Scalar::String("x".to_string()),
            ]
        );
    }

    #[test]
    fn test_compare_mixed_numeric() {
        assert_eq!(Scalar::Int(2).compare(&Scalar::Float(2.5)), Ordering::Less);
        assert_eq!(Scalar::from("10").loose_cmp(&Scalar::Int(9)), Ordering::Greater);
        assert_eq!(Scalar::Null.compare(&Scalar::Int(0)), Ordering::Less);
        assert!(Scalar::Int(1).loose_eq(&Scalar::from("1")));
        assert!(!Scalar::Null.loose_eq(&Scalar::from("")));
    }

    #[test]
    fn test_compare_ranks_types() {
        assert_eq!(Scalar::Int(9).compare(&Scalar::from("10")), Ordering::Less);
        assert_eq!(Scalar::from("9").compare(&Scalar::Int(9)), Ordering::Greater);
        assert_eq!(Scalar::Bool(true).compare(&Scalar::Int(0)), Ordering::Less);
        assert_eq!(Scalar::Float(f64::NAN).compare(&Scalar::Float(f64::NAN)), Ordering::Equal);
    }

    #[test]
    fn test_sort_mixed_values() {
        let mut values: Vec<Scalar> = Vec::new();
        for i in 0..64i64 {
            values.push(match i % 5 {
                0 => Scalar::Int((i * 37) % 23),
                1 => Scalar::String(((i * 13) % 17).to_string()),
                2 => Scalar::String(format!("x{}", (i * 7) % 11)),
                3 => Scalar::Float((i % 9) as f64 / 2.0),
                _ => Scalar::Null,
            });
        }
        values.sort_by(|a, b| a.compare(b));
        for pair in values.windows(2) {
            assert_ne!(pair[0].compare(&pair[1]), Ordering::Greater);
        }
        assert!(values[0].is_null());
        assert!(values.last().map(|v| v.as_str().is_some()).unwrap_or(false));
    }

    #[test]
    fn test_blank_and_bool() {
        assert!(Scalar::Null.is_blank());
        assert!(Scalar::from("  ").is_blank());
        assert!(!Scalar::Int(0).is_blank());
        assert_eq!(Scalar::from("1").as_bool(), Some(true));
        assert_eq!(Scalar::Int(0).as_bool(), Some(false));
    }
}
