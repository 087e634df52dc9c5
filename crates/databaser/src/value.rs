//! Attribute and binding values
//!
//! Every column value that flows through the builder, the drivers and the
//! entity layer is a [`Value`]. Rows are ordered maps of column name to value.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value as JsonValue;

/// A fetched row (column name to value)
pub type Row = BTreeMap<String, Value>;

/// Scalar value stored in attribute maps and parameter bindings
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Numeric view of the value.
    ///
    /// Strings count as numeric only when the whole (trimmed) text parses as
    /// a number; booleans, bytes and null are never numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => {
                let trimmed = s.trim_start();
                if trimmed.is_empty() {
                    return None;
                }
                trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
            }
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_f64().is_some()
    }

    /// Truthiness in the loose scripting sense (used by `where_field` style filters)
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty() && s != "0",
            Value::Bytes(b) => !b.is_empty(),
        }
    }

    /// Loose equality: numeric values compare by number, everything else by
    /// string form.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => a.to_string() == b.to_string(),
            },
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Bytes(b) => JsonValue::String(String::from_utf8_lossy(b).into_owned()),
        }
    }

    pub fn from_json(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            JsonValue::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(true) => write!(f, "1"),
            Value::Bool(false) => Ok(()),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(v as i64)
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32, isize);

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v).map(Value::Int).unwrap_or(Value::Float(v as f64))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::String(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        Value::from_json(&v)
    }
}

impl From<chrono::NaiveDateTime> for Value {
    fn from(v: chrono::NaiveDateTime) -> Self {
        Value::String(v.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Build a [`Row`] from `column => value` pairs.
#[macro_export]
macro_rules! row {
    () => { $crate::value::Row::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::value::Row::new();
        $( row.insert(::std::string::String::from($key), $crate::value::Value::from($value)); )+
        row
    }};
}

/// Render a row as a JSON object
pub fn row_to_json(row: &Row) -> JsonValue {
    JsonValue::Object(row.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_strings() {
        assert_eq!(Value::from("42").as_f64(), Some(42.0));
        assert_eq!(Value::from(" 1.5").as_f64(), Some(1.5));
        assert_eq!(Value::from("1e3").as_f64(), Some(1000.0));
        assert_eq!(Value::from("abc").as_f64(), None);
        assert_eq!(Value::from("").as_f64(), None);
        assert_eq!(Value::Bool(true).as_f64(), None);
        assert_eq!(Value::Null.as_f64(), None);
    }

    #[test]
    fn test_loose_equality() {
        assert!(Value::Int(1).loose_eq(&Value::from("1")));
        assert!(Value::Float(2.0).loose_eq(&Value::Int(2)));
        assert!(!Value::Null.loose_eq(&Value::from("")));
        assert!(Value::from("a").loose_eq(&Value::from("a")));
    }

    #[test]
    fn test_option_and_json_conversions() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::String("x".into()));
        assert_eq!(Value::from(serde_json::json!(7)), Value::Int(7));
        assert_eq!(Value::Float(1.5).to_json(), serde_json::json!(1.5));
    }

    #[test]
    fn test_row_macro() {
        let row = row! { "id" => 1, "name" => "Ada" };
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
        assert_eq!(row_to_json(&row), serde_json::json!({"id": 1, "name": "Ada"}));
    }
}
