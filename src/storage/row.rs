//! Row and scalar value types.

use std::fmt;
use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// A scalar column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Text(String),
    Decimal(Decimal),
}

impl Value {
    /// Integer view of the value; decimals truncate toward zero.
    ///
    /// Returns `None` for text, nulls and decimals outside the `i64` range.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Decimal(d) => d.trunc().to_i64(),
            Self::Null | Self::Text(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Replace an exact decimal by its integer part; other values pass through.
    pub fn into_integer(self) -> Self {
        match self {
            Self::Decimal(d) => d.trunc().to_i64().map_or(Self::Decimal(d), Self::Integer),
            other => other,
        }
    }
}

/// Decimals serialize as JSON numbers: whole values as integers, the rest as
/// floats, so normalized and raw rows print the same.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Integer(i) => serializer.serialize_i64(*i),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Decimal(d) => match (d.fract().is_zero(), d.to_i64(), d.to_f64()) {
                (true, Some(i), _) => serializer.serialize_i64(i),
                (_, _, Some(f)) => serializer.serialize_f64(f),
                _ => serializer.serialize_str(&d.to_string()),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
            Self::Decimal(d) => write!(f, "{d}"),
        }
    }
}

/// One table record: column names mapped to values, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    fields: Vec<(Arc<str>, Value)>,
}

impl Row {
    pub fn new(fields: Vec<(Arc<str>, Value)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| &**name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| &**name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Rewrite one column's value, leaving the rest of the row untouched.
    pub fn map_value(mut self, column: &str, f: impl FnOnce(Value) -> Value) -> Self {
        if let Some((_, value)) = self.fields.iter_mut().find(|(name, _)| &**name == column) {
            let taken = std::mem::replace(value, Value::Null);
            *value = f(taken);
        }
        self
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(&**name, value)?;
        }
        map.end()
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (name, value)) in self.fields.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample() -> Row {
        Row::new(vec![
            (Arc::from("user_id"), Value::Text("u-1".into())),
            (Arc::from("age"), Value::Decimal(Decimal::from_str("36").unwrap())),
        ])
    }

    #[test]
    fn test_decimal_truncates_toward_zero() {
        assert_eq!(Value::Decimal(Decimal::from_str("36.9").unwrap()).as_i64(), Some(36));
        assert_eq!(Value::Decimal(Decimal::from_str("-2.5").unwrap()).as_i64(), Some(-2));
        assert_eq!(Value::Integer(7).as_i64(), Some(7));
        assert_eq!(Value::Text("7".into()).as_i64(), None);
        assert_eq!(Value::Null.as_i64(), None);
    }

    #[test]
    fn test_map_value_only_touches_named_column() {
        let row = sample().map_value("age", Value::into_integer);
        assert_eq!(row.get("age"), Some(&Value::Integer(36)));
        assert_eq!(row.get("user_id"), Some(&Value::Text("u-1".into())));

        let unchanged = sample().map_value("missing", Value::into_integer);
        assert_eq!(unchanged, sample());
    }

    #[test]
    fn test_serializes_as_ordered_object() {
        let json = serde_json::to_string(&sample().map_value("age", Value::into_integer)).unwrap();
        assert_eq!(json, r#"{"user_id":"u-1","age":36}"#);
    }

    #[test]
    fn test_decimal_serializes_as_number() {
        let raw = serde_json::to_string(&sample()).unwrap();
        assert_eq!(raw, r#"{"user_id":"u-1","age":36}"#);

        let fractional = Value::Decimal(Decimal::from_str("36.5").unwrap());
        assert_eq!(serde_json::to_string(&fractional).unwrap(), "36.5");
        assert_eq!(serde_json::to_string(&Value::Null).unwrap(), "null");
    }

    #[test]
    fn test_display() {
        assert_eq!(sample().to_string(), "user_id=u-1, age=36");
        assert_eq!(sample().columns().collect::<Vec<_>>(), vec!["user_id", "age"]);
    }
}
