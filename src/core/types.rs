use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use std::fmt;

/// A schema-free document. Tables only ever store JSON objects.
pub type Row = Value;

/// Canonical, hashable form of a scalar used for primary keys and join keys.
///
/// Integral numbers and integer-looking strings collapse to `Int`, so `1`,
/// `1.0` and `"1"` address the same row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowKey {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

// Largest float that still converts to i64 without losing integral precision.
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

impl RowKey {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => RowKey::Null,
            Value::Bool(b) => RowKey::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return RowKey::Int(i);
                }
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT => RowKey::Int(f as i64),
                    _ => RowKey::Text(n.to_string()),
                }
            }
            Value::String(s) => Self::from_text(s),
            other => RowKey::Text(other.to_string()),
        }
    }

    fn from_text(s: &str) -> Self {
        match s.parse::<i64>() {
            Ok(i) if i.to_string() == s => RowKey::Int(i),
            _ => RowKey::Text(s.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RowKey::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RowKey::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RowKey::Null => write!(f, "null"),
            RowKey::Bool(b) => write!(f, "{}", b),
            RowKey::Int(i) => write!(f, "{}", i),
            RowKey::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&Value> for RowKey {
    fn from(value: &Value) -> Self {
        RowKey::from_value(value)
    }
}

impl From<i64> for RowKey {
    fn from(id: i64) -> Self {
        RowKey::Int(id)
    }
}

impl From<&str> for RowKey {
    fn from(s: &str) -> Self {
        RowKey::from_text(s)
    }
}

/// Ordered tuple of (partition-key field, value) identifying a partition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PartitionKey(pub Map<String, Value>);

impl PartitionKey {
    /// Resolve each declared field on the row, in order. Missing fields become `null`.
    pub fn from_row(row: &Row, fields: &[String]) -> Self {
        let mut key = Map::new();
        for field in fields {
            let value = crate::core::utils::resolve(row, field).clone();
            key.insert(field.clone(), value);
        }
        PartitionKey(key)
    }

    pub fn get(&self, field: &str) -> &Value {
        self.0.get(field).unwrap_or(&Value::Null)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `field_value_field_value`, or `default` for the empty tuple.
    pub fn partition_name(&self) -> String {
        if self.0.is_empty() {
            return "default".to_string();
        }

        self.0
            .iter()
            .map(|(field, value)| format!("{}_{}", field, display_value(value)))
            .collect::<Vec<_>>()
            .join("_")
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integer_like_values_share_a_key() {
        assert_eq!(RowKey::from_value(&json!(1)), RowKey::Int(1));
        assert_eq!(RowKey::from_value(&json!("1")), RowKey::Int(1));
        assert_eq!(RowKey::from_value(&json!(1.0)), RowKey::Int(1));
        assert_eq!(RowKey::from_value(&json!("007")), RowKey::Text("007".to_string()));
        assert_eq!(RowKey::from_value(&json!(1.5)), RowKey::Text("1.5".to_string()));
        assert!(RowKey::from_value(&Value::Null).is_null());
    }

    #[test]
    fn integer_keys_order_numerically_before_text() {
        let mut keys = vec![
            RowKey::from("b"),
            RowKey::Int(10),
            RowKey::Int(9),
            RowKey::from("a"),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![RowKey::Int(9), RowKey::Int(10), RowKey::from("a"), RowKey::from("b")]
        );
    }

    #[test]
    fn partition_name_follows_declared_field_order() {
        let row = json!({"season": 2023, "league_id": 1, "name": "x"});
        let fields = vec!["league_id".to_string(), "season".to_string()];
        let key = PartitionKey::from_row(&row, &fields);
        assert_eq!(key.partition_name(), "league_id_1_season_2023");

        let empty = PartitionKey::from_row(&row, &[]);
        assert_eq!(empty.partition_name(), "default");

        let missing = PartitionKey::from_row(&json!({}), &["city".to_string()]);
        assert_eq!(missing.partition_name(), "city_null");
        assert_eq!(missing.get("city"), &Value::Null);
    }
}
