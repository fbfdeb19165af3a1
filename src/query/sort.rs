use std::cmp::Ordering;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use crate::core::types::Row;
use crate::core::utils::resolve;

/// Composite sort: fields in order, positive direction ascending, negative
/// descending. The first field that differs decides.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SortSpec {
    pub fields: Vec<(String, i64)>,
}

impl SortSpec {
    pub fn new() -> Self {
        SortSpec::default()
    }

    pub fn asc(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), 1));
        self
    }

    pub fn desc(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), -1));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        for (field, direction) in &self.fields {
            let ordering = total_order(resolve(a, field), resolve(b, field));
            let ordering = match direction.signum() {
                1 => ordering,
                -1 => ordering.reverse(),
                _ => Ordering::Equal,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Stable in-place sort.
    pub fn sort(&self, rows: &mut [Row]) {
        if self.is_empty() {
            return;
        }
        rows.sort_by(|a, b| self.compare(a, b));
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: values of one type compare naturally,
/// otherwise null < bool < number < string < array < object.
fn total_order(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let fx = x.as_f64().unwrap_or(0.0);
            let fy = y.as_f64().unwrap_or(0.0);
            fx.total_cmp(&fy)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            a.to_string().cmp(&b.to_string())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

impl Serialize for SortSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(field, direction)| (field.clone(), Value::from(*direction)))
            .collect();
        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SortSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        let mut fields = Vec::with_capacity(map.len());
        for (field, direction) in map {
            let direction = direction
                .as_f64()
                .ok_or_else(|| D::Error::custom(format!("sort direction for {} must be a number", field)))?;
            let direction = if direction > 0.0 {
                1
            } else if direction < 0.0 {
                -1
            } else {
                0
            };
            fields.push((field, direction));
        }
        Ok(SortSpec { fields })
    }
}
