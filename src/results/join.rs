use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use crate::core::types::{Row, RowKey};
use crate::core::utils::{distinct, get_path, resolve, set_path};
use crate::query::ast::Query;
use crate::results::collection::ResultSet;
use crate::table::table::Table;

/// Right-hand side of [`ResultSet::left_join`].
pub enum JoinSource<'a> {
    Rows(&'a ResultSet),
    /// A live table, optionally pre-filtered; narrowed by the left rows'
    /// partition-key values before it is read.
    Table(&'a Table, Option<&'a Query>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JoinKeys {
    Shared(String),
    Split { left_key: String, right_key: String },
}

impl JoinKeys {
    pub fn split(left_key: impl Into<String>, right_key: impl Into<String>) -> Self {
        JoinKeys::Split {
            left_key: left_key.into(),
            right_key: right_key.into(),
        }
    }

    pub fn left(&self) -> &str {
        match self {
            JoinKeys::Shared(key) => key,
            JoinKeys::Split { left_key, .. } => left_key,
        }
    }

    pub fn right(&self) -> &str {
        match self {
            JoinKeys::Shared(key) => key,
            JoinKeys::Split { right_key, .. } => right_key,
        }
    }
}

impl From<&str> for JoinKeys {
    fn from(key: &str) -> Self {
        JoinKeys::Shared(key.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapStyle {
    /// One `{left_field: left, right_field: right}` row per matching pair.
    CrossJoin,
    /// Every matching right row embedded as an array at `right_field`.
    NestChildren,
    /// The last matching right row embedded at `right_field`.
    NestChild,
}

/// Output field names. `left_field` defaults to the left join key and is
/// only used by [`MapStyle::CrossJoin`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MapKeys {
    #[serde(default)]
    pub left_field: Option<String>,
    pub right_field: String,
}

impl MapKeys {
    pub fn new(right_field: impl Into<String>) -> Self {
        MapKeys {
            left_field: None,
            right_field: right_field.into(),
        }
    }

    pub fn with_left_field(mut self, left_field: impl Into<String>) -> Self {
        self.left_field = Some(left_field.into());
        self
    }
}

impl ResultSet {
    pub fn left_join(
        &self,
        right: JoinSource<'_>,
        join_keys: &JoinKeys,
        map_style: MapStyle,
        map_keys: &MapKeys,
    ) -> ResultSet {
        if self.is_empty() {
            return ResultSet::default();
        }
        let left_key = join_keys.left();
        let right_key = join_keys.right();

        let right_rows = match right {
            JoinSource::Rows(rows) => rows.clone(),
            JoinSource::Table(table, query) => {
                let narrowed = self.narrow_for(table, query);
                table.find(Some(&narrowed))
            }
        };

        match map_style {
            MapStyle::CrossJoin => {
                let right_groups = right_rows.into_group_by(right_key);
                let left_field = map_keys.left_field.as_deref().unwrap_or(left_key);
                let unmatched = vec![Value::Null];

                let mut joined = Vec::new();
                for (key, left_rows) in self.group_by(left_key) {
                    let matches = right_groups.get(&key).unwrap_or(&unmatched);
                    for left_row in &left_rows {
                        for right_row in matches {
                            let mut pair = Map::new();
                            pair.insert(left_field.to_string(), left_row.clone());
                            pair.insert(map_keys.right_field.clone(), right_row.clone());
                            joined.push(Value::Object(pair));
                        }
                    }
                }
                ResultSet::new(joined)
            }
            MapStyle::NestChildren => {
                let right_groups = right_rows.into_group_by(right_key);
                self.iter()
                    .map(|left_row| {
                        let key = RowKey::from_value(resolve(left_row, left_key));
                        let children = match right_groups.get(&key) {
                            Some(rows) => Value::Array(rows.clone()),
                            None => Value::Array(vec![Value::Null]),
                        };
                        embed(left_row, &map_keys.right_field, children)
                    })
                    .collect()
            }
            MapStyle::NestChild => {
                let right_index = right_rows.into_index_by(right_key);
                self.iter()
                    .map(|left_row| {
                        let key = RowKey::from_value(resolve(left_row, left_key));
                        let child = right_index.get(&key).cloned().unwrap_or(Value::Null);
                        embed(left_row, &map_keys.right_field, child)
                    })
                    .collect()
            }
        }
    }

    /// `$in` over the left rows' values for every partition-key field of
    /// `table` that the first left row carries.
    fn narrow_for(&self, table: &Table, query: Option<&Query>) -> Query {
        let mut narrowed = query.cloned().unwrap_or_default();
        let Some(first) = self.first() else {
            return narrowed;
        };

        for field in table.partition_key_fields() {
            if get_path(first, field).is_none() || narrowed.constrains(field) {
                continue;
            }
            let values = distinct(self.iter().map(|row| resolve(row, field)));
            narrowed = narrowed.is_in(field.clone(), values);
        }
        narrowed
    }
}

fn embed(row: &Row, field: &str, value: Value) -> Row {
    let mut row = row.clone();
    set_path(&mut row, field, value);
    row
}
