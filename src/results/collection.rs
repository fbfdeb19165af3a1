use serde::de::DeserializeOwned;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{Row, RowKey};
use crate::core::utils::resolve;
use crate::query::sort::SortSpec;
use crate::results::keyed::KeyedRows;

/// Ordered rows returned by a table query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet {
    rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(rows: Vec<Row>) -> Self {
        ResultSet { rows }
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn into_first(self) -> Option<Row> {
        self.rows.into_iter().next()
    }

    /// Stable sort by a composite spec.
    pub fn sorted_by(mut self, spec: &SortSpec) -> Self {
        spec.sort(&mut self.rows);
        self
    }

    /// Last row per distinct value of `field`, keys in first-seen order.
    pub fn index_by(&self, field: &str) -> KeyedRows<Row> {
        index_rows(self.rows.iter().cloned(), field)
    }

    pub fn into_index_by(self, field: &str) -> KeyedRows<Row> {
        index_rows(self.rows.into_iter(), field)
    }

    /// Rows grouped by `field`; groups and members keep insertion order.
    pub fn group_by(&self, field: &str) -> KeyedRows<Vec<Row>> {
        group_rows(self.rows.iter().cloned(), field)
    }

    pub fn into_group_by(self, field: &str) -> KeyedRows<Vec<Row>> {
        group_rows(self.rows.into_iter(), field)
    }

    /// Deserialize every row into a caller type.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<Vec<T>> {
        self.rows
            .into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| Error::new(ErrorKind::Parse, format!("row does not fit target type: {}", e)))
            })
            .collect()
    }
}

fn index_rows(rows: impl Iterator<Item = Row>, field: &str) -> KeyedRows<Row> {
    let mut index = KeyedRows::new();
    for row in rows {
        let key = RowKey::from_value(resolve(&row, field));
        index.insert(key, row);
    }
    index
}

fn group_rows(rows: impl Iterator<Item = Row>, field: &str) -> KeyedRows<Vec<Row>> {
    let mut groups = KeyedRows::new();
    for row in rows {
        let key = RowKey::from_value(resolve(&row, field));
        groups.push(key, row);
    }
    groups
}

impl From<Vec<Row>> for ResultSet {
    fn from(rows: Vec<Row>) -> Self {
        ResultSet::new(rows)
    }
}

impl FromIterator<Row> for ResultSet {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        ResultSet::new(iter.into_iter().collect())
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
