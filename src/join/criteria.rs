use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use crate::core::error::{Error, ErrorKind, Result};
use crate::query::ast::Query;
use crate::query::sort::SortSpec;

/// Result shape of a join node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FindFn {
    #[default]
    #[serde(rename = "find")]
    Find,
    #[serde(rename = "findOne")]
    FindOne,
}

/// Declarative join configuration for one table.
///
/// ```json
/// {"filter": {"season": 2023}, "sort": {"power_rank": -1}, "find_fn": "find",
///  "alias": "team_seasons", "filter_up": true, "children": {"team": {}}}
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JoinCriteria {
    #[serde(default)]
    pub filter: Query,
    #[serde(default)]
    pub sort: SortSpec,
    #[serde(default)]
    pub find_fn: FindFn,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub filter_up: bool,
    #[serde(default)]
    pub children: JoinChildren,
}

/// Child criteria keyed by table name, in document order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JoinChildren(pub Vec<(String, JoinCriteria)>);

impl JoinChildren {
    pub fn iter(&self) -> impl Iterator<Item = &(String, JoinCriteria)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for JoinChildren {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = Map::new();
        for (table, criteria) in &self.0 {
            let value = serde_json::to_value(criteria).map_err(serde::ser::Error::custom)?;
            map.insert(table.clone(), value);
        }
        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for JoinChildren {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        let mut children = Vec::with_capacity(map.len());
        for (table, value) in map {
            let criteria: JoinCriteria = serde_json::from_value(value)
                .map_err(|e| D::Error::custom(format!("join criteria for {}: {}", table, e)))?;
            children.push((table, criteria));
        }
        Ok(JoinChildren(children))
    }
}

impl JoinCriteria {
    pub fn new() -> Self {
        JoinCriteria::default()
    }

    pub fn filter(mut self, filter: Query) -> Self {
        self.filter = filter;
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn find_one(mut self) -> Self {
        self.find_fn = FindFn::FindOne;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn filter_up(mut self) -> Self {
        self.filter_up = true;
        self
    }

    pub fn child(mut self, table: impl Into<String>, criteria: JoinCriteria) -> Self {
        self.children.0.push((table.into(), criteria));
        self
    }

    /// Parse `{root_table: criteria}`; exactly one root is allowed.
    pub fn parse_root(spec: &Value) -> Result<(String, JoinCriteria)> {
        let Value::Object(map) = spec else {
            return Err(Error::new(ErrorKind::InvalidQuery, "join specification must be an object"));
        };
        if map.len() != 1 {
            return Err(Error::new(
                ErrorKind::InvalidQuery,
                format!("join specification needs exactly one root table, got {}", map.len()),
            ));
        }

        let Some((table, criteria)) = map.iter().next() else {
            return Err(Error::new(ErrorKind::InvalidQuery, "join specification is empty"));
        };
        let criteria = serde_json::from_value(criteria.clone())
            .map_err(|e| Error::new(ErrorKind::InvalidQuery, format!("join criteria for {}: {}", table, e)))?;
        Ok((table.clone(), criteria))
    }
}
