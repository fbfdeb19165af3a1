use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use crate::core::error::{Error, ErrorKind, Result};
use crate::query::ast::{Clause, Operator, Query};

/// Parser for the loose JSON query form.
///
/// - `{"field": literal}`                 -> implicit `$eq`
/// - `{"field": {"$gte": 1, "$lt": 9}}`   -> explicit operators
/// - `{"$or": [query, ...]}`              -> branches, concatenated by `find`
pub struct QueryParser;

impl QueryParser {
    pub fn parse(input: &Value) -> Result<Query> {
        match input {
            Value::Null => Ok(Query::all()),
            Value::Object(map) => Self::parse_object(map),
            other => Err(Error::new(
                ErrorKind::InvalidQuery,
                format!("query must be an object, got {}", other),
            )),
        }
    }

    fn parse_object(map: &Map<String, Value>) -> Result<Query> {
        let mut query = Query::new();

        for (field, clause) in map {
            if field == "$or" {
                query.or = Some(Self::parse_branches(clause)?);
                continue;
            }
            if field.starts_with('$') {
                return Err(Error::new(
                    ErrorKind::UnsupportedQueryOperator,
                    format!("unsupported top-level operator {}", field),
                ));
            }

            let clause = Self::parse_clause(field, clause)?;
            // `{"field": {}}` constrains nothing
            for operator in clause.operators {
                query.push(field.clone(), operator);
            }
        }

        Ok(query)
    }

    fn parse_branches(value: &Value) -> Result<Vec<Query>> {
        let Value::Array(branches) = value else {
            return Err(Error::new(ErrorKind::InvalidQuery, "$or expects an array of queries"));
        };
        branches.iter().map(Self::parse).collect()
    }

    fn parse_clause(field: &str, value: &Value) -> Result<Clause> {
        let Value::Object(map) = value else {
            return Ok(Clause::new(vec![Operator::Eq(value.clone())]));
        };

        let operator_keys = map.keys().filter(|key| key.starts_with('$')).count();
        if operator_keys == 0 && !map.is_empty() {
            // A plain object literal compares by value
            return Ok(Clause::new(vec![Operator::Eq(value.clone())]));
        }
        if operator_keys != map.len() {
            return Err(Error::new(
                ErrorKind::UnsupportedQueryOperator,
                format!("clause on {} mixes operators and plain keys", field),
            ));
        }

        let mut operators = Vec::with_capacity(map.len());
        for (name, operand) in map {
            operators.push(Self::parse_operator(field, name, operand)?);
        }
        Ok(Clause::new(operators))
    }

    pub fn parse_operator(field: &str, name: &str, operand: &Value) -> Result<Operator> {
        let operator = match name {
            "$eq" => Operator::Eq(operand.clone()),
            "$ne" => Operator::Ne(operand.clone()),
            "$gt" => Operator::Gt(operand.clone()),
            "$gte" => Operator::Gte(operand.clone()),
            "$lt" => Operator::Lt(operand.clone()),
            "$lte" => Operator::Lte(operand.clone()),
            "$between" => match operand {
                Value::Array(bounds) if bounds.len() == 2 => {
                    Operator::Between(bounds[0].clone(), bounds[1].clone())
                }
                _ => {
                    return Err(Error::new(
                        ErrorKind::InvalidQuery,
                        format!("$between on {} expects [low, high]", field),
                    ));
                }
            },
            "$in" | "$nin" => {
                let Value::Array(values) = operand else {
                    return Err(Error::new(
                        ErrorKind::InvalidQuery,
                        format!("{} on {} expects an array", name, field),
                    ));
                };
                if name == "$in" {
                    Operator::In(values.clone())
                } else {
                    Operator::Nin(values.clone())
                }
            }
            other => {
                return Err(Error::new(
                    ErrorKind::UnsupportedQueryOperator,
                    format!("unsupported query operator {} on {}", other, field),
                ));
            }
        };
        Ok(operator)
    }
}

impl Query {
    /// Parse the loose JSON form.
    pub fn parse(input: &Value) -> Result<Query> {
        QueryParser::parse(input)
    }

    /// Render back to the explicit JSON form.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (field, clause) in &self.clauses {
            let mut ops = Map::new();
            for operator in &clause.operators {
                ops.insert(operator.name().to_string(), operator.operand());
            }
            map.insert(field.clone(), Value::Object(ops));
        }
        if let Some(branches) = &self.or {
            map.insert(
                "$or".to_string(),
                Value::Array(branches.iter().map(Query::to_value).collect()),
            );
        }
        Value::Object(map)
    }
}

impl TryFrom<&Value> for Query {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self> {
        QueryParser::parse(value)
    }
}

impl Serialize for Query {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Query {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        QueryParser::parse(&value).map_err(serde::de::Error::custom)
    }
}
