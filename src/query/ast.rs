use serde_json::Value;

/// Comparison operators of the query language.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    Between(Value, Value), // inclusive on both ends
    In(Vec<Value>),
    Nin(Vec<Value>),
}

impl Operator {
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Eq(_) => "$eq",
            Operator::Ne(_) => "$ne",
            Operator::Gt(_) => "$gt",
            Operator::Gte(_) => "$gte",
            Operator::Lt(_) => "$lt",
            Operator::Lte(_) => "$lte",
            Operator::Between(_, _) => "$between",
            Operator::In(_) => "$in",
            Operator::Nin(_) => "$nin",
        }
    }

    pub fn operand(&self) -> Value {
        match self {
            Operator::Eq(v)
            | Operator::Ne(v)
            | Operator::Gt(v)
            | Operator::Gte(v)
            | Operator::Lt(v)
            | Operator::Lte(v) => v.clone(),
            Operator::Between(lo, hi) => Value::Array(vec![lo.clone(), hi.clone()]),
            Operator::In(values) | Operator::Nin(values) => Value::Array(values.clone()),
        }
    }
}

/// All operators applied to one field; a row must satisfy every one.
/// An empty clause matches everything.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Clause {
    pub operators: Vec<Operator>,
}

impl Clause {
    pub fn new(operators: Vec<Operator>) -> Self {
        Clause { operators }
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

/// A normalized query: AND over field clauses, optionally combined with
/// `$or` branches. Each branch is ANDed with the top-level clauses.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub clauses: Vec<(String, Clause)>,
    pub or: Option<Vec<Query>>,
}

impl Query {
    /// The empty query; matches every row.
    pub fn new() -> Self {
        Query::default()
    }

    pub fn all() -> Self {
        Query::default()
    }

    pub fn with(mut self, field: impl Into<String>, operator: Operator) -> Self {
        self.push(field, operator);
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Operator::Eq(value.into()))
    }

    pub fn ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Operator::Ne(value.into()))
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Operator::Gt(value.into()))
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Operator::Gte(value.into()))
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Operator::Lt(value.into()))
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Operator::Lte(value.into()))
    }

    pub fn between(self, field: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.with(field, Operator::Between(low.into(), high.into()))
    }

    pub fn is_in(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.with(field, Operator::In(values))
    }

    pub fn not_in(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.with(field, Operator::Nin(values))
    }

    pub fn or(mut self, branches: Vec<Query>) -> Self {
        self.or = Some(branches);
        self
    }

    /// Append an operator, merging with an existing clause on the same field.
    pub fn push(&mut self, field: impl Into<String>, operator: Operator) {
        let field = field.into();
        match self.clauses.iter_mut().find(|(name, _)| *name == field) {
            Some((_, clause)) => clause.operators.push(operator),
            None => self.clauses.push((field, Clause::new(vec![operator]))),
        }
    }

    pub fn clause(&self, field: &str) -> Option<&Clause> {
        self.clauses
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, clause)| clause)
    }

    pub fn constrains(&self, field: &str) -> bool {
        self.clause(field).is_some_and(|clause| !clause.is_empty())
    }

    pub fn is_match_all(&self) -> bool {
        self.clauses.is_empty() && self.or.is_none()
    }

    /// Number of top-level predicate keys; `$or` counts as one key.
    pub fn predicate_count(&self) -> usize {
        self.clauses.len() + usize::from(self.or.is_some())
    }

    /// This query's clauses ANDed with another query's clauses.
    pub fn and(&self, other: &Query) -> Query {
        let mut merged = Query {
            clauses: self.clauses.clone(),
            or: None,
        };
        for (field, clause) in &other.clauses {
            for operator in &clause.operators {
                merged.push(field.clone(), operator.clone());
            }
        }
        merged.or = other.or.clone().or_else(|| self.or.clone());
        merged
    }
}
