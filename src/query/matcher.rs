use std::cmp::Ordering;
use serde_json::Value;
use crate::core::types::Row;
use crate::core::utils::resolve;
use crate::query::ast::{Clause, Operator, Query};

/// Compare two JSON values, returning an ordering if the types are comparable.
///
/// - Numbers: compared as f64
/// - Strings: compared lexicographically
/// - Booleans: false < true
/// - Null == Null
/// - Mismatched types: returns `None`
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Number(a), Value::Number(b)) => {
            let fa = a.as_f64()?;
            let fb = b.as_f64()?;
            fa.partial_cmp(&fb)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Strict equality; numbers compare by value so `1 == 1.0`.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => compare_values(left, right) == Some(Ordering::Equal),
        _ => left == right,
    }
}

impl Operator {
    /// Evaluate against a resolved field value (`null` when the field is missing).
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Operator::Eq(expected) => values_equal(value, expected),
            Operator::Ne(expected) => !values_equal(value, expected),
            Operator::Gt(bound) => compare_values(value, bound) == Some(Ordering::Greater),
            Operator::Gte(bound) => matches!(
                compare_values(value, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Lt(bound) => compare_values(value, bound) == Some(Ordering::Less),
            Operator::Lte(bound) => matches!(
                compare_values(value, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::Between(low, high) => {
                let ge_low = matches!(
                    compare_values(value, low),
                    Some(Ordering::Greater | Ordering::Equal)
                );
                let le_high = matches!(
                    compare_values(value, high),
                    Some(Ordering::Less | Ordering::Equal)
                );
                ge_low && le_high
            }
            Operator::In(values) => values.iter().any(|candidate| values_equal(value, candidate)),
            Operator::Nin(values) => !values.iter().any(|candidate| values_equal(value, candidate)),
        }
    }
}

impl Clause {
    pub fn matches(&self, value: &Value) -> bool {
        self.operators.iter().all(|operator| operator.matches(value))
    }
}

impl Query {
    /// Full row-level evaluation, including `$or` branches.
    pub fn matches(&self, row: &Row) -> bool {
        let fields_match = self
            .clauses
            .iter()
            .all(|(field, clause)| clause.matches(resolve(row, field)));
        if !fields_match {
            return false;
        }

        match &self.or {
            Some(branches) => branches.iter().any(|branch| branch.matches(row)),
            None => true,
        }
    }
}
