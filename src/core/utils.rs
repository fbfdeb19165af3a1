use std::collections::HashSet;
use serde_json::{Map, Value};

/// Resolve a dot-separated path. Returns `None` if any segment is missing.
pub fn get_path<'a>(row: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = row;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Like [`get_path`] but a missing path reads as `null`.
pub fn resolve<'a>(row: &'a Value, path: &str) -> &'a Value {
    get_path(row, path).unwrap_or(&Value::Null)
}

/// Set a dot-separated path, creating intermediate objects as needed.
/// Non-object intermediates are replaced.
pub fn set_path(row: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    set_segments(row, &segments, value);
}

pub fn set_segments<S: AsRef<str>>(row: &mut Value, segments: &[S], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = row;
    for segment in parents {
        let object = ensure_object(current);
        current = object
            .entry(segment.as_ref().to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(current).insert(last.as_ref().to_string(), value);
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

/// Remove a dot-separated path, returning the removed value.
pub fn remove_path(row: &mut Value, path: &str) -> Option<Value> {
    let (parent_path, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (Some(parent), leaf),
        None => (None, path),
    };

    let parent = match parent_path {
        Some(parent_path) => {
            let mut current = row;
            for segment in parent_path.split('.') {
                current = current.get_mut(segment)?;
            }
            current
        }
        None => row,
    };

    parent.as_object_mut()?.shift_remove(leaf)
}

/// Distinct values, first occurrence wins.
pub fn distinct<'a, I>(values: I) -> Vec<Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for value in values {
        if seen.insert(value.to_string()) {
            out.push(value.clone());
        }
    }
    out
}

pub fn distinct_non_null<'a, I>(values: I) -> Vec<Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    distinct(values.into_iter().filter(|value| !value.is_null()))
}

/// Flatten an object into (path segments, leaf) pairs.
/// Scalars, arrays and empty objects are leaves.
pub fn flatten_leaves(row: &Value) -> Vec<(Vec<String>, &Value)> {
    let mut leaves = Vec::new();
    let mut prefix = Vec::new();
    if let Value::Object(map) = row {
        flatten_into(map, &mut prefix, &mut leaves);
    }
    leaves
}

fn flatten_into<'a>(
    map: &'a Map<String, Value>,
    prefix: &mut Vec<String>,
    leaves: &mut Vec<(Vec<String>, &'a Value)>,
) {
    for (key, value) in map {
        prefix.push(key.clone());
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_into(inner, prefix, leaves),
            leaf => leaves.push((prefix.clone(), leaf)),
        }
        prefix.pop();
    }
}
