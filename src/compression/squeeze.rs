use std::collections::HashMap;
use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Row;
use crate::core::utils::{flatten_leaves, set_segments};

/// Dictionary-encoded rows.
///
/// Every row is flattened to leaf paths; `key_list` holds the distinct paths
/// and `values` the distinct leaf values. Each row becomes one slot per path:
/// the index of its value, or `None` when the row lacks that path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqueezedRows {
    pub key_list: Vec<Vec<String>>,
    pub rows: Vec<Vec<Option<usize>>>,
    pub values: Vec<Value>,
}

pub fn squeeze(rows: &[Row]) -> SqueezedRows {
    let mut key_positions: HashMap<Vec<String>, usize> = HashMap::new();
    let mut key_list = Vec::new();
    let mut value_positions: HashMap<String, usize> = HashMap::new();
    let mut values = Vec::new();

    // (key position, value position) per row, resolved in one pass
    let mut encoded: Vec<Vec<(usize, usize)>> = Vec::with_capacity(rows.len());

    for row in rows {
        let mut slots = Vec::new();
        for (path, leaf) in flatten_leaves(row) {
            let key_pos = *key_positions.entry(path.clone()).or_insert_with(|| {
                key_list.push(path);
                key_list.len() - 1
            });

            let value_pos = *value_positions.entry(leaf.to_string()).or_insert_with(|| {
                values.push(leaf.clone());
                values.len() - 1
            });

            slots.push((key_pos, value_pos));
        }
        encoded.push(slots);
    }

    let rows = encoded
        .into_iter()
        .map(|slots| {
            let mut row = vec![None; key_list.len()];
            for (key_pos, value_pos) in slots {
                row[key_pos] = Some(value_pos);
            }
            row
        })
        .collect();

    SqueezedRows { key_list, rows, values }
}

pub fn unsqueeze(squeezed: &SqueezedRows) -> Result<Vec<Row>> {
    let mut rows = Vec::with_capacity(squeezed.rows.len());

    for encoded in &squeezed.rows {
        let mut row = Value::Object(Map::new());
        for (key_pos, slot) in encoded.iter().enumerate() {
            let Some(value_pos) = slot else {
                continue;
            };

            let path = squeezed.key_list.get(key_pos).ok_or_else(|| {
                Error::new(ErrorKind::Compression, format!("key slot {} out of range", key_pos))
            })?;
            let value = squeezed.values.get(*value_pos).ok_or_else(|| {
                Error::new(ErrorKind::Compression, format!("value index {} out of range", value_pos))
            })?;

            set_segments(&mut row, path, value.clone());
        }
        rows.push(row);
    }

    Ok(rows)
}
