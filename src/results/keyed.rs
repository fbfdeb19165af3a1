use std::collections::HashMap;
use serde_json::Value;
use crate::core::types::RowKey;

/// Values addressed by a canonical key, iterated in first-seen key order.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedRows<T> {
    entries: Vec<(RowKey, T)>,
    positions: HashMap<RowKey, usize>,
}

impl<T> Default for KeyedRows<T> {
    fn default() -> Self {
        KeyedRows {
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

impl<T> KeyedRows<T> {
    pub fn new() -> Self {
        KeyedRows::default()
    }

    /// Insert or replace; a replaced value keeps its original position.
    pub fn insert(&mut self, key: RowKey, value: T) {
        match self.positions.get(&key) {
            Some(&pos) => self.entries[pos].1 = value,
            None => {
                self.positions.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn get(&self, key: &RowKey) -> Option<&T> {
        self.positions.get(key).map(|&pos| &self.entries[pos].1)
    }

    pub fn get_mut(&mut self, key: &RowKey) -> Option<&mut T> {
        match self.positions.get(key) {
            Some(&pos) => Some(&mut self.entries[pos].1),
            None => None,
        }
    }

    /// Lookup by a raw JSON value, canonicalized the same way keys were.
    pub fn lookup(&self, value: &Value) -> Option<&T> {
        self.get(&RowKey::from_value(value))
    }

    pub fn contains_key(&self, key: &RowKey) -> bool {
        self.positions.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &RowKey> {
        self.entries.iter().map(|(key, _)| key)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RowKey, &T)> {
        self.entries.iter().map(|(key, value)| (key, value))
    }
}

impl<T> KeyedRows<Vec<T>> {
    /// Append to the group under `key`, creating it on first sight.
    pub fn push(&mut self, key: RowKey, value: T) {
        match self.positions.get(&key) {
            Some(&pos) => self.entries[pos].1.push(value),
            None => self.insert(key, vec![value]),
        }
    }
}

impl<T> IntoIterator for KeyedRows<T> {
    type Item = (RowKey, T);
    type IntoIter = std::vec::IntoIter<(RowKey, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
