use std::collections::{BTreeMap, HashMap, HashSet};
use std::collections::btree_map::Entry;
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use crate::compression::compress::CompressionType;
use crate::core::config::WriteOptions;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{PartitionKey, Row, RowKey};
use crate::core::utils::{remove_path, resolve};
use crate::query::ast::{Clause, Operator, Query};
use crate::results::collection::ResultSet;
use crate::storage::codec::{IdentityCodec, RowCodec};
use crate::storage::layout::{write_atomic, TableLayout};
use crate::storage::partition::{primary_key_of, Partition, PartitionSettings, WriteOutcome};
use crate::table::connection::TableConnection;

/// Per-table options supplied at creation.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub primary_key: String,
    pub partition_keys: Vec<String>,
    pub delete_key_list: Vec<String>,
    pub compression: Option<CompressionType>, // database default when None
    pub codec: Arc<dyn RowCodec>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        TableSchema {
            name: name.into(),
            primary_key: primary_key.into(),
            partition_keys: Vec::new(),
            delete_key_list: Vec::new(),
            compression: None,
            codec: Arc::new(IdentityCodec),
        }
    }

    pub fn partitioned_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partition_keys = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Fields stripped from every row before insert and update.
    pub fn dropping<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.delete_key_list = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn RowCodec>) -> Self {
        self.codec = codec;
        self
    }
}

/// Where a tracked primary key lives, plus the key as the row spelled it.
#[derive(Debug, Clone, PartialEq)]
struct IndexEntry {
    partition: String,
    value: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct TableMetadata {
    table_name: String,
    primary_key: String,
    partition_keys: Vec<String>,
    partition_names: Vec<String>,
    table_connections: BTreeMap<String, TableConnection>,
    compression: CompressionType,
    #[serde(default)]
    delete_key_list: Vec<String>,
}

/// Counts from one `output_to_file` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub written: usize,
    pub clean: usize,
    pub timed_out: usize,
    pub failed: usize,
    pub metadata_written: bool,
}

/// A named set of rows, partitioned by an ordered list of fields.
#[derive(Debug)]
pub struct Table {
    pub name: String,
    primary_key_field: String,
    partition_key_fields: Vec<String>,
    delete_key_list: Vec<String>,
    partitions: BTreeMap<String, Partition>,
    partition_name_by_primary_key: HashMap<RowKey, IndexEntry>,
    table_connections: BTreeMap<String, TableConnection>,
    layout: TableLayout,
    settings: PartitionSettings,
    write_options: WriteOptions,
}

impl Table {
    pub fn new(
        schema: TableSchema,
        layout: TableLayout,
        default_compression: CompressionType,
        write_options: WriteOptions,
    ) -> Self {
        let settings = PartitionSettings {
            compression: schema.compression.unwrap_or(default_compression),
            pretty_json: write_options.pretty_json,
            codec: schema.codec,
        };

        Table {
            name: schema.name,
            primary_key_field: schema.primary_key,
            partition_key_fields: schema.partition_keys,
            delete_key_list: schema.delete_key_list,
            partitions: BTreeMap::new(),
            partition_name_by_primary_key: HashMap::new(),
            table_connections: BTreeMap::new(),
            layout,
            settings,
            write_options,
        }
    }

    pub fn primary_key_field(&self) -> &str {
        &self.primary_key_field
    }

    pub fn partition_key_fields(&self) -> &[String] {
        &self.partition_key_fields
    }

    pub fn delete_key_list(&self) -> &[String] {
        &self.delete_key_list
    }

    pub fn compression(&self) -> CompressionType {
        self.settings.compression
    }

    pub fn partition(&self, name: &str) -> Option<&Partition> {
        self.partitions.get(name)
    }

    pub fn partitions(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.values()
    }

    /// Partition currently holding the row with this primary key.
    pub fn partition_name_of(&self, primary_key: &Value) -> Option<&str> {
        self.partition_name_by_primary_key
            .get(&RowKey::from_value(primary_key))
            .map(|entry| entry.partition.as_str())
    }

    /// Name of the partition holding `key`. Distinct tuples that render to
    /// the same name (`1` and `"1"`) get a `~n` suffix in creation order.
    fn partition_name_for(&self, key: &PartitionKey) -> String {
        let base = key.partition_name();
        let existing = self
            .partitions
            .range(base.clone()..)
            .take_while(|(name, _)| name.starts_with(&base))
            .find(|(_, partition)| partition.partition_key == *key);
        if let Some((name, _)) = existing {
            return name.clone();
        }

        let mut name = base.clone();
        let mut suffix = 1;
        while self.partitions.contains_key(&name) {
            name = format!("{}~{}", base, suffix);
            suffix += 1;
        }
        name
    }

    fn cleanse(&self, row: &mut Row) {
        for field in &self.delete_key_list {
            remove_path(row, field);
        }
    }

    /// Insert one row or an array of rows. Rows placed before a failing row
    /// stay placed.
    pub fn insert(&mut self, rows: Value) -> Result<usize> {
        match rows {
            Value::Array(rows) => {
                let mut inserted = 0;
                for row in rows {
                    self.insert_row(row)?;
                    inserted += 1;
                }
                Ok(inserted)
            }
            row => self.insert_row(row).map(|_| 1),
        }
    }

    pub fn insert_row(&mut self, mut row: Row) -> Result<RowKey> {
        self.cleanse(&mut row);

        let key = primary_key_of(&row, &self.primary_key_field)?;
        if let Some(entry) = self.partition_name_by_primary_key.get(&key) {
            return Err(Error::new(
                ErrorKind::DuplicatePrimaryKey,
                format!(
                    "{}.{} = {} already exists in partition {}",
                    self.name, self.primary_key_field, key, entry.partition
                ),
            ));
        }

        let partition_key = PartitionKey::from_row(&row, &self.partition_key_fields);
        let partition_name = self.partition_name_for(&partition_key);
        let original_key = resolve(&row, &self.primary_key_field).clone();

        let partition = match self.partitions.entry(partition_name.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!(table = %self.name, partition = %partition_name, "creating partition");
                let path = self.layout.partition_path(&partition_name, self.settings.compression);
                entry.insert(Partition::new(
                    partition_name.clone(),
                    partition_key,
                    &self.primary_key_field,
                    path,
                    self.settings.clone(),
                ))
            }
        };
        partition.insert_row(row)?;

        self.partition_name_by_primary_key.insert(
            key.clone(),
            IndexEntry {
                partition: partition_name,
                value: original_key,
            },
        );
        Ok(key)
    }

    /// Replace rows by primary key. A changed partition-key value moves the
    /// row to its new partition.
    pub fn update(&mut self, rows: Value) -> Result<usize> {
        let rows = match rows {
            Value::Array(rows) => rows,
            row => vec![row],
        };

        let mut updated = 0;
        for mut row in rows {
            self.cleanse(&mut row);
            let key = primary_key_of(&row, &self.primary_key_field)?;
            let Some(entry) = self.partition_name_by_primary_key.remove(&key) else {
                return Err(Error::new(
                    ErrorKind::RowNotFound,
                    format!("{}.{} = {} does not exist", self.name, self.primary_key_field, key),
                ));
            };
            if let Some(partition) = self.partitions.get_mut(&entry.partition) {
                partition.remove(&key);
            }

            self.insert_row(row)?;
            updated += 1;
        }
        Ok(updated)
    }

    pub fn find(&self, query: Option<&Query>) -> ResultSet {
        let query = match query {
            Some(query) if !query.is_match_all() => query,
            _ => return self.all_rows(),
        };

        if let Some(branches) = &query.or {
            let shared = Query {
                clauses: query.clauses.clone(),
                or: None,
            };
            let mut rows = Vec::new();
            for branch in branches {
                rows.extend(self.find(Some(&shared.and(branch))));
            }
            return ResultSet::new(rows);
        }

        let mut candidates: Vec<&Partition> = self.partitions.values().collect();

        if let Some(clause) = query.clause(&self.primary_key_field) {
            let names = self.partitions_for_primary_key(clause);
            candidates.retain(|partition| names.contains(partition.name.as_str()));
            debug!(table = %self.name, partitions = candidates.len(), "pruned by primary key");
        }

        for field in &self.partition_key_fields {
            if let Some(clause) = query.clause(field) {
                candidates.retain(|partition| clause.matches(partition.partition_key.get(field)));
            }
        }

        // partition-key clauses were settled per partition
        let row_clauses: Vec<&(String, Clause)> = query
            .clauses
            .iter()
            .filter(|(field, _)| !self.partition_key_fields.contains(field))
            .collect();

        let rows = candidates
            .into_iter()
            .flat_map(|partition| partition.rows())
            .filter(|row| {
                row_clauses
                    .iter()
                    .all(|(field, clause)| clause.matches(resolve(row, field)))
            })
            .cloned()
            .collect();
        ResultSet::new(rows)
    }

    /// Parse a loose JSON query, then [`Table::find`].
    pub fn find_json(&self, query: &Value) -> Result<ResultSet> {
        let query = Query::parse(query)?;
        Ok(self.find(Some(&query)))
    }

    pub fn find_one(&self, query: Option<&Query>) -> Option<Row> {
        self.find(query).into_first()
    }

    fn all_rows(&self) -> ResultSet {
        self.partitions
            .values()
            .flat_map(|partition| partition.rows())
            .cloned()
            .collect()
    }

    /// Names of partitions that may hold a key matching the clause.
    /// Equality and membership go through the reverse index, every other
    /// operator filters the tracked key space.
    fn partitions_for_primary_key(&self, clause: &Clause) -> HashSet<&str> {
        let lookups = clause.operators.iter().find_map(|operator| match operator {
            Operator::Eq(value) => Some(vec![RowKey::from_value(value)]),
            Operator::In(values) => Some(values.iter().map(RowKey::from_value).collect()),
            _ => None,
        });

        let candidates: Vec<(&RowKey, &IndexEntry)> = match lookups {
            Some(keys) => keys
                .iter()
                .filter_map(|key| self.partition_name_by_primary_key.get_key_value(key))
                .collect(),
            None => self.partition_name_by_primary_key.iter().collect(),
        };

        candidates
            .into_iter()
            .filter(|(key, entry)| {
                clause.operators.iter().all(|operator| match operator {
                    Operator::Eq(value) => **key == RowKey::from_value(value),
                    Operator::In(values) => values.iter().any(|value| **key == RowKey::from_value(value)),
                    other => other.matches(&entry.value),
                })
            })
            .map(|(_, entry)| entry.partition.as_str())
            .collect()
    }

    /// Remove matching rows, or clear the table (files included) when no
    /// query is given. Returns the number of rows removed.
    pub async fn delete(&mut self, query: Option<&Query>) -> usize {
        match query {
            Some(query) => self.delete_matching(query),
            None => self.clear().await,
        }
    }

    pub fn delete_matching(&mut self, query: &Query) -> usize {
        let matches = self.find(Some(query));
        let mut removed = 0;
        for row in matches {
            let Ok(key) = primary_key_of(&row, &self.primary_key_field) else {
                continue;
            };
            // `$or` results may list a row twice
            let Some(entry) = self.partition_name_by_primary_key.remove(&key) else {
                continue;
            };
            if let Some(partition) = self.partitions.get_mut(&entry.partition) {
                partition.remove(&key);
                removed += 1;
            }
        }
        debug!(table = %self.name, removed, "deleted rows");
        removed
    }

    pub async fn clear(&mut self) -> usize {
        let removed = self.partition_name_by_primary_key.len();
        for partition in self.partitions.values_mut() {
            partition.delete_file().await;
        }
        self.partitions.clear();
        self.partition_name_by_primary_key.clear();
        info!(table = %self.name, removed, "cleared table");
        removed
    }

    pub fn count(&self) -> usize {
        self.partition_name_by_primary_key.len()
    }

    /// Next integer primary key: 1 for an empty table, else max + 1.
    /// Only meaningful for integer keys; other keys are ignored.
    pub fn next_id(&self) -> i64 {
        self.partition_name_by_primary_key
            .keys()
            .filter_map(RowKey::as_i64)
            .max()
            .map_or(1, |max| max + 1)
    }

    pub fn add_connection(&mut self, peer: impl Into<String>, connection: TableConnection) {
        self.table_connections.insert(peer.into(), connection);
    }

    pub fn get_table_connection(&self, peer: &str) -> Option<&TableConnection> {
        self.table_connections.get(peer)
    }

    pub fn table_connections(&self) -> &BTreeMap<String, TableConnection> {
        &self.table_connections
    }

    pub fn get_all_foreign_keys(&self) -> Vec<String> {
        self.table_connections
            .values()
            .map(|connection| connection.join_key.clone())
            .collect()
    }

    /// Join keys of every connection plus the primary key, without repeats.
    pub fn get_foreign_keys_and_primary_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for key in self
            .get_all_foreign_keys()
            .into_iter()
            .chain(std::iter::once(self.primary_key_field.clone()))
        {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    fn metadata(&self) -> TableMetadata {
        TableMetadata {
            table_name: self.name.clone(),
            primary_key: self.primary_key_field.clone(),
            partition_keys: self.partition_key_fields.clone(),
            partition_names: self.partitions.keys().cloned().collect(),
            table_connections: self.table_connections.clone(),
            compression: self.settings.compression,
            delete_key_list: self.delete_key_list.clone(),
        }
    }

    /// Wait for an in-flight write with exponential backoff.
    /// Returns false once the attempts are exhausted.
    async fn wait_for_write_lock(&self, partition: &Partition) -> bool {
        let mut delay = self.write_options.initial_backoff;
        let mut attempts = 0;
        while partition.is_write_locked() {
            if attempts >= self.write_options.lock_attempts {
                return false;
            }
            tokio::time::sleep(delay).await;
            delay = delay.mul_f64(self.write_options.backoff_factor);
            attempts += 1;
        }
        true
    }

    /// Write every dirty partition, then the table metadata.
    pub async fn output_to_file(&self) -> SaveReport {
        let mut report = SaveReport::default();
        let mut writes = JoinSet::new();

        for partition in self.partitions.values() {
            if !self.wait_for_write_lock(partition).await {
                let timeout = Error::new(
                    ErrorKind::WriteLockTimeout,
                    format!(
                        "partition {} still locked after {} attempts",
                        partition.name, self.write_options.lock_attempts
                    ),
                );
                warn!(table = %self.name, partition = %partition.name, error = %timeout, "skipping partition");
                report.timed_out += 1;
                continue;
            }

            match partition.prepare_write() {
                Ok(pending) => {
                    writes.spawn(pending.commit());
                }
                Err(WriteOutcome::Clean) => report.clean += 1,
                Err(WriteOutcome::Locked) => report.timed_out += 1,
                Err(WriteOutcome::Written) => report.written += 1,
                Err(WriteOutcome::Failed) => report.failed += 1,
            }
        }

        while let Some(joined) = writes.join_next().await {
            match joined {
                Ok(WriteOutcome::Written) => report.written += 1,
                Ok(WriteOutcome::Clean) => report.clean += 1,
                Ok(WriteOutcome::Locked) => report.timed_out += 1,
                Ok(WriteOutcome::Failed) => report.failed += 1,
                Err(err) => {
                    error!(table = %self.name, error = %err, "partition write task failed");
                    report.failed += 1;
                }
            }
        }

        report.metadata_written = match self.write_metadata().await {
            Ok(()) => true,
            Err(err) => {
                error!(table = %self.name, error = %err, "failed to write table metadata");
                false
            }
        };

        info!(
            table = %self.name,
            written = report.written,
            clean = report.clean,
            timed_out = report.timed_out,
            failed = report.failed,
            "saved table"
        );
        report
    }

    async fn write_metadata(&self) -> Result<()> {
        let metadata = self.metadata();
        let bytes = if self.write_options.pretty_json {
            serde_json::to_vec_pretty(&metadata)?
        } else {
            serde_json::to_vec(&metadata)?
        };
        write_atomic(&self.layout.metadata_path(), &bytes).await
    }

    async fn read_metadata(&self) -> Result<TableMetadata> {
        let bytes = tokio::fs::read(self.layout.metadata_path()).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Replace the in-memory table with its persisted state. Failures are
    /// logged and leave the table (or the affected partition) empty.
    pub async fn read_from_file(&mut self) {
        self.partitions.clear();
        self.partition_name_by_primary_key.clear();

        let metadata = match self.read_metadata().await {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(table = %self.name, path = %self.layout.metadata_path().display(), error = %err, "failed to read table metadata");
                return;
            }
        };

        self.primary_key_field = metadata.primary_key;
        self.partition_key_fields = metadata.partition_keys;
        self.table_connections = metadata.table_connections;
        self.delete_key_list = metadata.delete_key_list;
        self.settings.compression = metadata.compression;

        let mut reads = JoinSet::new();
        for name in metadata.partition_names {
            let path = self.layout.partition_path(&name, self.settings.compression);
            let mut partition = Partition::new(
                name,
                PartitionKey::default(),
                &self.primary_key_field,
                path,
                self.settings.clone(),
            );
            reads.spawn(async move {
                partition.read_from_file().await;
                partition
            });
        }

        while let Some(joined) = reads.join_next().await {
            let partition = match joined {
                Ok(partition) => partition,
                Err(err) => {
                    error!(table = %self.name, error = %err, "partition read task failed");
                    continue;
                }
            };
            if partition.is_empty() {
                continue;
            }
            for (key, row) in partition.entries() {
                self.partition_name_by_primary_key.insert(
                    key.clone(),
                    IndexEntry {
                        partition: partition.name.clone(),
                        value: resolve(row, &self.primary_key_field).clone(),
                    },
                );
            }
            self.partitions.insert(partition.name.clone(), partition);
        }

        info!(
            table = %self.name,
            partitions = self.partitions.len(),
            rows = self.count(),
            "loaded table"
        );
    }
}
