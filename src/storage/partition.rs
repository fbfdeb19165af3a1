use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};
use crate::compression::compress::{CompressedBlock, CompressionType};
use crate::compression::squeeze::{squeeze, unsqueeze, SqueezedRows};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{PartitionKey, Row, RowKey};
use crate::core::utils::{get_path, remove_path};
use crate::storage::codec::RowCodec;
use crate::storage::layout::write_atomic;

/// How a partition persists itself; shared by every partition of a table.
#[derive(Debug, Clone)]
pub struct PartitionSettings {
    pub compression: CompressionType,
    pub pretty_json: bool,
    pub codec: Arc<dyn RowCodec>,
}

/// Result of one durable write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Clean,   // nothing changed since the last write
    Locked,  // another write of this partition is in flight
    Written,
    Failed,  // dirty flag restored
}

#[derive(Serialize, Deserialize)]
struct PartitionSnapshot {
    name: String,
    partition_key: PartitionKey,
    primary_key: String,
    data: Map<String, Value>, // keyed by the primary key's display form
    last_update: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct SqueezedSnapshot {
    name: String,
    partition_key: PartitionKey,
    primary_key: String,
    rows: SqueezedRows,
    last_update: DateTime<Utc>,
}

/// Rows sharing one partition-key tuple, backed by one file.
#[derive(Debug)]
pub struct Partition {
    pub name: String,
    pub partition_key: PartitionKey,
    pub last_update: DateTime<Utc>,
    primary_key_field: String,
    data: BTreeMap<RowKey, Row>,
    dirty: Arc<AtomicBool>,
    write_lock: Arc<AtomicBool>,
    path: PathBuf,
    settings: PartitionSettings,
}

impl Partition {
    /// A fresh partition starts dirty so its first save creates the file.
    pub fn new(
        name: String,
        partition_key: PartitionKey,
        primary_key_field: &str,
        path: PathBuf,
        settings: PartitionSettings,
    ) -> Self {
        Partition {
            name,
            partition_key,
            last_update: Utc::now(),
            primary_key_field: primary_key_field.to_string(),
            data: BTreeMap::new(),
            dirty: Arc::new(AtomicBool::new(true)),
            write_lock: Arc::new(AtomicBool::new(false)),
            path,
            settings,
        }
    }

    pub fn primary_key_of(&self, row: &Row) -> Result<RowKey> {
        primary_key_of(row, &self.primary_key_field)
    }

    /// Insert a single row or an array of rows; returns how many were stored.
    /// Rows stored before a failing row stay stored.
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

    pub fn insert_row(&mut self, row: Row) -> Result<RowKey> {
        if !row.is_object() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("partition {} only stores objects", self.name),
            ));
        }
        let key = self.primary_key_of(&row)?;
        if self.data.contains_key(&key) {
            return Err(Error::new(
                ErrorKind::DuplicatePrimaryKey,
                format!("{} = {} already exists in partition {}", self.primary_key_field, key, self.name),
            ));
        }

        self.data.insert(key.clone(), row);
        self.touch();
        Ok(key)
    }

    /// Replace a stored row, optionally stripping fields from the stored copy.
    pub fn update(&mut self, row: &Row, fields_to_drop: Option<&[String]>) -> Result<RowKey> {
        let key = self.primary_key_of(row)?;
        if !self.data.contains_key(&key) {
            return Err(Error::new(
                ErrorKind::RowNotFound,
                format!("{} = {} is not in partition {}", self.primary_key_field, key, self.name),
            ));
        }

        let mut stored = row.clone();
        for field in fields_to_drop.unwrap_or_default() {
            remove_path(&mut stored, field);
        }
        self.data.insert(key.clone(), stored);
        self.touch();
        Ok(key)
    }

    pub fn remove(&mut self, key: &RowKey) -> Option<Row> {
        let removed = self.data.remove(key);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub fn get(&self, key: &RowKey) -> Option<&Row> {
        self.data.get(key)
    }

    pub fn contains(&self, key: &RowKey) -> bool {
        self.data.contains_key(key)
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.data.values()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&RowKey, &Row)> {
        self.data.iter()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn is_write_locked(&self) -> bool {
        self.write_lock.load(Ordering::Acquire)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn touch(&mut self) {
        self.mark_dirty();
        self.last_update = Utc::now();
    }

    /// Snapshot the partition into an owned write.
    ///
    /// `Err` carries the outcome when nothing will be written: the partition
    /// is clean, another write holds the lock, or serialization failed.
    /// The dirty flag is cleared before the snapshot is taken, so a mutation
    /// made while the write is in flight leaves the partition dirty again.
    pub fn prepare_write(&self) -> std::result::Result<PendingWrite, WriteOutcome> {
        if self.is_write_locked() {
            return Err(WriteOutcome::Locked);
        }
        if !self.is_dirty() {
            return Err(WriteOutcome::Clean);
        }
        if self
            .write_lock
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(WriteOutcome::Locked);
        }
        let guard = WriteLockGuard(self.write_lock.clone());

        self.dirty.store(false, Ordering::Release);
        match self.serialize() {
            Ok(bytes) => Ok(PendingWrite {
                partition: self.name.clone(),
                path: self.path.clone(),
                bytes,
                dirty: self.dirty.clone(),
                _guard: guard,
            }),
            Err(err) => {
                self.mark_dirty();
                error!(partition = %self.name, error = %err, "failed to serialize partition");
                Err(WriteOutcome::Failed)
            }
        }
    }

    pub async fn write_to_file(&self) -> WriteOutcome {
        match self.prepare_write() {
            Ok(pending) => pending.commit().await,
            Err(outcome) => outcome,
        }
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let rows: Vec<Row> = self
            .data
            .values()
            .map(|row| self.settings.codec.encode(row))
            .collect();

        if self.settings.compression.is_enabled() {
            let snapshot = SqueezedSnapshot {
                name: self.name.clone(),
                partition_key: self.partition_key.clone(),
                primary_key: self.primary_key_field.clone(),
                rows: squeeze(&rows),
                last_update: self.last_update,
            };
            let json = serde_json::to_vec(&snapshot)?;
            return CompressedBlock::compress(&json, self.settings.compression)?.to_bytes();
        }

        let snapshot = PartitionSnapshot {
            name: self.name.clone(),
            partition_key: self.partition_key.clone(),
            primary_key: self.primary_key_field.clone(),
            data: self.data.keys().map(RowKey::to_string).zip(rows).collect(),
            last_update: self.last_update,
        };
        if self.settings.pretty_json {
            Ok(serde_json::to_vec_pretty(&snapshot)?)
        } else {
            Ok(serde_json::to_vec(&snapshot)?)
        }
    }

    /// Replace the in-memory rows and key tuple with the file's content.
    /// Any failure is logged and leaves the partition empty.
    pub async fn read_from_file(&mut self) {
        self.data.clear();
        match self.load().await {
            Ok(count) => {
                debug!(partition = %self.name, rows = count, "loaded partition");
            }
            Err(err) => {
                self.data.clear();
                warn!(partition = %self.name, path = %self.path.display(), error = %err, "failed to read partition");
            }
        }
        self.dirty.store(false, Ordering::Release);
    }

    async fn load(&mut self) -> Result<usize> {
        let bytes = tokio::fs::read(&self.path).await?;

        let (rows, partition_key, last_update): (Vec<Row>, _, _) = if self.settings.compression.is_enabled() {
            let json = CompressedBlock::from_bytes(&bytes)?.decompress()?;
            let snapshot: SqueezedSnapshot = serde_json::from_slice(&json)?;
            (unsqueeze(&snapshot.rows)?, snapshot.partition_key, snapshot.last_update)
        } else {
            let snapshot: PartitionSnapshot = serde_json::from_slice(&bytes)?;
            let rows = snapshot.data.into_iter().map(|(_, row)| row).collect();
            (rows, snapshot.partition_key, snapshot.last_update)
        };

        for row in rows {
            let row = self.settings.codec.decode(row)?;
            let key = self.primary_key_of(&row)?;
            self.data.insert(key, row);
        }
        self.partition_key = partition_key;
        self.last_update = last_update;
        Ok(self.data.len())
    }

    /// Drop all rows and remove the backing file. A missing file is fine.
    pub async fn delete_file(&mut self) {
        self.data.clear();
        self.dirty.store(false, Ordering::Release);
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(partition = %self.name, "deleted partition file"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(partition = %self.name, "partition file was never written");
            }
            Err(err) => {
                error!(partition = %self.name, path = %self.path.display(), error = %err, "failed to delete partition file");
            }
        }
    }
}

pub(crate) fn primary_key_of(row: &Row, primary_key_field: &str) -> Result<RowKey> {
    match get_path(row, primary_key_field) {
        Some(value) if !value.is_null() => Ok(RowKey::from_value(value)),
        _ => Err(Error::new(
            ErrorKind::MissingPrimaryKey,
            format!("row has no value at {}", primary_key_field),
        )),
    }
}

struct WriteLockGuard(Arc<AtomicBool>);

impl Drop for WriteLockGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Serialized partition bytes on their way to disk. Holds the partition's
/// write lock until committed or dropped.
pub struct PendingWrite {
    pub partition: String,
    path: PathBuf,
    bytes: Vec<u8>,
    dirty: Arc<AtomicBool>,
    _guard: WriteLockGuard,
}

impl PendingWrite {
    pub async fn commit(self) -> WriteOutcome {
        match write_atomic(&self.path, &self.bytes).await {
            Ok(()) => {
                debug!(partition = %self.partition, bytes = self.bytes.len(), "wrote partition");
                WriteOutcome::Written
            }
            Err(err) => {
                self.dirty.store(true, Ordering::Release);
                error!(partition = %self.partition, path = %self.path.display(), error = %err, "failed to write partition");
                WriteOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::codec::{DropFieldsCodec, IdentityCodec};
    use serde_json::json;

    fn settings(compression: CompressionType) -> PartitionSettings {
        PartitionSettings {
            compression,
            pretty_json: true,
            codec: Arc::new(IdentityCodec),
        }
    }

    fn partition(path: PathBuf, compression: CompressionType) -> Partition {
        let key = PartitionKey::from_row(&json!({"season": 2023}), &["season".to_string()]);
        Partition::new(key.partition_name(), key, "id", path, settings(compression))
    }

    #[test]
    fn insert_checks_primary_keys() {
        let mut p = partition(PathBuf::from("unused.json"), CompressionType::None);
        assert_eq!(p.insert(json!([{"id": 1}, {"id": 2}])).unwrap(), 2);
        assert_eq!(p.insert(json!({"id": "3"})).unwrap(), 1);

        assert_eq!(p.insert(json!({"id": 1})).unwrap_err().kind, ErrorKind::DuplicatePrimaryKey);
        assert_eq!(p.insert(json!({"name": "x"})).unwrap_err().kind, ErrorKind::MissingPrimaryKey);
        assert_eq!(p.insert(json!({"id": null})).unwrap_err().kind, ErrorKind::MissingPrimaryKey);

        // no rollback of earlier rows in a failing batch
        assert!(p.insert(json!([{"id": 4}, {"id": 4}])).is_err());
        assert!(p.contains(&RowKey::Int(4)));
        assert_eq!(p.len(), 4);
    }

    #[test]
    fn update_requires_existing_row_and_strips_fields() {
        let mut p = partition(PathBuf::from("unused.json"), CompressionType::None);
        p.insert(json!({"id": 1, "v": 1})).unwrap();

        let drop = vec!["temp.score".to_string()];
        p.update(&json!({"id": 1, "v": 2, "temp": {"score": 9, "keep": 1}}), Some(&drop))
            .unwrap();
        assert_eq!(p.get(&RowKey::Int(1)).unwrap(), &json!({"id": 1, "v": 2, "temp": {"keep": 1}}));

        let err = p.update(&json!({"id": 2}), None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RowNotFound);
    }

    #[tokio::test]
    async fn write_then_read_restores_rows() {
        let dir = tempfile::tempdir().unwrap();
        for (compression, file) in [(CompressionType::None, "p.json"), (CompressionType::Zstd, "p.bin")] {
            let path = dir.path().join(file);
            let mut p = partition(path.clone(), compression);
            p.insert(json!([{"id": 1, "season": 2023, "a": {"b": [1, 2]}}, {"id": "k", "season": 2023}]))
                .unwrap();

            assert!(p.is_dirty());
            assert_eq!(p.write_to_file().await, WriteOutcome::Written);
            assert!(!p.is_dirty());
            assert_eq!(p.write_to_file().await, WriteOutcome::Clean);

            let mut fresh = partition(path, compression);
            fresh.read_from_file().await;
            assert!(!fresh.is_dirty());
            assert_eq!(fresh.len(), 2);
            assert_eq!(fresh.get(&RowKey::Int(1)), p.get(&RowKey::Int(1)));
            assert_eq!(fresh.get(&RowKey::from("k")), p.get(&RowKey::from("k")));
        }
    }

    #[tokio::test]
    async fn write_lock_blocks_a_second_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = partition(dir.path().join("p.json"), CompressionType::None);
        p.insert(json!({"id": 1})).unwrap();

        let pending = p.prepare_write().ok().unwrap();
        assert!(p.is_write_locked());
        assert_eq!(p.write_to_file().await, WriteOutcome::Locked);

        // mutation while the write is in flight
        p.insert(json!({"id": 2})).unwrap();
        assert_eq!(pending.commit().await, WriteOutcome::Written);
        assert!(!p.is_write_locked());
        assert!(p.is_dirty());
        assert_eq!(p.write_to_file().await, WriteOutcome::Written);
    }

    #[tokio::test]
    async fn failed_write_restores_dirty() {
        let dir = tempfile::tempdir().unwrap();
        // a regular file where the parent directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let mut p = partition(blocker.join("p.json"), CompressionType::None);
        p.insert(json!({"id": 1})).unwrap();
        assert_eq!(p.write_to_file().await, WriteOutcome::Failed);
        assert!(p.is_dirty());
        assert!(!p.is_write_locked());
    }

    #[tokio::test]
    async fn unreadable_file_leaves_partition_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        std::fs::write(&path, b"{not json").unwrap();

        let mut p = partition(path, CompressionType::None);
        p.insert(json!({"id": 1})).unwrap();
        p.read_from_file().await;
        assert!(p.is_empty());

        let mut missing = partition(dir.path().join("missing.json"), CompressionType::None);
        missing.read_from_file().await;
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn codec_strips_fields_on_disk_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        let mut settings = settings(CompressionType::None);
        settings.codec = Arc::new(DropFieldsCodec::new(["derived"]));

        let key = PartitionKey::default();
        let mut p = Partition::new("default".to_string(), key.clone(), "id", path.clone(), settings.clone());
        p.insert(json!({"id": 1, "derived": 42})).unwrap();
        p.write_to_file().await;
        assert_eq!(p.get(&RowKey::Int(1)).unwrap()["derived"], json!(42));

        let mut fresh = Partition::new("default".to_string(), key, "id", path, settings);
        fresh.read_from_file().await;
        assert_eq!(fresh.get(&RowKey::Int(1)).unwrap(), &json!({"id": 1}));
    }

    #[tokio::test]
    async fn delete_file_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        let mut p = partition(path.clone(), CompressionType::None);
        p.insert(json!({"id": 1})).unwrap();
        p.write_to_file().await;
        assert!(path.exists());

        p.delete_file().await;
        assert!(!path.exists());
        assert!(p.is_empty());
        p.delete_file().await;
    }
}
