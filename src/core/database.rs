use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use serde_json::Value;
use tracing::{info, warn};
use crate::compression::compress::CompressionType;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::join::criteria::JoinCriteria;
use crate::join::executor::{nested_join, JoinOptions, TableSource};
use crate::storage::layout::{write_atomic, StorageLayout};
use crate::table::connection::{JoinType, TableConnection};
use crate::table::table::{SaveReport, Table, TableSchema};

#[derive(Debug, Serialize, Deserialize)]
struct TableInfo {
    table_name: String,
    primary_key: String,
    #[serde(default)]
    partition_keys: Vec<String>,
    #[serde(default)]
    delete_key_list: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DatabaseMetadata {
    database_name: String,
    tables: Vec<TableInfo>,
    compression: CompressionType,
}

/// Owns the tables of one database directory.
#[derive(Debug)]
pub struct Database {
    config: Config,
    storage: StorageLayout,
    tables: BTreeMap<String, Table>,
}

impl Database {
    pub fn new(config: Config) -> Self {
        let storage = StorageLayout::new(&config.storage_path, &config.database_name);
        Database {
            config,
            storage,
            tables: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &StorageLayout {
        &self.storage
    }

    /// Create a table, or return the existing one with that name unchanged.
    pub fn add_table(&mut self, schema: TableSchema) -> &mut Table {
        let layout = self.storage.table(&schema.name);
        let compression = self.config.compression;
        let write_options = self.config.write_options();
        self.tables
            .entry(schema.name.clone())
            .or_insert_with(|| Table::new(schema, layout, compression, write_options))
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.table(name)
            .ok_or_else(|| Error::new(ErrorKind::TableNotFound, format!("no table named {}", name)))
    }

    pub fn get_table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::new(ErrorKind::TableNotFound, format!("no table named {}", name)))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Register `a -> b` with `join_type` and `b -> a` with its inverse.
    pub fn add_connection(&mut self, table_a: &str, table_b: &str, join_key: &str, join_type: JoinType) -> Result<()> {
        for name in [table_a, table_b] {
            if !self.tables.contains_key(name) {
                return Err(Error::new(
                    ErrorKind::ConnectionEndpointMissing,
                    format!("table does not exist for connection: {}", name),
                ));
            }
        }

        let connection = TableConnection::new(join_key, join_type);
        if let Some(table) = self.tables.get_mut(table_b) {
            table.add_connection(table_a, connection.inverse());
        }
        if let Some(table) = self.tables.get_mut(table_a) {
            table.add_connection(table_b, connection);
        }
        Ok(())
    }

    /// Run a join given as `{root_table: criteria}`.
    pub fn nested_join(&self, spec: &Value) -> Result<Value> {
        let (root, criteria) = JoinCriteria::parse_root(spec)?;
        self.join(&root, &criteria)
    }

    pub fn join(&self, root_table: &str, criteria: &JoinCriteria) -> Result<Value> {
        let options = JoinOptions {
            reroot: self.config.reroot_joins,
        };
        nested_join(self, root_table, criteria, options)
    }

    fn metadata(&self) -> DatabaseMetadata {
        DatabaseMetadata {
            database_name: self.config.database_name.clone(),
            tables: self
                .tables
                .values()
                .map(|table| TableInfo {
                    table_name: table.name.clone(),
                    primary_key: table.primary_key_field().to_string(),
                    partition_keys: table.partition_key_fields().to_vec(),
                    delete_key_list: table.delete_key_list().to_vec(),
                })
                .collect(),
            compression: self.config.compression,
        }
    }

    /// Write the database metadata, then every table.
    pub async fn save(&self) -> Result<BTreeMap<String, SaveReport>> {
        let metadata = self.metadata();
        let bytes = if self.config.pretty_json {
            serde_json::to_vec_pretty(&metadata)?
        } else {
            serde_json::to_vec(&metadata)?
        };
        write_atomic(&self.storage.metadata_path(), &bytes).await?;

        let mut reports = BTreeMap::new();
        for table in self.tables.values() {
            reports.insert(table.name.clone(), table.output_to_file().await);
        }
        info!(database = %self.config.database_name, tables = reports.len(), "saved database");
        Ok(reports)
    }

    /// Load every table listed in the database metadata. Tables already
    /// added keep their schema options (codec in particular) and are
    /// reloaded in place. Failures are logged and leave the database as is.
    pub async fn read_from_file(&mut self) {
        let path = self.storage.metadata_path();
        let metadata: DatabaseMetadata = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "unreadable database metadata");
                    return;
                }
            },
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read database metadata");
                return;
            }
        };

        for info in metadata.tables {
            let schema = TableSchema::new(info.table_name.clone(), info.primary_key)
                .partitioned_by(info.partition_keys)
                .dropping(info.delete_key_list);
            self.add_table(schema).read_from_file().await;
        }
        info!(database = %metadata.database_name, tables = self.tables.len(), "loaded database");
    }
}

impl TableSource for Database {
    fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }
}
