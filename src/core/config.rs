use std::path::PathBuf;
use std::time::Duration;
use crate::compression::compress::CompressionType;

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_path: PathBuf,
    pub database_name: String,

    // Default for tables that don't override it
    pub compression: CompressionType,
    pub pretty_json: bool,

    // Partition write-lock wait: initial delay grows by `factor` per attempt
    pub write_lock_attempts: u32,
    pub write_lock_initial_backoff: Duration,
    pub write_lock_backoff_factor: f64,

    // Run the selectivity pass before the final join pass
    pub reroot_joins: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: PathBuf::from("./data"),
            database_name: "db".to_string(),
            compression: CompressionType::None,
            pretty_json: true,
            write_lock_attempts: 10,
            write_lock_initial_backoff: Duration::from_millis(50),
            write_lock_backoff_factor: 1.5,
            reroot_joins: true,
        }
    }
}

impl Config {
    pub fn new(storage_path: impl Into<PathBuf>, database_name: impl Into<String>) -> Self {
        Config {
            storage_path: storage_path.into(),
            database_name: database_name.into(),
            ..Config::default()
        }
    }

    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_write_lock_backoff(mut self, attempts: u32, initial: Duration, factor: f64) -> Self {
        self.write_lock_attempts = attempts;
        self.write_lock_initial_backoff = initial;
        self.write_lock_backoff_factor = factor;
        self
    }

    pub fn with_reroot_joins(mut self, enabled: bool) -> Self {
        self.reroot_joins = enabled;
        self
    }

    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            pretty_json: self.pretty_json,
            lock_attempts: self.write_lock_attempts,
            initial_backoff: self.write_lock_initial_backoff,
            backoff_factor: self.write_lock_backoff_factor,
        }
    }
}

/// Persistence knobs a table carries once it is detached from the database config.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub pretty_json: bool,
    pub lock_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_factor: f64,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Config::default().write_options()
    }
}
