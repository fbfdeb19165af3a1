use std::path::{Path, PathBuf};
use uuid::Uuid;
use crate::compression::compress::CompressionType;
use crate::core::error::Result;

/// Directory structure for a database
///
/// ```text
/// <root>/<db>/_<db>.json                 database metadata
/// <root>/<db>/<table>/_<table>.json      table metadata
/// <root>/<db>/<table>/<partition>.json   plain partition
/// <root>/<db>/<table>/<partition>.bin    compressed partition
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,      // <root>/<db>
    pub database_name: String,
}

impl StorageLayout {
    pub fn new(root: impl AsRef<Path>, database_name: &str) -> Self {
        StorageLayout {
            base_dir: root.as_ref().join(database_name),
            database_name: database_name.to_string(),
        }
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.base_dir.join(format!("_{}.json", self.database_name))
    }

    pub fn table(&self, table_name: &str) -> TableLayout {
        TableLayout::new(self.base_dir.join(escape_file_name(table_name)), table_name)
    }
}

/// Files of one table
#[derive(Debug, Clone, PartialEq)]
pub struct TableLayout {
    pub table_dir: PathBuf,
    pub table_name: String,
}

impl TableLayout {
    pub fn new(table_dir: PathBuf, table_name: &str) -> Self {
        TableLayout {
            table_dir,
            table_name: table_name.to_string(),
        }
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.table_dir.join(format!("_{}.json", escape_file_name(&self.table_name)))
    }

    pub fn partition_path(&self, partition_name: &str, compression: CompressionType) -> PathBuf {
        let extension = if compression.is_enabled() { "bin" } else { "json" };
        self.table_dir
            .join(format!("{}.{}", escape_file_name(partition_name), extension))
    }
}

/// Unique sibling used for temp-then-rename writes.
pub fn temp_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", Uuid::new_v4()));
    target.with_file_name(name)
}

/// Write to a unique temp file, then rename over the target.
/// The temp file is removed if the rename fails.
pub async fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = temp_path(target);
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(err) = tokio::fs::rename(&tmp, target).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err.into());
    }
    Ok(())
}

/// Partition names embed raw field values; keep them inside one directory.
pub fn escape_file_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for (i, c) in name.chars().enumerate() {
        match c {
            '.' if i == 0 => escaped.push_str("%2E"),
            '%' => escaped.push_str("%25"),
            '/' => escaped.push_str("%2F"),
            '\\' => escaped.push_str("%5C"),
            '\0' => escaped.push_str("%00"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_the_layout() {
        let layout = StorageLayout::new("/tmp/root", "league_db");
        assert_eq!(layout.metadata_path(), PathBuf::from("/tmp/root/league_db/_league_db.json"));

        let table = layout.table("team_season");
        assert_eq!(
            table.metadata_path(),
            PathBuf::from("/tmp/root/league_db/team_season/_team_season.json")
        );
        assert_eq!(
            table.partition_path("season_2023", CompressionType::None),
            PathBuf::from("/tmp/root/league_db/team_season/season_2023.json")
        );
        assert_eq!(
            table.partition_path("season_2023", CompressionType::Zstd),
            PathBuf::from("/tmp/root/league_db/team_season/season_2023.bin")
        );
    }

    #[test]
    fn separators_are_escaped() {
        assert_eq!(escape_file_name("city_a/b"), "city_a%2Fb");
        assert_eq!(escape_file_name("100%"), "100%25");
        assert_eq!(escape_file_name("..\\x"), "%2E.%5Cx");
    }

    #[test]
    fn leading_dots_are_escaped() {
        assert_eq!(escape_file_name("."), "%2E");
        assert_eq!(escape_file_name(".."), "%2E.");
        assert_eq!(escape_file_name("city_.5"), "city_.5");

        let layout = StorageLayout::new("/tmp/root", "league_db");
        assert_eq!(layout.table("..").table_dir, PathBuf::from("/tmp/root/league_db/%2E."));
        assert_eq!(
            layout.table("team").partition_path(".", CompressionType::None),
            PathBuf::from("/tmp/root/league_db/team/%2E.json")
        );
    }

    #[test]
    fn temp_paths_are_unique_siblings() {
        let target = PathBuf::from("/tmp/t/default.json");
        let a = temp_path(&target);
        let b = temp_path(&target);
        assert_ne!(a, b);
        assert_eq!(a.parent(), target.parent());
        assert!(a.to_string_lossy().ends_with(".tmp"));
    }

    #[tokio::test]
    async fn write_atomic_replaces_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("file.json");
        write_atomic(&target, b"one").await.unwrap();
        write_atomic(&target, b"two").await.unwrap();
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"two");

        let leftovers = std::fs::read_dir(target.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
