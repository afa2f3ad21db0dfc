//! CSV source driven by a JSON manifest.
//!
//! CSV files carry no schema, so a manifest names each table, its file and
//! its typed columns:
//!
//! ```json
//! [{
//!   "table_name": "users",
//!   "file_path": "users.csv",
//!   "columns": [{"column_name": "id", "type_name": "int64", "not_null": true}],
//!   "primary_keys": ["id"]
//! }]
//! ```
//!
//! Relative file paths resolve against the manifest's directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::{InfoSchema, RowStream, ROW_CHANNEL_CAPACITY};
use crate::core::schema::{
    ColumnInfo, Constraints, ForeignKeyInfo, IndexInfo, SchemaAndName, SourceType,
};
use crate::core::value::RawValue;
use crate::error::{MigrateError, Result};
use crate::typemap::SourceDialect;

/// Column entry of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvColumn {
    pub column_name: String,
    pub type_name: String,
    #[serde(default)]
    pub not_null: bool,
}

/// Table entry of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvTable {
    pub table_name: String,
    pub file_path: PathBuf,
    pub columns: Vec<CsvColumn>,
    #[serde(default)]
    pub primary_keys: Vec<String>,
}

/// Source reading one CSV file per table.
#[derive(Debug, Clone)]
pub struct CsvInfoSchema {
    tables: Vec<CsvTable>,
    delimiter: u8,
    has_headers: bool,
}

impl CsvInfoSchema {
    pub fn new(tables: Vec<CsvTable>) -> Self {
        Self {
            tables,
            delimiter: b',',
            has_headers: true,
        }
    }

    /// Load a manifest file, resolving relative paths against its directory.
    pub fn from_manifest<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut tables: Vec<CsvTable> = serde_json::from_str(&content)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for table in &mut tables {
            if table.file_path.is_relative() {
                table.file_path = base.join(&table.file_path);
            }
        }
        Ok(Self::new(tables))
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    fn table(&self, table: &SchemaAndName) -> Result<&CsvTable> {
        self.tables
            .iter()
            .find(|t| t.table_name == table.name)
            .ok_or_else(|| MigrateError::Source(format!("no manifest entry for {}", table.name)))
    }

    fn reader(&self, path: &Path) -> Result<csv::Reader<std::fs::File>> {
        Ok(csv::ReaderBuilder::new()
            .has_headers(self.has_headers)
            .delimiter(self.delimiter)
            .from_path(path)?)
    }
}

/// Read every record of `path`, projecting `columns`.
fn read_rows(
    mut reader: csv::Reader<std::fs::File>,
    has_headers: bool,
    table: &CsvTable,
    columns: &[String],
    tx: &mpsc::Sender<Result<Vec<RawValue>>>,
) -> Result<()> {
    let names: Vec<String> = if has_headers {
        reader.headers()?.iter().map(|h| h.trim().to_string()).collect()
    } else {
        table.columns.iter().map(|c| c.column_name.clone()).collect()
    };
    let positions = columns
        .iter()
        .map(|c| {
            names.iter().position(|n| n == c).ok_or_else(|| {
                MigrateError::Source(format!("{}: column {} not in file", table.table_name, c))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    for record in reader.records() {
        let record = record?;
        let row = positions
            .iter()
            .map(|&i| match record.get(i) {
                Some(field) => RawValue::Text(field.to_string()),
                None => RawValue::Null,
            })
            .collect();
        if tx.blocking_send(Ok(row)).is_err() {
            debug!("{}: row receiver dropped", table.table_name);
            break;
        }
    }
    Ok(())
}

#[async_trait]
impl InfoSchema for CsvInfoSchema {
    fn dialect(&self) -> SourceDialect {
        SourceDialect::Csv
    }

    async fn get_tables(&self) -> Result<Vec<SchemaAndName>> {
        Ok(self
            .tables
            .iter()
            .map(|t| SchemaAndName::new("", t.table_name.clone()))
            .collect())
    }

    async fn get_columns(&self, table: &SchemaAndName) -> Result<Vec<ColumnInfo>> {
        Ok(self
            .table(table)?
            .columns
            .iter()
            .map(|c| {
                let info = ColumnInfo::new(c.column_name.clone(), SourceType::parse(&c.type_name));
                if c.not_null {
                    info.not_null()
                } else {
                    info
                }
            })
            .collect())
    }

    async fn get_constraints(&self, table: &SchemaAndName) -> Result<Constraints> {
        Ok(Constraints {
            primary_keys: self.table(table)?.primary_keys.clone(),
            ..Constraints::default()
        })
    }

    async fn get_foreign_keys(&self, _table: &SchemaAndName) -> Result<Vec<ForeignKeyInfo>> {
        Ok(Vec::new())
    }

    async fn get_indexes(&self, _table: &SchemaAndName) -> Result<Vec<IndexInfo>> {
        Ok(Vec::new())
    }

    async fn get_row_count(&self, table: &SchemaAndName) -> Result<u64> {
        let path = self.table(table)?.file_path.clone();
        let mut reader = self.reader(&path)?;
        tokio::task::spawn_blocking(move || {
            let mut count = 0u64;
            for record in reader.records() {
                record?;
                count += 1;
            }
            Ok::<u64, MigrateError>(count)
        })
        .await
        .map_err(|e| MigrateError::Task(e.to_string()))?
    }

    fn get_rows_from_table(&self, table: &SchemaAndName, columns: &[String]) -> RowStream {
        let (tx, rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);
        let opened = self
            .table(table)
            .cloned()
            .and_then(|t| Ok((self.reader(&t.file_path)?, t)));
        let has_headers = self.has_headers;
        let columns = columns.to_vec();

        tokio::task::spawn_blocking(move || {
            let result = opened
                .and_then(|(reader, table)| read_rows(reader, has_headers, &table, &columns, &tx));
            if let Err(e) = result {
                let _ = tx.blocking_send(Err(e));
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, CsvInfoSchema) {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join("users.csv")).unwrap();
        writeln!(file, "name,id").unwrap();
        writeln!(file, "alice,1").unwrap();
        writeln!(file, "\"bob, jr\",2").unwrap();

        let manifest = r#"[{
            "table_name": "users",
            "file_path": "users.csv",
            "columns": [
                {"column_name": "id", "type_name": "int64", "not_null": true},
                {"column_name": "name", "type_name": "string(40)"}
            ],
            "primary_keys": ["id"]
        }]"#;
        let manifest_path = dir.path().join("manifest.json");
        std::fs::write(&manifest_path, manifest).unwrap();
        let source = CsvInfoSchema::from_manifest(&manifest_path).unwrap();
        (dir, source)
    }

    #[tokio::test]
    async fn test_manifest_introspection() {
        let (_dir, source) = fixture();
        let table = SchemaAndName::new("", "users");
        let cols = source.get_columns(&table).await.unwrap();
        assert_eq!(cols.len(), 2);
        assert!(!cols[0].nullable);
        assert_eq!(cols[1].source_type.mods, vec![40]);
        let constraints = source.get_constraints(&table).await.unwrap();
        assert_eq!(constraints.primary_keys, vec!["id".to_string()]);
        assert_eq!(source.get_row_count(&table).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rows_follow_requested_order() {
        let (_dir, source) = fixture();
        let table = SchemaAndName::new("", "users");
        let mut rows = source.get_rows_from_table(&table, &["id".to_string(), "name".to_string()]);
        assert_eq!(
            rows.recv().await.unwrap().unwrap(),
            vec![RawValue::from("1"), RawValue::from("alice")]
        );
        assert_eq!(
            rows.recv().await.unwrap().unwrap(),
            vec![RawValue::from("2"), RawValue::from("bob, jr")]
        );
        assert!(rows.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_column_is_an_error() {
        let (_dir, source) = fixture();
        let table = SchemaAndName::new("", "users");
        let mut rows = source.get_rows_from_table(&table, &["email".to_string()]);
        let err = rows.recv().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("email"));
    }
}
