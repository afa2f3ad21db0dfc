//! In-memory source loaded from a JSON dump document.
//!
//! The document describes tables the way an introspector would report them,
//! plus their rows as text literals (`null` for NULL):
//!
//! ```json
//! {
//!   "dialect": "mysql",
//!   "tables": [{
//!     "name": "users",
//!     "columns": [{"name": "id", "source_type": {"name": "bigint"}, "nullable": false}],
//!     "constraints": {"primary_keys": ["id"]},
//!     "rows": [["1"], ["2"]]
//!   }]
//! }
//! ```

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{InfoSchema, RowStream, ROW_CHANNEL_CAPACITY};
use crate::core::schema::{
    ColumnInfo, Constraints, ForeignKeyInfo, IndexInfo, SchemaAndName, SourceType,
};
use crate::core::value::RawValue;
use crate::error::{MigrateError, Result};
use crate::typemap::SourceDialect;

/// One table of a dump document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryTable {
    #[serde(default)]
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyInfo>,
    #[serde(default)]
    pub indexes: Vec<IndexInfo>,
    /// Rows in column order.
    #[serde(default)]
    pub rows: Vec<Vec<Option<String>>>,
}

impl MemoryTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a nullable column parsed from a type declaration.
    pub fn column(mut self, name: &str, decl: &str) -> Self {
        self.columns.push(ColumnInfo::new(name, SourceType::parse(decl)));
        self
    }

    /// Add a fully specified column.
    pub fn column_info(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.constraints.primary_keys = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn foreign_key(mut self, fk: ForeignKeyInfo) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    pub fn index(mut self, index: IndexInfo) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn row(mut self, values: &[Option<&str>]) -> Self {
        self.rows
            .push(values.iter().map(|v| v.map(str::to_string)).collect());
        self
    }

    fn identity(&self) -> SchemaAndName {
        SchemaAndName::new(self.schema.clone(), self.name.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Document {
    dialect: SourceDialect,
    tables: Vec<MemoryTable>,
}

/// Source backed by in-memory tables.
#[derive(Debug, Clone)]
pub struct MemoryInfoSchema {
    dialect: SourceDialect,
    tables: Vec<MemoryTable>,
}

impl MemoryInfoSchema {
    pub fn new(dialect: SourceDialect) -> Self {
        Self {
            dialect,
            tables: Vec::new(),
        }
    }

    pub fn with_table(mut self, table: MemoryTable) -> Self {
        self.tables.push(table);
        self
    }

    /// Parse a dump document.
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: Document = serde_json::from_str(json)?;
        Ok(Self {
            dialect: doc.dialect,
            tables: doc.tables,
        })
    }

    /// Load a dump document from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    fn table(&self, table: &SchemaAndName) -> Result<&MemoryTable> {
        self.tables
            .iter()
            .find(|t| t.schema == table.schema && t.name == table.name)
            .ok_or_else(|| MigrateError::Source(format!("no such table: {}", table.full_name())))
    }
}

#[async_trait]
impl InfoSchema for MemoryInfoSchema {
    fn dialect(&self) -> SourceDialect {
        self.dialect
    }

    async fn get_tables(&self) -> Result<Vec<SchemaAndName>> {
        Ok(self.tables.iter().map(MemoryTable::identity).collect())
    }

    async fn get_columns(&self, table: &SchemaAndName) -> Result<Vec<ColumnInfo>> {
        Ok(self.table(table)?.columns.clone())
    }

    async fn get_constraints(&self, table: &SchemaAndName) -> Result<Constraints> {
        Ok(self.table(table)?.constraints.clone())
    }

    async fn get_foreign_keys(&self, table: &SchemaAndName) -> Result<Vec<ForeignKeyInfo>> {
        Ok(self.table(table)?.foreign_keys.clone())
    }

    async fn get_indexes(&self, table: &SchemaAndName) -> Result<Vec<IndexInfo>> {
        Ok(self.table(table)?.indexes.clone())
    }

    async fn get_row_count(&self, table: &SchemaAndName) -> Result<u64> {
        Ok(self.table(table)?.rows.len() as u64)
    }

    fn get_rows_from_table(&self, table: &SchemaAndName, columns: &[String]) -> RowStream {
        let (tx, rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);
        let found = self.table(table).map(|t| {
            let positions: Vec<Option<usize>> = columns
                .iter()
                .map(|c| t.columns.iter().position(|col| &col.name == c))
                .collect();
            (positions, t.rows.clone())
        });

        tokio::spawn(async move {
            let (positions, rows) = match found {
                Ok(found) => found,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };
            for row in rows {
                let raw = positions
                    .iter()
                    .map(|pos| {
                        pos.and_then(|i| row.get(i).cloned().flatten())
                            .map(RawValue::Text)
                            .unwrap_or(RawValue::Null)
                    })
                    .collect();
                if tx.send(Ok(raw)).await.is_err() {
                    return;
                }
            }
        });
        rx
    }
}
