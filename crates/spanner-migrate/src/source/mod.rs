//! Source introspection.
//!
//! One [`InfoSchema`] implementation per source dialect enumerates tables,
//! columns, keys and indexes, and streams rows as [`RawValue`]s. Capabilities
//! a dialect lacks (change data capture, streaming) fail with the
//! [`MigrateError::Unsupported`] sentinel.

pub mod csv;
pub mod memory;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use self::csv::CsvInfoSchema;
pub use self::memory::MemoryInfoSchema;
#[cfg(feature = "mysql")]
pub use self::mysql::MysqlInfoSchema;
#[cfg(feature = "postgres")]
pub use self::postgres::PostgresInfoSchema;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::conv::Conv;
use crate::convert::{process_data_row, ConvertedRow};
use crate::core::schema::{ColumnInfo, Constraints, ForeignKeyInfo, IndexInfo, SchemaAndName};
use crate::core::value::RawValue;
use crate::error::{MigrateError, Result};
use crate::typemap::SourceDialect;

/// Channel capacity of row streams.
pub const ROW_CHANNEL_CAPACITY: usize = 1024;

/// Rows of one table, in the column order requested.
pub type RowStream = mpsc::Receiver<Result<Vec<RawValue>>>;

/// Where change data capture should start from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCaptureStart {
    pub dialect: SourceDialect,
    /// Dialect-specific position (binlog coordinates, LSN, ...).
    pub position: String,
}

/// Destination of converted rows.
#[async_trait]
pub trait RowSink: Send {
    async fn write_row(&mut self, row: ConvertedRow) -> Result<()>;
}

/// Sink that keeps every row in memory.
#[derive(Debug, Default)]
pub struct CollectSink {
    pub rows: Vec<ConvertedRow>,
}

#[async_trait]
impl RowSink for CollectSink {
    async fn write_row(&mut self, row: ConvertedRow) -> Result<()> {
        self.rows.push(row);
        Ok(())
    }
}

/// Introspect a source database and stream its rows.
#[async_trait]
pub trait InfoSchema: Send + Sync {
    /// The source dialect.
    fn dialect(&self) -> SourceDialect;

    /// List user tables.
    async fn get_tables(&self) -> Result<Vec<SchemaAndName>>;

    /// Columns of a table in declared order.
    async fn get_columns(&self, table: &SchemaAndName) -> Result<Vec<ColumnInfo>>;

    /// Primary key (in key ordinal order), checks and per-column constraints.
    async fn get_constraints(&self, table: &SchemaAndName) -> Result<Constraints>;

    /// Foreign keys of a table.
    async fn get_foreign_keys(&self, table: &SchemaAndName) -> Result<Vec<ForeignKeyInfo>>;

    /// Secondary indexes of a table.
    async fn get_indexes(&self, table: &SchemaAndName) -> Result<Vec<IndexInfo>>;

    /// Row count of a table (may be an estimate).
    async fn get_row_count(&self, table: &SchemaAndName) -> Result<u64>;

    /// Start streaming rows of `table` with values in `columns` order.
    ///
    /// A background task fills the channel; errors are sent through it.
    fn get_rows_from_table(&self, table: &SchemaAndName, columns: &[String]) -> RowStream;

    /// Stream every row of `table_id` through the row converter into `sink`.
    async fn process_data(
        &self,
        conv: &mut Conv,
        table_id: &str,
        sink: &mut dyn RowSink,
    ) -> Result<()> {
        let src = conv
            .src_schema
            .get(table_id)
            .ok_or_else(|| MigrateError::schema(table_id, "unknown source table"))?;
        let table = SchemaAndName::new(src.schema.clone(), src.name.clone());
        let columns: Vec<String> = src.ordered_columns().map(|c| c.name.clone()).collect();

        info!("{}: streaming rows", table.full_name());
        let mut rows = self.get_rows_from_table(&table, &columns);
        while let Some(row) = rows.recv().await {
            process_data_row(conv, table_id, &columns, &row?, sink).await?;
        }
        Ok(())
    }

    /// Record the current change-capture position.
    async fn start_change_data_capture(&self, _conv: &mut Conv) -> Result<ChangeCaptureStart> {
        Err(MigrateError::unsupported(
            self.dialect().name(),
            "change data capture",
        ))
    }

    /// Apply changes from `start` onward.
    async fn start_streaming_migration(
        &self,
        _conv: &mut Conv,
        _start: &ChangeCaptureStart,
    ) -> Result<()> {
        Err(MigrateError::unsupported(
            self.dialect().name(),
            "streaming migration",
        ))
    }

    /// Release connections.
    async fn close(&self) {}
}

