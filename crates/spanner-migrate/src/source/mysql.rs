//! MySQL/MariaDB introspection over sqlx.
//!
//! Metadata comes from INFORMATION_SCHEMA. Rows are read as text: every
//! column is cast to CHAR except binary ones, which are hex-encoded as
//! `0x...` literals so the row converter sees one uniform format.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::Row;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{InfoSchema, RowStream, ROW_CHANNEL_CAPACITY};
use crate::config::SourceConfig;
use crate::core::identifier::{qualify_mysql, quote_mysql};
use crate::core::schema::{
    CheckConstraint, ColumnInfo, Constraints, ForeignKeyInfo, IndexInfo, ReferentialAction,
    SchemaAndName, SourceType,
};
use crate::core::value::RawValue;
use crate::error::{MigrateError, Result};
use crate::typemap::SourceDialect;

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Data types read as hex literals instead of text.
const BINARY_TYPES: &[&str] = &[
    "binary", "varbinary", "tinyblob", "blob", "mediumblob", "longblob", "bit",
];

/// MySQL/MariaDB source.
pub struct MysqlInfoSchema {
    pool: MySqlPool,
    database: String,
}

impl MysqlInfoSchema {
    /// Connect using the source configuration.
    pub async fn new(config: &SourceConfig) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.effective_port())
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(MySqlSslMode::Preferred);

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections as u32)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::pool(e, "creating MySQL source pool"))?;

        // Test connection
        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| MigrateError::pool(e, "testing MySQL source connection"))?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            config.host,
            config.effective_port(),
            config.database
        );

        Ok(Self {
            pool,
            database: config.effective_schema(),
        })
    }

    /// DATA_TYPE of each column, keyed by column name.
    async fn data_types(pool: &MySqlPool, table: &SchemaAndName) -> Result<BTreeMap<String, String>> {
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(DATA_TYPE AS CHAR(255)) AS DATA_TYPE
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        "#;
        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| {
                (
                    row.get::<String, _>("COLUMN_NAME"),
                    row.get::<String, _>("DATA_TYPE").to_lowercase(),
                )
            })
            .collect())
    }

    async fn read_rows(
        pool: MySqlPool,
        table: SchemaAndName,
        columns: Vec<String>,
        tx: &mpsc::Sender<Result<Vec<RawValue>>>,
    ) -> Result<()> {
        let types = Self::data_types(&pool, &table).await?;
        let select = columns
            .iter()
            .map(|c| {
                let data_type = types.get(c).map(String::as_str).unwrap_or("");
                Ok(select_expr(&quote_mysql(c)?, data_type))
            })
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let query = format!(
            "SELECT {} FROM {}",
            select,
            qualify_mysql(&table.schema, &table.name)?
        );
        debug!("{}: {}", table.full_name(), query);

        let mut rows = sqlx::query(&query).fetch(&pool);
        while let Some(row) = rows.try_next().await? {
            let values = (0..columns.len())
                .map(|i| Ok(RawValue::from(row.try_get::<Option<String>, _>(i)?)))
                .collect::<Result<Vec<_>>>()?;
            if tx.send(Ok(values)).await.is_err() {
                break; // Receiver dropped
            }
        }
        Ok(())
    }
}

/// Select expression reading a column as text.
fn select_expr(quoted: &str, data_type: &str) -> String {
    if BINARY_TYPES.contains(&data_type) {
        format!("CONCAT('0x', HEX({0})) AS {0}", quoted)
    } else {
        format!("CAST({0} AS CHAR) AS {0}", quoted)
    }
}

#[async_trait]
impl InfoSchema for MysqlInfoSchema {
    fn dialect(&self) -> SourceDialect {
        SourceDialect::Mysql
    }

    async fn get_tables(&self) -> Result<Vec<SchemaAndName>> {
        // CAST to CHAR to handle collation differences where information_schema
        // may return VARBINARY instead of VARCHAR
        let query = r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .fetch_all(&self.pool)
            .await?;

        let tables: Vec<SchemaAndName> = rows
            .iter()
            .map(|row| SchemaAndName::new(self.database.clone(), row.get::<String, _>("TABLE_NAME")))
            .collect();
        info!(
            "Found {} tables in MySQL schema '{}'",
            tables.len(),
            self.database
        );
        Ok(tables)
    }

    async fn get_columns(&self, table: &SchemaAndName) -> Result<Vec<ColumnInfo>> {
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(COLUMN_TYPE AS CHAR(255)) AS COLUMN_TYPE,
                IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable,
                IF(EXTRA LIKE '%auto_increment%', 1, 0) AS is_identity,
                CAST(COLUMN_DEFAULT AS CHAR(4000)) AS COLUMN_DEFAULT
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.get("COLUMN_NAME"),
                source_type: SourceType::parse(&row.get::<String, _>("COLUMN_TYPE").to_lowercase()),
                nullable: row.get::<i32, _>("is_nullable") == 1,
                auto_increment: row.get::<i32, _>("is_identity") == 1,
                default: row.get("COLUMN_DEFAULT"),
            })
            .collect())
    }

    async fn get_constraints(&self, table: &SchemaAndName) -> Result<Constraints> {
        let query = r#"
            SELECT
                CAST(kcu.COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(tc.CONSTRAINT_TYPE AS CHAR(64)) AS CONSTRAINT_TYPE
            FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
                ON tc.CONSTRAINT_SCHEMA = kcu.CONSTRAINT_SCHEMA
                AND tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
                AND tc.TABLE_NAME = kcu.TABLE_NAME
            WHERE tc.TABLE_SCHEMA = ? AND tc.TABLE_NAME = ?
              AND tc.CONSTRAINT_TYPE IN ('PRIMARY KEY', 'UNIQUE')
            ORDER BY tc.CONSTRAINT_TYPE, kcu.ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await?;

        let mut constraints = Constraints::default();
        for row in rows {
            let column: String = row.get("COLUMN_NAME");
            let kind: String = row.get("CONSTRAINT_TYPE");
            if kind == "PRIMARY KEY" {
                constraints.primary_keys.push(column);
            } else {
                constraints.by_column.entry(column).or_default().push(kind);
            }
        }

        // MySQL 8.0+ exposes check constraints; older servers lack the view.
        let query = r#"
            SELECT
                CAST(cc.CONSTRAINT_NAME AS CHAR(255)) AS CONSTRAINT_NAME,
                CAST(cc.CHECK_CLAUSE AS CHAR(4000)) AS CHECK_CLAUSE
            FROM INFORMATION_SCHEMA.CHECK_CONSTRAINTS cc
            JOIN INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
                ON cc.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA
                AND cc.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
            WHERE tc.TABLE_SCHEMA = ? AND tc.TABLE_NAME = ?
              AND tc.CONSTRAINT_TYPE = 'CHECK'
            ORDER BY cc.CONSTRAINT_NAME
        "#;
        let result: std::result::Result<Vec<MySqlRow>, _> = sqlx::query(query)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await;
        match result {
            Ok(rows) => {
                constraints.checks = rows
                    .iter()
                    .map(|row| CheckConstraint {
                        name: row.get("CONSTRAINT_NAME"),
                        expr: row.get("CHECK_CLAUSE"),
                    })
                    .collect();
            }
            Err(e) => debug!("{}: no check constraints: {}", table.full_name(), e),
        }

        Ok(constraints)
    }

    async fn get_foreign_keys(&self, table: &SchemaAndName) -> Result<Vec<ForeignKeyInfo>> {
        let query = r#"
            SELECT
                CAST(rc.CONSTRAINT_NAME AS CHAR(255)) AS CONSTRAINT_NAME,
                CAST(kcu.COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(kcu.REFERENCED_TABLE_SCHEMA AS CHAR(255)) AS REFERENCED_TABLE_SCHEMA,
                CAST(kcu.REFERENCED_TABLE_NAME AS CHAR(255)) AS REFERENCED_TABLE_NAME,
                CAST(kcu.REFERENCED_COLUMN_NAME AS CHAR(255)) AS REFERENCED_COLUMN_NAME,
                CAST(rc.DELETE_RULE AS CHAR(64)) AS DELETE_RULE,
                CAST(rc.UPDATE_RULE AS CHAR(64)) AS UPDATE_RULE
            FROM INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS rc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
                ON rc.CONSTRAINT_SCHEMA = kcu.CONSTRAINT_SCHEMA
                AND rc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
                AND rc.TABLE_NAME = kcu.TABLE_NAME
            WHERE rc.CONSTRAINT_SCHEMA = ? AND rc.TABLE_NAME = ?
            ORDER BY rc.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await?;

        // Group by constraint name
        let mut fk_map: BTreeMap<String, ForeignKeyInfo> = BTreeMap::new();
        for row in rows {
            let name: String = row.get("CONSTRAINT_NAME");
            let fk = fk_map.entry(name.clone()).or_insert_with(|| ForeignKeyInfo {
                name,
                columns: Vec::new(),
                ref_schema: row.get("REFERENCED_TABLE_SCHEMA"),
                ref_table: row.get("REFERENCED_TABLE_NAME"),
                ref_columns: Vec::new(),
                on_delete: ReferentialAction::parse(&row.get::<String, _>("DELETE_RULE")),
                on_update: ReferentialAction::parse(&row.get::<String, _>("UPDATE_RULE")),
            });
            fk.columns.push(row.get("COLUMN_NAME"));
            fk.ref_columns.push(row.get("REFERENCED_COLUMN_NAME"));
        }

        debug!(
            "Loaded {} foreign keys for {}",
            fk_map.len(),
            table.full_name()
        );
        Ok(fk_map.into_values().collect())
    }

    async fn get_indexes(&self, table: &SchemaAndName) -> Result<Vec<IndexInfo>> {
        // COLLATION is 'D' for descending key parts on MySQL 8.0+.
        let query = r#"
            SELECT
                CAST(INDEX_NAME AS CHAR(255)) AS INDEX_NAME,
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                IF(NON_UNIQUE = 0, 1, 0) AS is_unique,
                IF(COLLATION = 'D', 1, 0) AS is_desc
            FROM INFORMATION_SCHEMA.STATISTICS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
              AND INDEX_NAME != 'PRIMARY'
              AND COLUMN_NAME IS NOT NULL
            ORDER BY INDEX_NAME, SEQ_IN_INDEX
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await?;

        let mut indexes: Vec<IndexInfo> = Vec::new();
        for row in rows {
            let name: String = row.get("INDEX_NAME");
            let key: (String, bool) = (row.get("COLUMN_NAME"), row.get::<i32, _>("is_desc") == 1);
            match indexes.last_mut() {
                Some(index) if index.name == name => index.keys.push(key),
                _ => indexes.push(IndexInfo {
                    name,
                    keys: vec![key],
                    unique: row.get::<i32, _>("is_unique") == 1,
                }),
            }
        }

        debug!(
            "Loaded {} indexes for {}",
            indexes.len(),
            table.full_name()
        );
        Ok(indexes)
    }

    async fn get_row_count(&self, table: &SchemaAndName) -> Result<u64> {
        let query = format!(
            "SELECT COUNT(*) AS cnt FROM {}",
            qualify_mysql(&table.schema, &table.name)?
        );
        let row: MySqlRow = sqlx::query(&query).fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>("cnt").max(0) as u64)
    }

    fn get_rows_from_table(&self, table: &SchemaAndName, columns: &[String]) -> RowStream {
        let (tx, rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);
        let pool = self.pool.clone();
        let table = table.clone();
        let columns = columns.to_vec();

        tokio::spawn(async move {
            let name = table.full_name();
            if let Err(e) = Self::read_rows(pool, table, columns, &tx).await {
                let _ = tx
                    .send(Err(MigrateError::Source(format!("{}: {}", name, e))))
                    .await;
            }
        });

        rx
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_expr() {
        assert_eq!(select_expr("`name`", "varchar"), "CAST(`name` AS CHAR) AS `name`");
        assert_eq!(
            select_expr("`photo`", "longblob"),
            "CONCAT('0x', HEX(`photo`)) AS `photo`"
        );
        assert_eq!(select_expr("`flags`", "bit"), "CONCAT('0x', HEX(`flags`)) AS `flags`");
    }
}
