//! PostgreSQL introspection over deadpool-postgres.
//!
//! Column types come from `format_type`, so declarations read the way
//! `psql` prints them (`character varying(20)`, `integer[]`). Rows are
//! selected with every column cast to `text`, which yields PostgreSQL's
//! own literal formats (`{..}` arrays, `\x` bytea, offset timestamps).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use futures::{pin_mut, TryStreamExt};
use rustls::ClientConfig;
use tokio::sync::mpsc;
use tokio_postgres::config::SslMode;
use tokio_postgres::types::ToSql;
use tokio_postgres::Config as PgConfig;
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, info, warn};

use super::{InfoSchema, RowStream, ROW_CHANNEL_CAPACITY};
use crate::config::SourceConfig;
use crate::core::identifier::{qualify_pg, quote_pg};
use crate::core::schema::{
    CheckConstraint, ColumnInfo, Constraints, ForeignKeyInfo, IndexInfo, ReferentialAction,
    SchemaAndName, SourceType,
};
use crate::core::value::RawValue;
use crate::error::{MigrateError, Result};
use crate::typemap::SourceDialect;

/// PostgreSQL source.
pub struct PostgresInfoSchema {
    pool: Pool,
    schema: String,
}

impl PostgresInfoSchema {
    /// Connect using the source configuration.
    pub async fn new(config: &SourceConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.effective_port());
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let ssl_mode = config.ssl_mode.to_lowercase();
        let pool = match ssl_mode.as_str() {
            "disable" => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                pg_config.ssl_mode(SslMode::Disable);
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr)
                    .max_size(config.max_connections)
                    .build()
                    .map_err(|e| MigrateError::pool(e, "creating PostgreSQL source pool"))?
            }
            _ => {
                pg_config.ssl_mode(if ssl_mode == "prefer" {
                    SslMode::Prefer
                } else {
                    SslMode::Require
                });
                let tls_connector = MakeRustlsConnect::new(build_tls_config(&ssl_mode)?);
                let mgr = Manager::from_config(pg_config, tls_connector, mgr_config);
                Pool::builder(mgr)
                    .max_size(config.max_connections)
                    .build()
                    .map_err(|e| MigrateError::pool(e, "creating PostgreSQL source pool"))?
            }
        };

        // Test connection
        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "testing PostgreSQL source connection"))?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL source: {}:{}/{}",
            config.host,
            config.effective_port(),
            config.database
        );

        Ok(Self {
            pool,
            schema: config.effective_schema(),
        })
    }

    async fn client(&self, context: &str) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, context))
    }

    async fn read_rows(
        pool: Pool,
        table: SchemaAndName,
        columns: Vec<String>,
        tx: &mpsc::Sender<Result<Vec<RawValue>>>,
    ) -> Result<()> {
        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "getting connection for read_rows"))?;

        let select = columns
            .iter()
            .map(|c| {
                let quoted = quote_pg(c)?;
                Ok(format!("{0}::text AS {0}", quoted))
            })
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {}",
            select,
            qualify_pg(&table.schema, &table.name)?
        );
        debug!("{}: {}", table.full_name(), sql);

        let rows = client
            .query_raw(sql.as_str(), std::iter::empty::<&(dyn ToSql + Sync)>())
            .await?;
        pin_mut!(rows);
        while let Some(row) = rows.try_next().await? {
            let values = (0..columns.len())
                .map(|i| Ok(RawValue::from(row.try_get::<_, Option<String>>(i)?)))
                .collect::<Result<Vec<_>>>()?;
            if tx.send(Ok(values)).await.is_err() {
                break; // Receiver dropped
            }
        }
        Ok(())
    }
}

/// Build TLS configuration. Server certificates are always verified
/// against the webpki roots.
fn build_tls_config(ssl_mode: &str) -> Result<ClientConfig> {
    match ssl_mode {
        "prefer" | "require" | "verify-ca" | "verify-full" => {
            let mut root_store = rustls::RootCertStore::empty();
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            info!("ssl_mode={}: certificate verification enabled", ssl_mode);
            Ok(ClientConfig::builder()
                .with_root_certificates(Arc::new(root_store))
                .with_no_client_auth())
        }
        other => Err(MigrateError::Config(format!(
            "Invalid ssl_mode '{}'. Valid options: disable, prefer, require, verify-ca, verify-full",
            other
        ))),
    }
}

/// Report sequence-backed integer columns under their serial pseudo-type.
fn column_type(declared: &str, nextval_default: bool) -> SourceType {
    let name = match (declared, nextval_default) {
        ("smallint", true) => "smallserial",
        ("integer", true) => "serial",
        ("bigint", true) => "bigserial",
        _ => declared,
    };
    SourceType::parse(name)
}

/// Strip the `CHECK (...)` wrapper `pg_get_constraintdef` puts around the
/// expression.
fn check_expr(definition: &str) -> String {
    let inner = definition
        .trim()
        .strip_prefix("CHECK")
        .map(str::trim)
        .unwrap_or(definition.trim());
    let inner = inner.strip_suffix(" NOT VALID").unwrap_or(inner);
    match inner.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(stripped) => stripped.to_string(),
        None => inner.to_string(),
    }
}

#[async_trait]
impl InfoSchema for PostgresInfoSchema {
    fn dialect(&self) -> SourceDialect {
        SourceDialect::Postgres
    }

    async fn get_tables(&self) -> Result<Vec<SchemaAndName>> {
        let client = self.client("getting connection for get_tables").await?;
        let query = r#"
            SELECT table_schema, table_name
            FROM information_schema.tables
            WHERE table_type = 'BASE TABLE'
              AND table_schema = $1
            ORDER BY table_name
        "#;

        let rows = client.query(query, &[&self.schema]).await?;
        let tables: Vec<SchemaAndName> = rows
            .iter()
            .map(|row| SchemaAndName::new(row.get::<_, String>(0), row.get::<_, String>(1)))
            .collect();

        info!(
            "Found {} tables in PostgreSQL schema '{}'",
            tables.len(),
            self.schema
        );
        Ok(tables)
    }

    async fn get_columns(&self, table: &SchemaAndName) -> Result<Vec<ColumnInfo>> {
        let client = self.client("getting connection for get_columns").await?;
        let query = r#"
            SELECT
                a.attname,
                format_type(a.atttypid, a.atttypmod),
                NOT a.attnotnull,
                a.attidentity IN ('a', 'd'),
                COALESCE(pg_get_expr(d.adbin, d.adrelid), '') LIKE 'nextval(%',
                pg_get_expr(d.adbin, d.adrelid)
            FROM pg_catalog.pg_attribute a
            JOIN pg_catalog.pg_class t ON t.oid = a.attrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
            WHERE n.nspname = $1
              AND t.relname = $2
              AND a.attnum > 0
              AND NOT a.attisdropped
            ORDER BY a.attnum
        "#;

        let rows = client.query(query, &[&table.schema, &table.name]).await?;
        let columns: Vec<ColumnInfo> = rows
            .iter()
            .map(|row| {
                let is_identity: bool = row.get(3);
                let is_serial: bool = row.get(4);
                ColumnInfo {
                    name: row.get(0),
                    source_type: column_type(&row.get::<_, String>(1), is_serial),
                    nullable: row.get(2),
                    auto_increment: is_identity || is_serial,
                    default: if is_serial { None } else { row.get(5) },
                }
            })
            .collect();

        debug!(
            "Loaded {} columns for {}",
            columns.len(),
            table.full_name()
        );
        Ok(columns)
    }

    async fn get_constraints(&self, table: &SchemaAndName) -> Result<Constraints> {
        let client = self.client("getting connection for get_constraints").await?;
        let query = r#"
            SELECT
                a.attname,
                CASE c.contype WHEN 'p' THEN 'PRIMARY KEY' ELSE 'UNIQUE' END
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid
            WHERE n.nspname = $1
              AND t.relname = $2
              AND c.contype IN ('p', 'u')
              AND a.attnum = ANY(c.conkey)
            ORDER BY c.contype, c.conname, array_position(c.conkey, a.attnum)
        "#;

        let mut constraints = Constraints::default();
        for row in client.query(query, &[&table.schema, &table.name]).await? {
            let column: String = row.get(0);
            let kind: String = row.get(1);
            if kind == "PRIMARY KEY" {
                constraints.primary_keys.push(column);
            } else {
                constraints.by_column.entry(column).or_default().push(kind);
            }
        }

        let query = r#"
            SELECT c.conname, pg_get_constraintdef(c.oid)
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            WHERE n.nspname = $1 AND t.relname = $2 AND c.contype = 'c'
            ORDER BY c.conname
        "#;
        constraints.checks = client
            .query(query, &[&table.schema, &table.name])
            .await?
            .iter()
            .map(|row| CheckConstraint {
                name: row.get(0),
                expr: check_expr(&row.get::<_, String>(1)),
            })
            .collect();

        debug!(
            "Primary key for {}: {:?}",
            table.full_name(),
            constraints.primary_keys
        );
        Ok(constraints)
    }

    async fn get_foreign_keys(&self, table: &SchemaAndName) -> Result<Vec<ForeignKeyInfo>> {
        let client = self.client("getting connection for get_foreign_keys").await?;
        // One row per key part; unnest keeps the column pairs aligned.
        let query = r#"
            SELECT
                c.conname,
                rn.nspname,
                rt.relname,
                a.attname,
                ra.attname,
                c.confdeltype::text,
                c.confupdtype::text
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_class rt ON rt.oid = c.confrelid
            JOIN pg_catalog.pg_namespace rn ON rn.oid = rt.relnamespace
            CROSS JOIN LATERAL unnest(c.conkey, c.confkey) WITH ORDINALITY AS k(attnum, refnum, ord)
            JOIN pg_catalog.pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = k.attnum
            JOIN pg_catalog.pg_attribute ra ON ra.attrelid = c.confrelid AND ra.attnum = k.refnum
            WHERE n.nspname = $1
              AND t.relname = $2
              AND c.contype = 'f'
            ORDER BY c.conname, k.ord
        "#;

        let mut fk_map: BTreeMap<String, ForeignKeyInfo> = BTreeMap::new();
        for row in client.query(query, &[&table.schema, &table.name]).await? {
            let name: String = row.get(0);
            let fk = fk_map.entry(name.clone()).or_insert_with(|| ForeignKeyInfo {
                name,
                columns: Vec::new(),
                ref_schema: row.get(1),
                ref_table: row.get(2),
                ref_columns: Vec::new(),
                on_delete: ReferentialAction::parse(&row.get::<_, String>(5)),
                on_update: ReferentialAction::parse(&row.get::<_, String>(6)),
            });
            fk.columns.push(row.get(3));
            fk.ref_columns.push(row.get(4));
        }

        debug!(
            "Loaded {} foreign keys for {}",
            fk_map.len(),
            table.full_name()
        );
        Ok(fk_map.into_values().collect())
    }

    async fn get_indexes(&self, table: &SchemaAndName) -> Result<Vec<IndexInfo>> {
        let client = self.client("getting connection for get_indexes").await?;
        // Bit 0 of indoption marks a descending key part.
        let query = r#"
            SELECT
                i.relname,
                ix.indisunique,
                a.attname,
                (ix.indoption[k.i] & 1) = 1
            FROM pg_catalog.pg_index ix
            JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
            JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            CROSS JOIN LATERAL generate_subscripts(ix.indkey, 1) AS k(i)
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = ix.indkey[k.i]
            WHERE n.nspname = $1
              AND t.relname = $2
              AND NOT ix.indisprimary
            ORDER BY i.relname, k.i
        "#;

        let mut indexes: Vec<IndexInfo> = Vec::new();
        for row in client.query(query, &[&table.schema, &table.name]).await? {
            let name: String = row.get(0);
            let key: (String, bool) = (row.get(2), row.get(3));
            match indexes.last_mut() {
                Some(index) if index.name == name => index.keys.push(key),
                _ => indexes.push(IndexInfo {
                    name,
                    keys: vec![key],
                    unique: row.get(1),
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
        let client = self.client("getting connection for get_row_count").await?;
        let query = format!(
            "SELECT COUNT(*)::int8 FROM {}",
            qualify_pg(&table.schema, &table.name)?
        );
        let row = client.query_one(&query, &[]).await?;
        Ok(row.get::<_, i64>(0).max(0) as u64)
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
        self.pool.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_columns() {
        assert_eq!(column_type("integer", true).name, "serial");
        assert_eq!(column_type("bigint", true).name, "bigserial");
        assert_eq!(column_type("integer", false).name, "integer");
        let t = column_type("character varying(20)", false);
        assert_eq!(t.name, "character varying");
        assert_eq!(t.mods, vec![20]);
    }

    #[test]
    fn test_check_expr() {
        assert_eq!(check_expr("CHECK ((price > 0))"), "(price > 0)");
        assert_eq!(check_expr("CHECK (qty >= 0) NOT VALID"), "qty >= 0");
    }

    #[test]
    fn test_invalid_ssl_mode() {
        assert!(build_tls_config("sometimes").is_err());
    }
}
