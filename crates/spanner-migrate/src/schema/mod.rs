//! Schema processing: introspect a source into the conversion state and
//! derive the target schema from it.
//!
//! Introspection runs per table with bounded concurrency; ids are assigned
//! afterwards in source table order so the same source always yields the
//! same ids.

mod target;

pub use target::to_target;

use std::collections::BTreeMap;

use futures::{stream, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::conv::Conv;
use crate::core::schema::{
    ColumnInfo, Constraints, ForeignKey, ForeignKeyInfo, Index, IndexInfo, Key, SchemaAndName,
    SourceColumn, SourceTable,
};
use crate::error::{MigrateError, Result};
use crate::source::InfoSchema;
use crate::typemap::TypeMapper;

/// Options for schema processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaOptions {
    /// Turn eligible foreign keys into interleaving.
    pub interleave: bool,
    /// Tables introspected concurrently.
    pub workers: usize,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            interleave: true,
            workers: 4,
        }
    }
}

/// Everything an introspector reports for one table.
#[derive(Debug, Clone)]
struct TableMetadata {
    table: SchemaAndName,
    columns: Vec<ColumnInfo>,
    constraints: Constraints,
    foreign_keys: Vec<ForeignKeyInfo>,
    indexes: Vec<IndexInfo>,
    row_count: u64,
}

async fn load_table(info: &dyn InfoSchema, table: SchemaAndName) -> Result<TableMetadata> {
    let columns = info.get_columns(&table).await?;
    if columns.is_empty() {
        return Err(MigrateError::schema(table.full_name(), "table has no columns"));
    }
    let constraints = info.get_constraints(&table).await?;
    let foreign_keys = info.get_foreign_keys(&table).await?;
    let indexes = info.get_indexes(&table).await?;
    let row_count = info.get_row_count(&table).await?;
    debug!(
        "{}: {} columns, {} foreign keys, {} indexes, {} rows",
        table.full_name(),
        columns.len(),
        foreign_keys.len(),
        indexes.len(),
        row_count
    );
    Ok(TableMetadata {
        table,
        columns,
        constraints,
        foreign_keys,
        indexes,
        row_count,
    })
}

/// Introspect `info` and build the target schema.
pub async fn process_schema(
    conv: &mut Conv,
    info: &dyn InfoSchema,
    mapper: &dyn TypeMapper,
    options: &SchemaOptions,
) -> Result<()> {
    introspect(conv, info, options).await?;
    to_target(conv, mapper, options)
}

/// Fill `conv.src_schema` from the introspector.
///
/// Any source schema already in `conv` (from a resumed session) is
/// replaced. Ids restart from zero, so the same source gets the same ids
/// again and saved synthetic key counters carry over in [`to_target`].
pub async fn introspect(
    conv: &mut Conv,
    info: &dyn InfoSchema,
    options: &SchemaOptions,
) -> Result<()> {
    info!("Extracting schema from {} source", info.dialect());
    if !conv.src_schema.is_empty() {
        info!("Replacing {} previously extracted tables", conv.src_schema.len());
    }
    conv.src_schema.clear();
    conv.stats.rows.clear();
    conv.stats.statements.clear();
    conv.id_counter = 0;
    let tables = info.get_tables().await?;
    info!("Found {} tables", tables.len());

    let metadata: Vec<TableMetadata> = stream::iter(tables)
        .map(|table| load_table(info, table))
        .buffered(options.workers.max(1))
        .try_collect()
        .await?;

    let mut ids: BTreeMap<SchemaAndName, String> = BTreeMap::new();
    for meta in &metadata {
        let table = build_table(conv, meta)?;
        ids.insert(meta.table.clone(), table.id.clone());
        conv.set_row_count(&table.name, meta.row_count);
        conv.stats_add_statement("table");
        conv.src_schema.insert(table.id.clone(), table);
    }

    for meta in &metadata {
        let Some(table_id) = ids.get(&meta.table).cloned() else {
            continue;
        };
        for fk in &meta.foreign_keys {
            match resolve_foreign_key(conv, &ids, &table_id, meta, fk) {
                Some(resolved) => {
                    conv.stats_add_statement("foreign_key");
                    if let Some(table) = conv.src_schema.get_mut(&table_id) {
                        table.foreign_keys.push(resolved);
                    }
                }
                None => {
                    warn!(
                        "{}: skipping foreign key {} to unknown table or column {}",
                        meta.table.full_name(),
                        fk.name,
                        fk.ref_table
                    );
                    conv.unexpected(format!("unresolved foreign key {}", fk.name));
                }
            }
        }
    }

    info!("Extracted {} tables", conv.src_schema.len());
    Ok(())
}

/// Assign ids to one table, its columns, keys and indexes.
fn build_table(conv: &mut Conv, meta: &TableMetadata) -> Result<SourceTable> {
    let table_id = conv.next_id("t");
    let mut column_ids = Vec::with_capacity(meta.columns.len());
    let mut columns = BTreeMap::new();
    for col in &meta.columns {
        let id = conv.next_id("c");
        column_ids.push(id.clone());
        columns.insert(
            id.clone(),
            SourceColumn {
                id,
                name: col.name.clone(),
                source_type: col.source_type.clone(),
                not_null: !col.nullable,
                auto_increment: col.auto_increment,
                default: col.default.clone(),
            },
        );
    }

    let mut table = SourceTable {
        id: table_id,
        name: meta.table.name.clone(),
        schema: meta.table.schema.clone(),
        column_ids,
        columns,
        primary_keys: Vec::new(),
        foreign_keys: Vec::new(),
        indexes: Vec::new(),
        checks: meta.constraints.checks.clone(),
    };

    for (i, name) in meta.constraints.primary_keys.iter().enumerate() {
        let column_id = table.column_id(name).ok_or_else(|| {
            MigrateError::schema(
                meta.table.full_name(),
                format!("primary key column {} not found", name),
            )
        })?;
        table.primary_keys.push(Key {
            column_id: column_id.to_string(),
            desc: false,
            order: i + 1,
        });
    }

    for index in &meta.indexes {
        let keys: Option<Vec<Key>> = index
            .keys
            .iter()
            .enumerate()
            .map(|(i, (name, desc))| {
                table.column_id(name).map(|id| Key {
                    column_id: id.to_string(),
                    desc: *desc,
                    order: i + 1,
                })
            })
            .collect();
        match keys {
            Some(keys) => {
                let id = conv.next_id("i");
                conv.stats_add_statement("index");
                table.indexes.push(Index {
                    id,
                    name: index.name.clone(),
                    keys,
                    unique: index.unique,
                });
            }
            None => {
                warn!(
                    "{}: skipping index {} on unknown column",
                    meta.table.full_name(),
                    index.name
                );
                conv.unexpected(format!("index {} references unknown column", index.name));
            }
        }
    }

    Ok(table)
}

fn resolve_foreign_key(
    conv: &mut Conv,
    ids: &BTreeMap<SchemaAndName, String>,
    table_id: &str,
    meta: &TableMetadata,
    fk: &ForeignKeyInfo,
) -> Option<ForeignKey> {
    let ref_schema = if fk.ref_schema.is_empty() {
        meta.table.schema.clone()
    } else {
        fk.ref_schema.clone()
    };
    let ref_table_id = ids.get(&SchemaAndName::new(ref_schema, fk.ref_table.clone()))?;
    let table = conv.src_schema.get(table_id)?;
    let ref_table = conv.src_schema.get(ref_table_id)?;
    if fk.columns.len() != fk.ref_columns.len() || fk.columns.is_empty() {
        return None;
    }
    let column_ids = fk
        .columns
        .iter()
        .map(|c| table.column_id(c).map(str::to_string))
        .collect::<Option<Vec<_>>>()?;
    let ref_column_ids = fk
        .ref_columns
        .iter()
        .map(|c| ref_table.column_id(c).map(str::to_string))
        .collect::<Option<Vec<_>>>()?;
    let ref_table_id = ref_table_id.clone();
    Some(ForeignKey {
        id: conv.next_id("f"),
        name: fk.name.clone(),
        column_ids,
        ref_table_id,
        ref_column_ids,
        on_delete: fk.on_delete,
        on_update: fk.on_update,
    })
}
