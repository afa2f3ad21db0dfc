//! DDL generation for the target schema.
//!
//! Statements come out in dependency order: sequences, tables (interleave
//! parents before children), indexes, then foreign keys as `ALTER TABLE`.

use std::collections::BTreeSet;

use crate::conv::Conv;
use crate::core::identifier::{
    is_google_sql_reserved, is_postgres_reserved, normalize_identifier, quote_google, quote_pg,
};
use crate::core::schema::{Key, ReferentialAction};
use crate::error::Result;
use crate::target::schema::{Sequence, TargetColumn, TargetDialect, TargetTable};

/// Options controlling DDL output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DdlConfig {
    /// Annotate tables and columns with their source definitions.
    pub comments: bool,
    /// Quote every identifier, not just reserved words.
    pub protect_ids: bool,
    /// Emit foreign keys.
    pub foreign_keys: bool,
    /// Emit sequences and sequence-backed defaults.
    pub sequences: bool,
    pub flavor: TargetDialect,
}

impl DdlConfig {
    /// Annotated output for people reading the schema.
    pub fn readable() -> Self {
        Self {
            comments: true,
            protect_ids: false,
            foreign_keys: true,
            sequences: true,
            flavor: TargetDialect::GoogleSql,
        }
    }

    /// Output that can be applied to a database as-is.
    pub fn executable() -> Self {
        Self {
            comments: false,
            protect_ids: true,
            foreign_keys: true,
            sequences: true,
            flavor: TargetDialect::GoogleSql,
        }
    }

    pub fn with_flavor(mut self, flavor: TargetDialect) -> Self {
        self.flavor = flavor;
        self
    }

    /// Quote an identifier as required by the flavor and options.
    fn ident(&self, name: &str) -> Result<String> {
        match self.flavor {
            TargetDialect::GoogleSql if self.protect_ids || is_google_sql_reserved(name) => {
                quote_google(name)
            }
            TargetDialect::PostgreSql if self.protect_ids || is_postgres_reserved(name) => {
                quote_pg(name)
            }
            _ => Ok(name.to_string()),
        }
    }
}

impl Default for DdlConfig {
    fn default() -> Self {
        Self::readable()
    }
}

/// All DDL statements for `conv.target_schema`, without terminators.
pub fn ddl_statements(conv: &Conv, config: &DdlConfig) -> Result<Vec<String>> {
    let mut statements = Vec::new();

    if config.sequences {
        for sequence in conv.sequences.values() {
            statements.push(sequence_ddl(sequence, config)?);
        }
    }

    let tables = tables_in_dependency_order(conv);
    for table in &tables {
        statements.push(table_ddl(conv, table, config)?);
    }
    for table in &tables {
        for index in &table.indexes {
            let keys = key_list(table, &index.keys, config, true)?;
            statements.push(format!(
                "CREATE {}INDEX {} ON {} ({})",
                if index.unique { "UNIQUE " } else { "" },
                config.ident(&index.name)?,
                config.ident(&table.name)?,
                keys
            ));
        }
    }

    if config.foreign_keys {
        for table in &tables {
            for fk in &table.foreign_keys {
                let Some(parent) = conv.target_schema.get(&fk.ref_table_id) else {
                    continue;
                };
                let columns = fk
                    .column_ids
                    .iter()
                    .map(|id| config.ident(table.column_name(id)))
                    .collect::<Result<Vec<_>>>()?;
                let ref_columns = fk
                    .ref_column_ids
                    .iter()
                    .map(|id| config.ident(parent.column_name(id)))
                    .collect::<Result<Vec<_>>>()?;
                statements.push(format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
                    config.ident(&table.name)?,
                    config.ident(&fk.name)?,
                    columns.join(", "),
                    config.ident(&parent.name)?,
                    ref_columns.join(", "),
                    on_delete(fk.on_delete)
                ));
            }
        }
    }

    Ok(statements)
}

/// The whole schema as one script, statements terminated by `;`.
pub fn ddl_script(conv: &Conv, config: &DdlConfig) -> Result<String> {
    let statements = ddl_statements(conv, config)?;
    let mut script = String::new();
    for statement in statements {
        script.push_str(&statement);
        script.push_str(";\n\n");
    }
    Ok(script)
}

fn sequence_ddl(sequence: &Sequence, config: &DdlConfig) -> Result<String> {
    let name = config.ident(&sequence.name)?;
    let mut ddl = match config.flavor {
        TargetDialect::GoogleSql => format!(
            "CREATE SEQUENCE {} OPTIONS (sequence_kind='{}'",
            name, sequence.kind
        ),
        TargetDialect::PostgreSql => {
            format!("CREATE SEQUENCE {} {}", name, sequence.kind.to_uppercase())
        }
    };
    if let Some(start) = sequence.start_with {
        match config.flavor {
            TargetDialect::GoogleSql => ddl.push_str(&format!(", start_with_counter={}", start)),
            TargetDialect::PostgreSql => ddl.push_str(&format!(" START COUNTER WITH {}", start)),
        }
    }
    if config.flavor == TargetDialect::GoogleSql {
        ddl.push(')');
    }
    Ok(ddl)
}

fn table_ddl(conv: &Conv, table: &TargetTable, config: &DdlConfig) -> Result<String> {
    let mut lines: Vec<(String, String)> = Vec::new();
    for col in table.ordered_columns() {
        let comment = if config.comments { col.comment.clone() } else { String::new() };
        lines.push((column_ddl(conv, col, config)?, comment));
    }
    for check in &table.checks {
        lines.push((
            format!(
                "CONSTRAINT {} CHECK ({})",
                config.ident(&normalize_identifier(&check.name))?,
                check.expr
            ),
            String::new(),
        ));
    }
    let pk = key_list(table, &table.primary_keys, config, false)?;
    if config.flavor == TargetDialect::PostgreSql {
        lines.push((format!("PRIMARY KEY ({})", pk), String::new()));
    }

    let mut ddl = String::new();
    if config.comments && !table.comment.is_empty() {
        ddl.push_str(&format!("-- {}\n", table.comment));
    }
    ddl.push_str(&format!("CREATE TABLE {} (\n", config.ident(&table.name)?));
    let count = lines.len();
    for (i, (line, comment)) in lines.into_iter().enumerate() {
        ddl.push_str("  ");
        ddl.push_str(&line);
        if i + 1 < count {
            ddl.push(',');
        }
        if !comment.is_empty() {
            ddl.push_str(&format!("  -- {}", comment));
        }
        ddl.push('\n');
    }
    ddl.push(')');
    if config.flavor == TargetDialect::GoogleSql {
        ddl.push_str(&format!(" PRIMARY KEY ({})", pk));
    }

    if let Some(parent) = &table.parent {
        if let Some(parent_table) = conv.target_schema.get(&parent.table_id) {
            if config.flavor == TargetDialect::GoogleSql {
                ddl.push(',');
            }
            ddl.push_str(&format!(
                "\nINTERLEAVE IN PARENT {} ON DELETE {}",
                config.ident(&parent_table.name)?,
                on_delete(parent.on_delete)
            ));
        }
    }
    Ok(ddl)
}

fn column_ddl(conv: &Conv, col: &TargetColumn, config: &DdlConfig) -> Result<String> {
    let mut ddl = format!("{} {}", config.ident(&col.name)?, col.ty.to_ddl(config.flavor));
    if col.not_null {
        ddl.push_str(" NOT NULL");
    }
    if config.sequences {
        if let Some(sequence) = col.sequence_id.as_ref().and_then(|id| conv.sequences.get(id)) {
            let name = config.ident(&sequence.name)?;
            match config.flavor {
                TargetDialect::GoogleSql => ddl.push_str(&format!(
                    " DEFAULT (GET_NEXT_SEQUENCE_VALUE(SEQUENCE {}))",
                    name
                )),
                TargetDialect::PostgreSql => {
                    ddl.push_str(&format!(" DEFAULT nextval('{}')", sequence.name))
                }
            }
        }
    }
    Ok(ddl)
}

/// Comma-separated key columns. The PostgreSQL flavor has no DESC in
/// primary keys.
fn key_list(table: &TargetTable, keys: &[Key], config: &DdlConfig, index: bool) -> Result<String> {
    let mut sorted: Vec<&Key> = keys.iter().collect();
    sorted.sort_by_key(|k| k.order);
    let parts = sorted
        .into_iter()
        .map(|k| {
            let name = config.ident(table.column_name(&k.column_id))?;
            let desc_allowed = index || config.flavor == TargetDialect::GoogleSql;
            Ok(if k.desc && desc_allowed {
                format!("{} DESC", name)
            } else {
                name
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(parts.join(", "))
}

/// The target only supports CASCADE and NO ACTION on delete.
fn on_delete(action: ReferentialAction) -> &'static str {
    match action {
        ReferentialAction::Cascade => "CASCADE",
        _ => "NO ACTION",
    }
}

/// Target tables with every interleave parent ahead of its children.
fn tables_in_dependency_order(conv: &Conv) -> Vec<&TargetTable> {
    let mut pending: Vec<&TargetTable> = conv.target_schema.values().collect();
    pending.sort_by(|a, b| a.id.len().cmp(&b.id.len()).then_with(|| a.id.cmp(&b.id)));

    let mut emitted: BTreeSet<&str> = BTreeSet::new();
    let mut ordered = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let before = pending.len();
        let mut rest = Vec::new();
        for table in pending {
            let ready = table.parent.as_ref().map_or(true, |p| {
                emitted.contains(p.table_id.as_str()) || !conv.target_schema.contains_key(&p.table_id)
            });
            if ready {
                emitted.insert(table.id.as_str());
                ordered.push(table);
            } else {
                rest.push(table);
            }
        }
        if rest.len() == before {
            // Parent cycle from a hand-edited session: emit the rest as-is.
            ordered.extend(rest);
            break;
        }
        pending = rest;
    }
    ordered
}
