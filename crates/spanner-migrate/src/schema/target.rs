//! Derivation of the target schema from the source schema.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use super::SchemaOptions;
use crate::conv::{Conv, SchemaIssue, SyntheticPk};
use crate::convert::rules::{self, SHARD_ID_COLUMN};
use crate::core::identifier::{unique_identifier, validate_check_constraint};
use crate::core::schema::{ForeignKey, Index, Key, SourceTable};
use crate::error::{MigrateError, Result};
use crate::target::schema::{
    InterleaveParent, Sequence, TargetColumn, TargetTable, TargetType, TypeCode,
};
use crate::typemap::TypeMapper;

/// Name of the synthetic key column.
pub const SYNTHETIC_KEY_COLUMN: &str = "synth_id";

/// Length of the synthetic key column.
pub const SYNTHETIC_KEY_LENGTH: i64 = 50;

/// Sequence kind used for auto-generated keys.
pub const BIT_REVERSED_POSITIVE: &str = "bit_reversed_positive";

/// Build `conv.target_schema` from `conv.src_schema`.
///
/// Never reads row data. Rebuilding from the same source schema yields the
/// same target schema; synthetic key counters already in `conv` are kept.
pub fn to_target(conv: &mut Conv, mapper: &dyn TypeMapper, options: &SchemaOptions) -> Result<()> {
    conv.target_schema.clear();
    conv.issues.clear();
    conv.sequences.clear();
    conv.used_names.clear();
    let previous_pks = std::mem::take(&mut conv.synthetic_pks);

    let mut table_ids: Vec<String> = conv.src_schema.keys().cloned().collect();
    table_ids.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

    for table_id in &table_ids {
        let Some(src) = conv.src_schema.get(table_id).cloned() else {
            continue;
        };
        let table = build_target_table(conv, mapper, &src, &previous_pks)?;
        debug!("{}: mapped to {}", src.full_name(), table.name);
        conv.target_schema.insert(table_id.clone(), table);
    }

    // Foreign keys and indexes refer to other tables' final names and keys.
    for table_id in &table_ids {
        add_foreign_keys(conv, table_id);
        add_indexes(conv, table_id);
    }
    if options.interleave {
        for table_id in &table_ids {
            interleave(conv, table_id);
        }
    }

    for table in conv.target_schema.values() {
        let dangling = table.dangling_column_ids();
        if !dangling.is_empty() {
            return Err(MigrateError::schema(
                &table.name,
                format!("references unknown columns {:?}", dangling),
            ));
        }
    }

    info!(
        "Built target schema: {} tables, {} sequences",
        conv.target_schema.len(),
        conv.sequences.len()
    );
    Ok(())
}

fn build_target_table(
    conv: &mut Conv,
    mapper: &dyn TypeMapper,
    src: &SourceTable,
    previous_pks: &BTreeMap<String, SyntheticPk>,
) -> Result<TargetTable> {
    let name = unique_identifier(&src.name, &mut conv.used_names);
    if name != src.name {
        conv.add_table_issue(&src.id, SchemaIssue::IdentifierRenamed);
    }

    let mut used_columns = BTreeSet::new();
    let mut table = TargetTable {
        id: src.id.clone(),
        name,
        column_ids: Vec::with_capacity(src.column_ids.len() + 1),
        columns: BTreeMap::new(),
        primary_keys: Vec::new(),
        parent: None,
        foreign_keys: Vec::new(),
        indexes: Vec::new(),
        checks: Vec::new(),
        comment: format!("Spanner schema for source table {}", src.full_name()),
    };

    for col in src.ordered_columns() {
        let requested = rules::renamed_column(&conv.rules, &src.name, &col.name);
        let col_name = unique_identifier(requested, &mut used_columns);
        if col_name != requested {
            conv.add_column_issue(&src.id, &col.id, SchemaIssue::IdentifierRenamed);
        }

        let mapped = mapper.map_type(&col.source_type, None);
        for issue in &mapped.issues {
            conv.add_column_issue(&src.id, &col.id, *issue);
        }

        let mut sequence_id = None;
        if col.auto_increment {
            if !mapped.issues.contains(&SchemaIssue::Serial) {
                conv.add_column_issue(&src.id, &col.id, SchemaIssue::AutoIncrement);
            }
            if mapped.target.code == TypeCode::Int64 && !mapped.target.is_array {
                let id = format!("{}_seq", col.id);
                let seq_name = unique_identifier(
                    &format!("{}_{}_seq", table.name, col_name),
                    &mut conv.used_names,
                );
                conv.sequences.insert(
                    id.clone(),
                    Sequence {
                        id: id.clone(),
                        name: seq_name,
                        kind: BIT_REVERSED_POSITIVE.to_string(),
                        start_with: None,
                    },
                );
                sequence_id = Some(id);
            }
        } else if col.default.is_some() {
            conv.add_column_issue(&src.id, &col.id, SchemaIssue::DefaultValue);
        }

        table.column_ids.push(col.id.clone());
        table.columns.insert(
            col.id.clone(),
            TargetColumn {
                id: col.id.clone(),
                name: col_name,
                ty: mapped.target,
                not_null: col.not_null,
                comment: format!("From: {} {}", col.name, col.source_type),
                sequence_id,
            },
        );
    }

    table.primary_keys = src.primary_keys.clone();
    if table.primary_keys.is_empty() {
        let col_id = format!("{}_synth", src.id);
        let col_name = unique_identifier(SYNTHETIC_KEY_COLUMN, &mut used_columns);
        table.column_ids.push(col_id.clone());
        table.columns.insert(
            col_id.clone(),
            TargetColumn {
                id: col_id.clone(),
                name: col_name,
                ty: TargetType::sized(TypeCode::String, SYNTHETIC_KEY_LENGTH),
                not_null: true,
                comment: "Synthetic primary key".to_string(),
                sequence_id: None,
            },
        );
        table.primary_keys.push(Key {
            column_id: col_id.clone(),
            desc: false,
            order: 1,
        });
        conv.add_table_issue(&src.id, SchemaIssue::MissingPrimaryKey);
        let sequence = previous_pks
            .get(&src.id)
            .filter(|pk| pk.col_id == col_id)
            .map(|pk| pk.sequence)
            .unwrap_or(0);
        conv.synthetic_pks
            .insert(src.id.clone(), SyntheticPk { col_id, sequence });
    }

    for (i, (column, _)) in rules::injected_columns(&conv.rules, &src.name)
        .into_iter()
        .enumerate()
    {
        let is_shard = column == SHARD_ID_COLUMN && rules::has_shard_id(&conv.rules, &src.name);
        let col_id = if is_shard {
            format!("{}_shard", src.id)
        } else {
            format!("{}_rule{}", src.id, i)
        };
        if table.columns.contains_key(&col_id) {
            continue;
        }
        let col_name = unique_identifier(&column, &mut used_columns);
        table.column_ids.push(col_id.clone());
        table.columns.insert(
            col_id.clone(),
            TargetColumn {
                id: col_id.clone(),
                name: col_name,
                ty: TargetType::string_max(),
                not_null: is_shard,
                comment: String::new(),
                sequence_id: None,
            },
        );
        if is_shard {
            for key in &mut table.primary_keys {
                key.order += 1;
            }
            table.primary_keys.insert(
                0,
                Key {
                    column_id: col_id,
                    desc: false,
                    order: 1,
                },
            );
        }
    }

    for check in &src.checks {
        match validate_check_constraint(&check.expr) {
            Ok(()) => table.checks.push(check.clone()),
            Err(e) => {
                debug!("{}: dropping check {}: {}", src.name, check.name, e);
                conv.add_table_issue(&src.id, SchemaIssue::CheckConstraint);
            }
        }
    }

    Ok(table)
}

fn add_foreign_keys(conv: &mut Conv, table_id: &str) {
    let Some(src) = conv.src_schema.get(table_id) else {
        return;
    };
    let fks: Vec<ForeignKey> = src
        .foreign_keys
        .iter()
        .filter(|fk| conv.target_schema.contains_key(&fk.ref_table_id))
        .cloned()
        .collect();
    let fks: Vec<ForeignKey> = fks
        .into_iter()
        .map(|fk| ForeignKey {
            name: unique_identifier(&fk.name, &mut conv.used_names),
            ..fk
        })
        .collect();
    if let Some(table) = conv.target_schema.get_mut(table_id) {
        table.foreign_keys = fks;
    }
}

fn add_indexes(conv: &mut Conv, table_id: &str) {
    let Some(src) = conv.src_schema.get(table_id) else {
        return;
    };
    let indexes: Vec<Index> = src.indexes.clone();
    let indexes: Vec<Index> = indexes
        .into_iter()
        .map(|index| Index {
            name: unique_identifier(&index.name, &mut conv.used_names),
            ..index
        })
        .collect();
    if let Some(table) = conv.target_schema.get_mut(table_id) {
        table.indexes = indexes;
    }
}

/// Turn the first eligible foreign key of `table_id` into interleaving.
fn interleave(conv: &mut Conv, table_id: &str) {
    let Some(table) = conv.target_schema.get(table_id) else {
        return;
    };
    let Some(index) = table
        .foreign_keys
        .iter()
        .position(|fk| can_interleave(conv, table, fk))
    else {
        return;
    };
    let Some(table) = conv.target_schema.get_mut(table_id) else {
        return;
    };
    let fk = table.foreign_keys.remove(index);
    debug!("{}: interleaving via {}", table.name, fk.name);
    table.parent = Some(InterleaveParent {
        table_id: fk.ref_table_id.clone(),
        on_delete: fk.on_delete,
    });
    conv.add_table_issue(table_id, SchemaIssue::ForeignKeyOnInterleave);
}

/// The parent's whole primary key must be a prefix of the child's, with the
/// same column names and types, linked column by column through `fk`.
/// Shard columns added by rules pair up without being part of the key.
fn can_interleave(conv: &Conv, table: &TargetTable, fk: &ForeignKey) -> bool {
    if fk.ref_table_id == table.id || creates_cycle(conv, &table.id, &fk.ref_table_id) {
        return false;
    }
    let Some(parent) = conv.target_schema.get(&fk.ref_table_id) else {
        return false;
    };
    if parent.primary_keys.is_empty() || parent.primary_keys.len() > table.primary_keys.len() {
        return false;
    }
    let parent_shard = format!("{}_shard", parent.id);
    let child_shard = format!("{}_shard", table.id);
    let prefix_matches = parent
        .primary_keys
        .iter()
        .zip(&table.primary_keys)
        .all(|(parent_key, child_key)| {
            let (Some(parent_col), Some(child_col)) = (
                parent.columns.get(&parent_key.column_id),
                table.columns.get(&child_key.column_id),
            ) else {
                return false;
            };
            let linked = fk
                .ref_column_ids
                .iter()
                .zip(&fk.column_ids)
                .any(|(r, c)| *r == parent_key.column_id && *c == child_key.column_id);
            let shard = parent_key.column_id == parent_shard && child_key.column_id == child_shard;
            (linked || shard)
                && parent_col.name.eq_ignore_ascii_case(&child_col.name)
                && parent_col.ty == child_col.ty
        });
    prefix_matches
        && fk
            .ref_column_ids
            .iter()
            .all(|r| parent.primary_keys.iter().any(|k| &k.column_id == r))
}

/// Whether making `parent_id` the parent of `table_id` closes a loop.
fn creates_cycle(conv: &Conv, table_id: &str, parent_id: &str) -> bool {
    let mut current = Some(parent_id.to_string());
    let mut seen = BTreeSet::new();
    while let Some(id) = current {
        if id == table_id || !seen.insert(id.clone()) {
            return true;
        }
        current = conv
            .target_schema
            .get(&id)
            .and_then(|t| t.parent.as_ref())
            .map(|p| p.table_id.clone());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::rules::{TransformationRule, ALL_TABLES};
    use crate::core::schema::{CheckConstraint, ReferentialAction, SourceColumn, SourceType};
    use crate::target::schema::TargetDialect;
    use crate::typemap::{mapper_for, SourceDialect};

    fn column(id: &str, name: &str, ty: &str) -> SourceColumn {
        SourceColumn {
            id: id.into(),
            name: name.into(),
            source_type: SourceType::parse(ty),
            not_null: false,
            auto_increment: false,
            default: None,
        }
    }

    fn table(id: &str, name: &str, cols: Vec<SourceColumn>, pk: &[&str]) -> SourceTable {
        SourceTable {
            id: id.into(),
            name: name.into(),
            schema: String::new(),
            column_ids: cols.iter().map(|c| c.id.clone()).collect(),
            columns: cols.into_iter().map(|c| (c.id.clone(), c)).collect(),
            primary_keys: pk
                .iter()
                .enumerate()
                .map(|(i, c)| Key {
                    column_id: c.to_string(),
                    desc: false,
                    order: i + 1,
                })
                .collect(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
            checks: Vec::new(),
        }
    }

    /// singers(singer_id) <- albums(singer_id, id) with a foreign key on
    /// singer_id,
    /// plus a keyless `log` table.
    fn conv() -> Conv {
        let mut conv = Conv::new(SourceDialect::Mysql, TargetDialect::GoogleSql);
        let mut id = column("c2", "singer_id", "bigint");
        id.auto_increment = true;
        conv.src_schema.insert(
            "t1".into(),
            table("t1", "singers", vec![id, column("c3", "full name", "varchar(40)")], &["c2"]),
        );
        let mut albums = table(
            "t4",
            "albums",
            vec![column("c5", "singer_id", "bigint"), column("c6", "id", "bigint")],
            &["c5", "c6"],
        );
        albums.foreign_keys.push(ForeignKey {
            id: "f7".into(),
            name: "fk_singer".into(),
            column_ids: vec!["c5".into()],
            ref_table_id: "t1".into(),
            ref_column_ids: vec!["c2".into()],
            on_delete: ReferentialAction::Cascade,
            on_update: ReferentialAction::NoAction,
        });
        conv.src_schema.insert("t4".into(), albums);
        let mut log = table("t8", "log", vec![column("c9", "msg", "text")], &[]);
        log.checks.push(CheckConstraint {
            name: "ck".into(),
            expr: "1=1; DROP TABLE log".into(),
        });
        conv.src_schema.insert("t8".into(), log);
        conv
    }

    #[test]
    fn test_to_target() {
        let mut conv = conv();
        let mapper = mapper_for(SourceDialect::Mysql);
        to_target(&mut conv, mapper.as_ref(), &SchemaOptions::default()).unwrap();

        let singers = &conv.target_schema["t1"];
        assert_eq!(singers.columns["c3"].name, "full_name");
        assert_eq!(
            conv.column_issues("t1", "c3"),
            &[SchemaIssue::IdentifierRenamed]
        );
        assert_eq!(singers.columns["c2"].sequence_id.as_deref(), Some("c2_seq"));
        assert!(conv.column_issues("t1", "c2").contains(&SchemaIssue::AutoIncrement));
        assert_eq!(conv.sequences["c2_seq"].name, "singers_singer_id_seq");

        let albums = &conv.target_schema["t4"];
        let parent = albums.parent.as_ref().unwrap();
        assert_eq!(parent.table_id, "t1");
        assert_eq!(parent.on_delete, ReferentialAction::Cascade);
        assert!(albums.foreign_keys.is_empty());
        assert!(conv.issues["t4"].table.contains(&SchemaIssue::ForeignKeyOnInterleave));

        let log = &conv.target_schema["t8"];
        assert_eq!(log.columns["t8_synth"].name, "synth_id");
        assert_eq!(log.primary_keys[0].column_id, "t8_synth");
        assert_eq!(conv.synthetic_pks["t8"].sequence, 0);
        assert!(log.checks.is_empty());
        assert!(conv.issues["t8"].table.contains(&SchemaIssue::MissingPrimaryKey));
        assert!(conv.issues["t8"].table.contains(&SchemaIssue::CheckConstraint));
    }

    #[test]
    fn test_interleave_disabled_keeps_foreign_key() {
        let mut conv = conv();
        let mapper = mapper_for(SourceDialect::Mysql);
        let options = SchemaOptions {
            interleave: false,
            ..SchemaOptions::default()
        };
        to_target(&mut conv, mapper.as_ref(), &options).unwrap();
        let albums = &conv.target_schema["t4"];
        assert!(albums.parent.is_none());
        assert_eq!(albums.foreign_keys.len(), 1);
    }

    #[test]
    fn test_renamed_key_column_blocks_interleave() {
        let mut conv = conv();
        conv.src_schema.get_mut("t4").unwrap().columns.get_mut("c5").unwrap().name =
            "artist".into();
        let mapper = mapper_for(SourceDialect::Mysql);
        to_target(&mut conv, mapper.as_ref(), &SchemaOptions::default()).unwrap();
        let albums = &conv.target_schema["t4"];
        assert!(albums.parent.is_none());
        assert_eq!(albums.foreign_keys[0].name, "fk_singer");
    }

    #[test]
    fn test_rebuild_is_idempotent_and_keeps_synthetic_counter() {
        let mut conv = conv();
        let mapper = mapper_for(SourceDialect::Mysql);
        to_target(&mut conv, mapper.as_ref(), &SchemaOptions::default()).unwrap();
        let first = conv.target_schema.clone();
        let first_issues = conv.issues.clone();
        conv.synthetic_pks.get_mut("t8").unwrap().sequence = 12;

        to_target(&mut conv, mapper.as_ref(), &SchemaOptions::default()).unwrap();
        assert_eq!(conv.target_schema, first);
        assert_eq!(conv.issues, first_issues);
        assert_eq!(conv.synthetic_pks["t8"].sequence, 12);
        assert_eq!(conv.id_counter, 0);
    }

    #[test]
    fn test_shard_rule_prefixes_primary_key() {
        let mut conv = conv();
        conv.rules.push(TransformationRule::AddShardIdColumn {
            table: ALL_TABLES.into(),
            shard_id: "s1".into(),
        });
        conv.rules.push(TransformationRule::RenameColumn {
            table: "singers".into(),
            from: "full name".into(),
            to: "display_name".into(),
        });
        let mapper = mapper_for(SourceDialect::Mysql);
        to_target(&mut conv, mapper.as_ref(), &SchemaOptions::default()).unwrap();

        let singers = &conv.target_schema["t1"];
        assert_eq!(singers.columns["c3"].name, "display_name");
        assert!(conv.column_issues("t1", "c3").is_empty());
        assert_eq!(singers.primary_keys[0].column_id, "t1_shard");
        assert_eq!(singers.primary_keys[1].order, 2);
        assert_eq!(singers.columns["t1_shard"].name, SHARD_ID_COLUMN);

        // Both sides carry the shard column, so albums still interleaves.
        assert_eq!(
            conv.target_schema["t4"].parent.as_ref().map(|p| p.table_id.as_str()),
            Some("t1")
        );
    }

    #[test]
    fn test_colliding_table_names() {
        let mut conv = Conv::new(SourceDialect::Postgres, TargetDialect::GoogleSql);
        conv.src_schema.insert(
            "t1".into(),
            table("t1", "Users", vec![column("c2", "id", "int8")], &["c2"]),
        );
        conv.src_schema.insert(
            "t3".into(),
            table("t3", "users", vec![column("c4", "id", "int8")], &["c4"]),
        );
        let mapper = mapper_for(SourceDialect::Postgres);
        to_target(&mut conv, mapper.as_ref(), &SchemaOptions::default()).unwrap();
        assert_eq!(conv.target_schema["t1"].name, "Users");
        assert_eq!(conv.target_schema["t3"].name, "users_1");
        assert!(conv.issues["t3"].table.contains(&SchemaIssue::IdentifierRenamed));
    }
}
