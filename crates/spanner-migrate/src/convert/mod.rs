//! Row conversion from raw source values to target values.

pub mod literal;
pub mod rules;

use tracing::{debug, warn};

use crate::conv::{BadRow, Conv};
use crate::core::identifier::normalize_identifier;
use crate::core::value::{RawValue, Value};
use crate::error::{MigrateError, Result};
use crate::source::RowSink;

pub use literal::convert_value;

/// A converted row ready for the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedRow {
    /// Target table name.
    pub table: String,
    /// Target column names, parallel to `values`.
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

/// Whether `raw` counts as NULL under the given marker.
pub fn is_null(raw: &RawValue, null_marker: &str) -> bool {
    match raw {
        RawValue::Null => true,
        RawValue::Text(text) => text == null_marker,
        RawValue::Bytes(_) => false,
    }
}

/// Convert one source row of `table_id`.
///
/// NULL values drop their column. Synthetic keys and rule-injected columns
/// are appended. Any value that fails to convert fails the whole row.
pub fn convert_data(
    conv: &mut Conv,
    table_id: &str,
    src_cols: &[String],
    values: &[RawValue],
) -> Result<ConvertedRow> {
    let src = conv
        .src_schema
        .get(table_id)
        .ok_or_else(|| MigrateError::schema(table_id, "unknown source table"))?;
    let target = conv
        .target_schema
        .get(table_id)
        .ok_or_else(|| MigrateError::schema(&src.name, "no target table"))?;

    if src_cols.len() != values.len() {
        return Err(MigrateError::conversion(
            &src.name,
            format!(
                "row has {} values for {} columns",
                values.len(),
                src_cols.len()
            ),
        ));
    }

    let mut columns = Vec::with_capacity(values.len() + 1);
    let mut converted = Vec::with_capacity(values.len() + 1);
    for (name, raw) in src_cols.iter().zip(values) {
        let col_id = src
            .column_id(name)
            .ok_or_else(|| MigrateError::conversion(&src.name, format!("unknown column {}", name)))?;
        let col = target
            .columns
            .get(col_id)
            .ok_or_else(|| MigrateError::schema(&src.name, format!("column {} has no target", name)))?;
        if is_null(raw, &conv.null_marker) {
            continue;
        }
        let value = convert_value(raw, &col.ty, conv.source_dialect).map_err(|e| {
            MigrateError::conversion(&src.name, format!("column {}: {}", name, e))
        })?;
        columns.push(col.name.clone());
        converted.push(value);
    }

    for (column, value) in rules::injected_columns(&conv.rules, &src.name) {
        let wanted = normalize_identifier(&column);
        let col = target
            .ordered_columns()
            .find(|c| c.name.eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| {
                MigrateError::schema(&src.name, format!("rule column {} missing from schema", column))
            })?;
        columns.push(col.name.clone());
        converted.push(Value::String(value));
    }

    let table = target.name.clone();
    let src_name = src.name.clone();
    if let Some(synth) = conv.synthetic_pks.get_mut(table_id) {
        let col = target.columns.get(&synth.col_id).ok_or_else(|| {
            MigrateError::schema(&src_name, "synthetic key column missing from schema")
        })?;
        columns.push(col.name.clone());
        converted.push(Value::String(synth.sequence.reverse_bits().to_string()));
        synth.sequence += 1;
    }

    Ok(ConvertedRow {
        table,
        columns,
        values: converted,
    })
}

/// Convert a row and forward it to `sink`.
///
/// Conversion failures are counted and sampled in `conv.stats` and never
/// abort the migration; only sink errors are returned.
pub async fn process_data_row(
    conv: &mut Conv,
    table_id: &str,
    src_cols: &[String],
    values: &[RawValue],
    sink: &mut dyn RowSink,
) -> Result<()> {
    let table_name = conv
        .src_schema
        .get(table_id)
        .map(|t| t.name.clone())
        .unwrap_or_else(|| table_id.to_string());

    match convert_data(conv, table_id, src_cols, values) {
        Ok(row) => {
            conv.stats_add_good_row(&table_name, 1);
            conv.progress.advance(1);
            sink.write_row(row).await
        }
        Err(e) => {
            debug!("{}: bad row: {}", table_name, e);
            if conv.bad_rows() == 0 {
                warn!("{}: first bad row: {}", table_name, e);
            }
            conv.stats_add_bad_row(BadRow {
                table: table_name,
                columns: src_cols.to_vec(),
                values: values.iter().map(RawValue::display).collect(),
                error: e.to_string(),
            });
            conv.progress.advance(1);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conv::SyntheticPk;
    use crate::core::schema::{Key, SourceColumn, SourceTable, SourceType};
    use crate::source::CollectSink;
    use crate::target::schema::{TargetColumn, TargetDialect, TargetTable, TargetType, TypeCode};
    use crate::typemap::SourceDialect;
    use std::collections::BTreeMap;

    /// users(id bigint, name text, score decimal), no primary key.
    fn conv() -> Conv {
        let mut conv = Conv::new(SourceDialect::Mysql, TargetDialect::GoogleSql);
        let cols = [
            ("c2", "id", "bigint", TargetType::scalar(TypeCode::Int64)),
            ("c3", "name", "text", TargetType::string_max()),
            ("c4", "score", "decimal", TargetType::scalar(TypeCode::Numeric)),
        ];
        let mut src_cols = BTreeMap::new();
        let mut target_cols = BTreeMap::new();
        for (id, name, src_ty, ty) in cols.iter().cloned() {
            src_cols.insert(
                id.to_string(),
                SourceColumn {
                    id: id.to_string(),
                    name: name.to_string(),
                    source_type: SourceType::new(src_ty),
                    not_null: false,
                    auto_increment: false,
                    default: None,
                },
            );
            target_cols.insert(
                id.to_string(),
                TargetColumn {
                    id: id.to_string(),
                    name: name.to_string(),
                    ty,
                    not_null: false,
                    comment: String::new(),
                    sequence_id: None,
                },
            );
        }
        target_cols.insert(
            "c5".to_string(),
            TargetColumn {
                id: "c5".to_string(),
                name: "synth_id".to_string(),
                ty: TargetType::sized(TypeCode::String, 50),
                not_null: true,
                comment: String::new(),
                sequence_id: None,
            },
        );
        conv.src_schema.insert(
            "t1".to_string(),
            SourceTable {
                id: "t1".to_string(),
                name: "users".to_string(),
                schema: String::new(),
                column_ids: vec!["c2".into(), "c3".into(), "c4".into()],
                columns: src_cols,
                primary_keys: Vec::new(),
                foreign_keys: Vec::new(),
                indexes: Vec::new(),
                checks: Vec::new(),
            },
        );
        conv.target_schema.insert(
            "t1".to_string(),
            TargetTable {
                id: "t1".to_string(),
                name: "users".to_string(),
                column_ids: vec!["c2".into(), "c3".into(), "c4".into(), "c5".into()],
                columns: target_cols,
                primary_keys: vec![Key {
                    column_id: "c5".into(),
                    desc: false,
                    order: 1,
                }],
                parent: None,
                foreign_keys: Vec::new(),
                indexes: Vec::new(),
                checks: Vec::new(),
                comment: String::new(),
            },
        );
        conv.synthetic_pks.insert(
            "t1".to_string(),
            SyntheticPk {
                col_id: "c5".into(),
                sequence: 0,
            },
        );
        conv
    }

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_convert_with_synthetic_key() {
        let mut conv = conv();
        let cols = names(&["id", "name", "score"]);
        let row = convert_data(
            &mut conv,
            "t1",
            &cols,
            &["1".into(), "alice".into(), "9.5".into()],
        )
        .unwrap();
        assert_eq!(row.table, "users");
        assert_eq!(row.columns, names(&["id", "name", "score", "synth_id"]));
        assert_eq!(row.values[0], Value::Int64(1));
        assert_eq!(row.values[3], Value::String("0".to_string()));

        let row = convert_data(&mut conv, "t1", &cols, &["2".into(), "bob".into(), "1".into()])
            .unwrap();
        assert_eq!(
            row.values[3],
            Value::String((1u64 << 63).to_string())
        );
        assert_eq!(conv.synthetic_pks["t1"].sequence, 2);
    }

    #[test]
    fn test_nulls_drop_columns() {
        let mut conv = conv();
        let cols = names(&["id", "name", "score"]);
        let row = convert_data(
            &mut conv,
            "t1",
            &cols,
            &["1".into(), RawValue::Null, "NULL".into()],
        )
        .unwrap();
        assert_eq!(row.columns, names(&["id", "synth_id"]));

        conv.null_marker = "\\N".to_string();
        let row = convert_data(&mut conv, "t1", &cols, &["1".into(), "\\N".into(), "2".into()])
            .unwrap();
        assert_eq!(row.columns, names(&["id", "score", "synth_id"]));
    }

    #[test]
    fn test_one_bad_value_fails_row() {
        let mut conv = conv();
        let cols = names(&["id", "name"]);
        let err = convert_data(&mut conv, "t1", &cols, &["x".into(), "alice".into()]).unwrap_err();
        assert!(err.to_string().contains("column id"));
        assert!(convert_data(&mut conv, "t1", &names(&["nope"]), &["1".into()]).is_err());
        assert!(convert_data(&mut conv, "t1", &cols, &["1".into()]).is_err());
    }

    #[tokio::test]
    async fn test_process_data_row_counts_bad_rows() {
        let mut conv = conv();
        let mut sink = CollectSink::default();
        let cols = names(&["id", "name"]);
        for id in ["1", "oops", "3"] {
            process_data_row(&mut conv, "t1", &cols, &[id.into(), "n".into()], &mut sink)
                .await
                .unwrap();
        }
        assert_eq!(sink.rows.len(), 2);
        assert_eq!(conv.good_rows(), 2);
        assert_eq!(conv.bad_rows(), 1);
        assert_eq!(conv.stats.bad_row_samples[0].values, names(&["oops", "n"]));
    }

    #[test]
    fn test_rule_injected_columns() {
        let mut conv = conv();
        conv.rules.push(rules::TransformationRule::AddShardIdColumn {
            table: rules::ALL_TABLES.into(),
            shard_id: "s1".into(),
        });
        let err = convert_data(&mut conv, "t1", &names(&["id"]), &["1".into()]).unwrap_err();
        assert!(err.to_string().contains("migration_shard_id"));

        let table = conv.target_schema.get_mut("t1").unwrap();
        table.column_ids.push("c6".into());
        table.columns.insert(
            "c6".into(),
            TargetColumn {
                id: "c6".into(),
                name: rules::SHARD_ID_COLUMN.into(),
                ty: TargetType::string_max(),
                not_null: true,
                comment: String::new(),
                sequence_id: None,
            },
        );
        let row = convert_data(&mut conv, "t1", &names(&["id"]), &["1".into()]).unwrap();
        assert_eq!(row.columns, names(&["id", "migration_shard_id", "synth_id"]));
        assert_eq!(row.values[1], Value::String("s1".into()));
    }
}
