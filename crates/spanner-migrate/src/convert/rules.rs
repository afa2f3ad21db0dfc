//! Table-scoped transformation rules.
//!
//! Rules act on both phases: the schema processor adds or renames target
//! columns, and the row converter fills in the values.

use serde::{Deserialize, Serialize};

/// Name of the column added by [`TransformationRule::AddShardIdColumn`].
pub const SHARD_ID_COLUMN: &str = "migration_shard_id";

/// Matches every table in a rule's `table` field.
pub const ALL_TABLES: &str = "*";

/// A transformation applied to matching tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformationRule {
    /// Add a shard id column, prepend it to the primary key and fill it
    /// with `shard_id` on every row.
    AddShardIdColumn {
        #[serde(default = "all_tables")]
        table: String,
        shard_id: String,
    },
    /// Rename a target column.
    RenameColumn {
        table: String,
        from: String,
        to: String,
    },
    /// Add a STRING column holding the same value on every row.
    ConstantColumn {
        table: String,
        column: String,
        value: String,
    },
}

fn all_tables() -> String {
    ALL_TABLES.to_string()
}

impl TransformationRule {
    fn table(&self) -> &str {
        match self {
            TransformationRule::AddShardIdColumn { table, .. }
            | TransformationRule::RenameColumn { table, .. }
            | TransformationRule::ConstantColumn { table, .. } => table,
        }
    }

    /// Whether the rule applies to the source table `name`.
    pub fn matches(&self, name: &str) -> bool {
        let table = self.table();
        table == ALL_TABLES || table.eq_ignore_ascii_case(name)
    }
}

/// Extra (column, value) pairs injected into every row of `table`.
pub fn injected_columns(rules: &[TransformationRule], table: &str) -> Vec<(String, String)> {
    rules
        .iter()
        .filter(|rule| rule.matches(table))
        .filter_map(|rule| match rule {
            TransformationRule::AddShardIdColumn { shard_id, .. } => {
                Some((SHARD_ID_COLUMN.to_string(), shard_id.clone()))
            }
            TransformationRule::ConstantColumn { column, value, .. } => {
                Some((column.clone(), value.clone()))
            }
            TransformationRule::RenameColumn { .. } => None,
        })
        .collect()
}

/// Target name of a source column after rename rules.
pub fn renamed_column<'a>(rules: &'a [TransformationRule], table: &str, column: &'a str) -> &'a str {
    rules
        .iter()
        .filter(|rule| rule.matches(table))
        .find_map(|rule| match rule {
            TransformationRule::RenameColumn { from, to, .. } if from == column => {
                Some(to.as_str())
            }
            _ => None,
        })
        .unwrap_or(column)
}

/// Whether a shard id column should be added to `table`.
pub fn has_shard_id(rules: &[TransformationRule], table: &str) -> bool {
    rules.iter().any(|rule| {
        matches!(rule, TransformationRule::AddShardIdColumn { .. }) && rule.matches(table)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> Vec<TransformationRule> {
        vec![
            TransformationRule::AddShardIdColumn {
                table: ALL_TABLES.into(),
                shard_id: "shard-7".into(),
            },
            TransformationRule::RenameColumn {
                table: "users".into(),
                from: "mail".into(),
                to: "email".into(),
            },
            TransformationRule::ConstantColumn {
                table: "orders".into(),
                column: "region".into(),
                value: "eu".into(),
            },
        ]
    }

    #[test]
    fn test_injected_columns() {
        let rules = rules();
        assert_eq!(
            injected_columns(&rules, "users"),
            vec![(SHARD_ID_COLUMN.to_string(), "shard-7".to_string())]
        );
        assert_eq!(injected_columns(&rules, "Orders").len(), 2);
    }

    #[test]
    fn test_rename() {
        let rules = rules();
        assert_eq!(renamed_column(&rules, "users", "mail"), "email");
        assert_eq!(renamed_column(&rules, "orders", "mail"), "mail");
        assert_eq!(renamed_column(&rules, "users", "name"), "name");
    }

    #[test]
    fn test_yaml_form() {
        let yaml = "- kind: add_shard_id_column\n  shard_id: s1\n";
        let rules: Vec<TransformationRule> = serde_yaml::from_str(yaml).unwrap();
        assert!(has_shard_id(&rules, "anything"));
    }
}
