//! Schema and metadata types for source tables, columns, keys, and indexes.
//!
//! Introspectors report metadata by *name* ([`ColumnInfo`], [`ForeignKeyInfo`],
//! [`IndexInfo`]). The schema processor then assigns stable ids and stores
//! the id-based [`SourceTable`] in the conversion state. [`Key`],
//! [`ForeignKey`] and [`Index`] are shared with the target schema.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Namespace-qualified table identity as reported by a source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchemaAndName {
    /// Schema / database / keyspace. Empty when the source has no namespaces.
    pub schema: String,

    /// Table name.
    pub name: String,
}

impl SchemaAndName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        if self.schema.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }
}

/// A source column type with its modifiers.
///
/// `name` is the bare type token (`varchar`, `list<int>`, `NUMBER`), `mods`
/// are the parenthesised modifiers (length, or precision and scale), and
/// `array_bounds` has one entry per array dimension (-1 when unbounded).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceType {
    pub name: String,
    #[serde(default)]
    pub mods: Vec<i64>,
    #[serde(default)]
    pub array_bounds: Vec<i64>,
}

impl SourceType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mods: Vec::new(),
            array_bounds: Vec::new(),
        }
    }

    pub fn with_mods(name: impl Into<String>, mods: &[i64]) -> Self {
        Self {
            name: name.into(),
            mods: mods.to_vec(),
            array_bounds: Vec::new(),
        }
    }

    /// Parse a textual declaration such as `varchar(255)`, `decimal(10, 2)`
    /// or `int4[]`.
    ///
    /// Collection syntax (`list<int>`) is kept verbatim in `name`; the type
    /// mapper resolves it. Modifiers that are not integers (`max`) are
    /// dropped, which leaves the length unbounded.
    pub fn parse(decl: &str) -> Self {
        let mut text = decl.trim().to_string();
        let mut array_bounds = Vec::new();
        while let Some(stripped) = text.strip_suffix(']') {
            let Some(open) = stripped.rfind('[') else {
                break;
            };
            let bound = stripped[open + 1..].trim().parse::<i64>().unwrap_or(-1);
            array_bounds.insert(0, bound);
            text = stripped[..open].trim_end().to_string();
        }

        if text.contains('<') {
            return Self {
                name: text,
                mods: Vec::new(),
                array_bounds,
            };
        }

        let (name, mods) = match (text.find('('), text.rfind(')')) {
            (Some(open), Some(close)) if close > open => {
                let mods = text[open + 1..close]
                    .split(',')
                    .filter_map(|m| m.trim().parse::<i64>().ok())
                    .collect();
                // Keep any suffix after the modifiers, e.g. "bigint(20) unsigned".
                let suffix = text[close + 1..].trim();
                let base = text[..open].trim();
                let name = if suffix.is_empty() {
                    base.to_string()
                } else {
                    format!("{} {}", base, suffix)
                };
                (name, mods)
            }
            _ => (text, Vec::new()),
        };

        Self {
            name,
            mods,
            array_bounds,
        }
    }

    pub fn is_array(&self) -> bool {
        !self.array_bounds.is_empty()
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.mods.is_empty() {
            let mods: Vec<String> = self.mods.iter().map(|m| m.to_string()).collect();
            write!(f, "({})", mods.join(","))?;
        }
        for bound in &self.array_bounds {
            if *bound < 0 {
                write!(f, "[]")?;
            } else {
                write!(f, "[{}]", bound)?;
            }
        }
        Ok(())
    }
}

/// Column metadata as reported by an introspector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub source_type: SourceType,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default)]
    pub default: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            name: name.into(),
            source_type,
            nullable: true,
            auto_increment: false,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Check constraint metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConstraint {
    /// Constraint name.
    pub name: String,

    /// Constraint definition (SQL expression).
    pub expr: String,
}

/// Key and constraint information for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    /// Primary key column names in key ordinal order.
    pub primary_keys: Vec<String>,

    /// Check constraints.
    #[serde(default)]
    pub checks: Vec<CheckConstraint>,

    /// Other constraint kinds (`UNIQUE`, ...) keyed by column name.
    #[serde(default)]
    pub by_column: BTreeMap<String, Vec<String>>,
}

/// Referential action for ON DELETE / ON UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Cascade,
    Restrict,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    /// Parse the spellings used by information_schema and pg_catalog.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().replace('_', " ").as_str() {
            "CASCADE" | "C" => ReferentialAction::Cascade,
            "RESTRICT" | "R" => ReferentialAction::Restrict,
            "SET NULL" | "N" => ReferentialAction::SetNull,
            "SET DEFAULT" | "D" => ReferentialAction::SetDefault,
            _ => ReferentialAction::NoAction,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

/// Foreign key metadata as reported by an introspector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub ref_schema: String,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
    #[serde(default)]
    pub on_delete: ReferentialAction,
    #[serde(default)]
    pub on_update: ReferentialAction,
}

/// Index metadata as reported by an introspector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    /// (column name, descending) in key order.
    pub keys: Vec<(String, bool)>,
    #[serde(default)]
    pub unique: bool,
}

/// One key part of a primary key or index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub column_id: String,
    #[serde(default)]
    pub desc: bool,
    /// 1-based position in the key.
    pub order: usize,
}

/// Id-based foreign key, shared by source and target schemas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub id: String,
    pub name: String,
    pub column_ids: Vec<String>,
    pub ref_table_id: String,
    pub ref_column_ids: Vec<String>,
    #[serde(default)]
    pub on_delete: ReferentialAction,
    #[serde(default)]
    pub on_update: ReferentialAction,
}

/// Id-based index, shared by source and target schemas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub id: String,
    pub name: String,
    pub keys: Vec<Key>,
    #[serde(default)]
    pub unique: bool,
}

/// Source column with its stable id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceColumn {
    pub id: String,
    pub name: String,
    pub source_type: SourceType,
    pub not_null: bool,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default)]
    pub default: Option<String>,
}

/// Source table descriptor stored in the conversion state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTable {
    pub id: String,
    pub name: String,
    pub schema: String,
    /// Column ids in declared order.
    pub column_ids: Vec<String>,
    pub columns: BTreeMap<String, SourceColumn>,
    /// Primary key parts in key ordinal order.
    pub primary_keys: Vec<Key>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub checks: Vec<CheckConstraint>,
}

impl SourceTable {
    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        SchemaAndName::new(self.schema.clone(), self.name.clone()).full_name()
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        !self.primary_keys.is_empty()
    }

    /// Find a column id by (case-sensitive) name.
    pub fn column_id(&self, name: &str) -> Option<&str> {
        self.column_ids
            .iter()
            .find(|id| self.columns.get(*id).is_some_and(|c| c.name == name))
            .map(String::as_str)
    }

    /// Columns in declared order.
    pub fn ordered_columns(&self) -> impl Iterator<Item = &SourceColumn> {
        self.column_ids.iter().filter_map(|id| self.columns.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        let t = SourceType::parse("int");
        assert_eq!(t.name, "int");
        assert!(t.mods.is_empty());
        assert!(!t.is_array());
    }

    #[test]
    fn test_parse_mods() {
        let t = SourceType::parse("decimal(10, 2)");
        assert_eq!(t.name, "decimal");
        assert_eq!(t.mods, vec![10, 2]);
        assert_eq!(t.to_string(), "decimal(10,2)");

        let t = SourceType::parse("nvarchar(max)");
        assert_eq!(t.name, "nvarchar");
        assert!(t.mods.is_empty());

        let t = SourceType::parse("bigint(20) unsigned");
        assert_eq!(t.name, "bigint unsigned");
        assert_eq!(t.mods, vec![20]);
    }

    #[test]
    fn test_parse_arrays() {
        let t = SourceType::parse("int4[]");
        assert_eq!(t.name, "int4");
        assert_eq!(t.array_bounds, vec![-1]);

        let t = SourceType::parse("text[3][]");
        assert_eq!(t.array_bounds, vec![3, -1]);
        assert_eq!(t.to_string(), "text[3][]");
    }

    #[test]
    fn test_parse_collection_kept_verbatim() {
        let t = SourceType::parse("map<text, frozen<list<int>>>");
        assert_eq!(t.name, "map<text, frozen<list<int>>>");
        assert!(t.mods.is_empty());
    }

    #[test]
    fn test_referential_action_parse() {
        assert_eq!(ReferentialAction::parse("CASCADE"), ReferentialAction::Cascade);
        assert_eq!(ReferentialAction::parse("SET_NULL"), ReferentialAction::SetNull);
        assert_eq!(ReferentialAction::parse("set null"), ReferentialAction::SetNull);
        assert_eq!(ReferentialAction::parse("whatever"), ReferentialAction::NoAction);
    }

    #[test]
    fn test_full_name() {
        assert_eq!(SchemaAndName::new("dbo", "Users").full_name(), "dbo.Users");
        assert_eq!(SchemaAndName::new("", "Users").full_name(), "Users");
    }
}
