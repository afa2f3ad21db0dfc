//! Target (Spanner) schema types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::schema::{CheckConstraint, ForeignKey, Index, Key, ReferentialAction};

/// Length value meaning "MAX" for STRING and BYTES columns.
pub const MAX_LENGTH: i64 = i64::MAX;

/// Largest explicit STRING length.
pub const STRING_MAX_LENGTH: i64 = 2_621_440;

/// Largest explicit BYTES length.
pub const BYTES_MAX_LENGTH: i64 = 10_485_760;

/// NUMERIC precision and scale limits.
pub const NUMERIC_PRECISION: i64 = 38;
pub const NUMERIC_SCALE: i64 = 9;

/// SQL flavor of the target database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetDialect {
    #[default]
    GoogleSql,
    #[serde(rename = "postgresql", alias = "postgres")]
    PostgreSql,
}

impl TargetDialect {
    pub fn name(&self) -> &'static str {
        match self {
            TargetDialect::GoogleSql => "google_sql",
            TargetDialect::PostgreSql => "postgresql",
        }
    }

    /// Parse a dialect name from configuration.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "google_sql" | "googlesql" | "google_standard_sql" => Some(TargetDialect::GoogleSql),
            "postgresql" | "postgres" | "pg" => Some(TargetDialect::PostgreSql),
            _ => None,
        }
    }
}

/// Scalar type code of a target column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TypeCode {
    Bool,
    Int64,
    Float32,
    Float64,
    Numeric,
    String,
    Bytes,
    Date,
    Timestamp,
    Json,
}

impl TypeCode {
    /// GoogleSQL spelling of the type name.
    pub fn google_name(&self) -> &'static str {
        match self {
            TypeCode::Bool => "BOOL",
            TypeCode::Int64 => "INT64",
            TypeCode::Float32 => "FLOAT32",
            TypeCode::Float64 => "FLOAT64",
            TypeCode::Numeric => "NUMERIC",
            TypeCode::String => "STRING",
            TypeCode::Bytes => "BYTES",
            TypeCode::Date => "DATE",
            TypeCode::Timestamp => "TIMESTAMP",
            TypeCode::Json => "JSON",
        }
    }

    /// PostgreSQL-flavor spelling of the type name.
    pub fn pg_name(&self) -> &'static str {
        match self {
            TypeCode::Bool => "boolean",
            TypeCode::Int64 => "bigint",
            TypeCode::Float32 => "real",
            TypeCode::Float64 => "double precision",
            TypeCode::Numeric => "numeric",
            TypeCode::String => "character varying",
            TypeCode::Bytes => "bytea",
            TypeCode::Date => "date",
            TypeCode::Timestamp => "timestamptz",
            TypeCode::Json => "jsonb",
        }
    }

    /// Parse either spelling (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        let code = match s.trim().to_uppercase().as_str() {
            "BOOL" | "BOOLEAN" => TypeCode::Bool,
            "INT64" | "BIGINT" | "INT8" => TypeCode::Int64,
            "FLOAT32" | "REAL" | "FLOAT4" => TypeCode::Float32,
            "FLOAT64" | "DOUBLE PRECISION" | "FLOAT8" => TypeCode::Float64,
            "NUMERIC" => TypeCode::Numeric,
            "STRING" | "VARCHAR" | "CHARACTER VARYING" | "TEXT" => TypeCode::String,
            "BYTES" | "BYTEA" => TypeCode::Bytes,
            "DATE" => TypeCode::Date,
            "TIMESTAMP" | "TIMESTAMPTZ" => TypeCode::Timestamp,
            "JSON" | "JSONB" => TypeCode::Json,
            _ => return None,
        };
        Some(code)
    }

    /// Whether the type carries a length.
    pub fn has_length(&self) -> bool {
        matches!(self, TypeCode::String | TypeCode::Bytes)
    }
}

/// A target column type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetType {
    pub code: TypeCode,
    /// Length for STRING/BYTES ([`MAX_LENGTH`] for MAX); 0 otherwise.
    #[serde(default)]
    pub len: i64,
    #[serde(default)]
    pub is_array: bool,
}

impl TargetType {
    /// Scalar type without a length.
    pub fn scalar(code: TypeCode) -> Self {
        let len = if code.has_length() { MAX_LENGTH } else { 0 };
        Self {
            code,
            len,
            is_array: false,
        }
    }

    /// STRING/BYTES with an explicit length.
    pub fn sized(code: TypeCode, len: i64) -> Self {
        Self {
            code,
            len,
            is_array: false,
        }
    }

    /// The universal fallback representation, STRING(MAX).
    pub fn string_max() -> Self {
        Self::scalar(TypeCode::String)
    }

    /// Wrap as an array of this type.
    pub fn into_array(mut self) -> Self {
        self.is_array = true;
        self
    }

    /// Render the type in the given flavor, e.g. `ARRAY<STRING(MAX)>` or
    /// `character varying(36)[]`.
    pub fn to_ddl(&self, dialect: TargetDialect) -> String {
        match dialect {
            TargetDialect::GoogleSql => {
                let mut s = self.code.google_name().to_string();
                if self.code.has_length() {
                    if self.len == MAX_LENGTH || self.len <= 0 {
                        s.push_str("(MAX)");
                    } else {
                        s.push_str(&format!("({})", self.len));
                    }
                }
                if self.is_array {
                    format!("ARRAY<{}>", s)
                } else {
                    s
                }
            }
            TargetDialect::PostgreSql => {
                let mut s = self.code.pg_name().to_string();
                if self.code == TypeCode::String && self.len != MAX_LENGTH && self.len > 0 {
                    s.push_str(&format!("({})", self.len));
                }
                if self.is_array {
                    s.push_str("[]");
                }
                s
            }
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ddl(TargetDialect::GoogleSql))
    }
}

/// Target column descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetColumn {
    pub id: String,
    pub name: String,
    pub ty: TargetType,
    pub not_null: bool,
    /// Annotation emitted in readable DDL (source column/type).
    #[serde(default)]
    pub comment: String,
    /// Sequence feeding this column's default, if any.
    #[serde(default)]
    pub sequence_id: Option<String>,
}

/// Interleaving relationship with a parent table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterleaveParent {
    pub table_id: String,
    #[serde(default)]
    pub on_delete: ReferentialAction,
}

/// Target table descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetTable {
    pub id: String,
    pub name: String,
    /// Column ids in declared order.
    pub column_ids: Vec<String>,
    pub columns: BTreeMap<String, TargetColumn>,
    pub primary_keys: Vec<Key>,
    #[serde(default)]
    pub parent: Option<InterleaveParent>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub checks: Vec<CheckConstraint>,
    #[serde(default)]
    pub comment: String,
}

impl TargetTable {
    /// Columns in declared order.
    pub fn ordered_columns(&self) -> impl Iterator<Item = &TargetColumn> {
        self.column_ids.iter().filter_map(|id| self.columns.get(id))
    }

    /// Column name for an id, or the id itself when unknown.
    pub fn column_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.columns.get(id).map(|c| c.name.as_str()).unwrap_or(id)
    }

    /// Check that every key, FK and index column id exists in the table.
    pub fn dangling_column_ids(&self) -> Vec<String> {
        let mut missing = Vec::new();
        let referenced = self
            .primary_keys
            .iter()
            .map(|k| &k.column_id)
            .chain(self.foreign_keys.iter().flat_map(|fk| fk.column_ids.iter()))
            .chain(
                self.indexes
                    .iter()
                    .flat_map(|idx| idx.keys.iter().map(|k| &k.column_id)),
            );
        for id in referenced {
            if !self.column_ids.contains(id) && !missing.contains(id) {
                missing.push(id.clone());
            }
        }
        missing
    }
}

/// Sequence backing an auto-generated key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: String,
    pub name: String,
    /// Sequence kind; bit-reversed sequences avoid key hot-spotting.
    pub kind: String,
    #[serde(default)]
    pub start_with: Option<i64>,
}
