//! PostgreSQL type table.
//!
//! Names follow `format_type()` output (`character varying`, `timestamp
//! without time zone`) plus the common aliases and `udt_name` spellings.
//! Arrays arrive either with `[]` bounds or as `_elem` udt names.

use super::{parse_collection, Collection, Length, SourceDialect, TypeMapper, TypeOption};
use crate::conv::SchemaIssue::*;
use crate::target::schema::TypeCode;

/// PostgreSQL → target type mapper.
#[derive(Debug, Clone, Default)]
pub struct PostgresTypeMapper;

impl PostgresTypeMapper {
    /// Create a new PostgreSQL type mapper.
    pub fn new() -> Self {
        Self
    }
}

impl TypeMapper for PostgresTypeMapper {
    fn dialect(&self) -> SourceDialect {
        SourceDialect::Postgres
    }

    fn candidates(&self, name: &str) -> Option<Vec<TypeOption>> {
        let options = match name {
            "boolean" | "bool" => vec![TypeOption::new(TypeCode::Bool, &[])],

            // Integer types
            "smallint" | "int2" | "integer" | "int" | "int4" => {
                vec![TypeOption::new(TypeCode::Int64, &[Widened])]
            }
            "bigint" | "int8" => vec![TypeOption::new(TypeCode::Int64, &[])],
            "smallserial" | "serial2" | "serial" | "serial4" => {
                vec![TypeOption::new(TypeCode::Int64, &[Widened, Serial])]
            }
            "bigserial" | "serial8" => vec![TypeOption::new(TypeCode::Int64, &[Serial])],

            // Floating point and decimal
            "real" | "float4" => vec![
                TypeOption::new(TypeCode::Float32, &[]),
                TypeOption::new(TypeCode::Float64, &[Widened]),
            ],
            "double precision" | "float8" | "float" => {
                vec![TypeOption::new(TypeCode::Float64, &[])]
            }
            "numeric" | "decimal" => vec![
                TypeOption::new(TypeCode::Numeric, &[]),
                TypeOption::new(TypeCode::String, &[]),
            ],
            "money" => vec![TypeOption::new(TypeCode::Numeric, &[])],

            // String types
            "character varying" | "varchar" | "character" | "char" | "bpchar" => {
                vec![TypeOption::sized(TypeCode::String, Length::Declared, &[])]
            }
            "text" | "citext" | "name" => vec![TypeOption::new(TypeCode::String, &[])],
            "uuid" => vec![
                TypeOption::sized(TypeCode::String, Length::Fixed(36), &[]),
                TypeOption::new(TypeCode::Bytes, &[]),
            ],
            "json" | "jsonb" => vec![
                TypeOption::new(TypeCode::Json, &[]),
                TypeOption::new(TypeCode::String, &[]),
            ],
            "xml" | "inet" | "cidr" | "macaddr" | "tsvector" => {
                vec![TypeOption::new(TypeCode::String, &[NoGoodType])]
            }

            // Binary
            "bytea" => vec![TypeOption::new(TypeCode::Bytes, &[])],

            // Date/time types
            "date" => vec![
                TypeOption::new(TypeCode::Date, &[]),
                TypeOption::new(TypeCode::String, &[]),
            ],
            "timestamp with time zone" | "timestamptz" => vec![
                TypeOption::new(TypeCode::Timestamp, &[]),
                TypeOption::new(TypeCode::String, &[]),
            ],
            "timestamp without time zone" | "timestamp" => vec![
                TypeOption::new(TypeCode::Timestamp, &[Timestamp]),
                TypeOption::new(TypeCode::String, &[]),
            ],
            "time without time zone" | "time with time zone" | "time" | "timetz" => {
                vec![TypeOption::new(TypeCode::String, &[Time])]
            }
            "interval" => vec![TypeOption::new(TypeCode::String, &[NoGoodType])],

            _ => return None,
        };
        Some(options)
    }

    fn collection(&self, name: &str) -> Option<Collection> {
        match name.strip_prefix('_') {
            Some(element) if !element.is_empty() => Some(Collection::Array(element.to_string())),
            _ => parse_collection(name),
        }
    }

    fn array_token(&self, element: &str) -> Option<String> {
        Some(format!("{}[]", element))
    }

    fn tokens(&self) -> &'static [&'static str] {
        &[
            "boolean",
            "bigint",
            "real",
            "double precision",
            "numeric",
            "text",
            "bytea",
            "date",
            "timestamptz",
            "jsonb",
        ]
    }

    fn universal_token(&self) -> &'static str {
        "text"
    }
}
