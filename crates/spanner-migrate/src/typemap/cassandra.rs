//! Cassandra (CQL) type table.

use super::{SourceDialect, TypeMapper, TypeOption, Length};
use crate::conv::SchemaIssue::*;
use crate::target::schema::TypeCode;

/// Cassandra → target type mapper.
///
/// `list<>`, `set<>`, `map<>`, `tuple<>` and `frozen<>` use the generic
/// collection syntax.
#[derive(Debug, Clone, Default)]
pub struct CassandraTypeMapper;

impl CassandraTypeMapper {
    /// Create a new Cassandra type mapper.
    pub fn new() -> Self {
        Self
    }
}

impl TypeMapper for CassandraTypeMapper {
    fn dialect(&self) -> SourceDialect {
        SourceDialect::Cassandra
    }

    fn candidates(&self, name: &str) -> Option<Vec<TypeOption>> {
        let options = match name {
            "boolean" => vec![TypeOption::new(TypeCode::Bool, &[])],
            "tinyint" | "smallint" | "int" => vec![TypeOption::new(TypeCode::Int64, &[Widened])],
            "bigint" | "counter" => vec![TypeOption::new(TypeCode::Int64, &[])],
            "varint" => vec![
                TypeOption::new(TypeCode::Numeric, &[]),
                TypeOption::new(TypeCode::String, &[]),
            ],
            "decimal" => vec![
                TypeOption::new(TypeCode::Numeric, &[]),
                TypeOption::new(TypeCode::String, &[]),
            ],
            "float" => vec![
                TypeOption::new(TypeCode::Float32, &[]),
                TypeOption::new(TypeCode::Float64, &[Widened]),
            ],
            "double" => vec![TypeOption::new(TypeCode::Float64, &[])],
            "ascii" | "text" | "varchar" | "inet" => vec![TypeOption::new(TypeCode::String, &[])],
            "blob" => vec![TypeOption::new(TypeCode::Bytes, &[])],
            "date" => vec![
                TypeOption::new(TypeCode::Date, &[]),
                TypeOption::new(TypeCode::String, &[]),
            ],
            "timestamp" => vec![
                TypeOption::new(TypeCode::Timestamp, &[]),
                TypeOption::new(TypeCode::String, &[]),
            ],
            // Nanoseconds since midnight.
            "time" => vec![
                TypeOption::new(TypeCode::Int64, &[Time]),
                TypeOption::new(TypeCode::String, &[Time]),
            ],
            "uuid" | "timeuuid" => vec![
                TypeOption::sized(TypeCode::String, Length::Fixed(36), &[UuidVersion]),
                TypeOption::new(TypeCode::Bytes, &[UuidVersion]),
            ],
            "duration" => vec![TypeOption::new(TypeCode::String, &[NoGoodType])],
            _ => return None,
        };
        Some(options)
    }

    fn array_token(&self, element: &str) -> Option<String> {
        Some(format!("list<{}>", element))
    }

    fn tokens(&self) -> &'static [&'static str] {
        &[
            "boolean",
            "bigint",
            "float",
            "double",
            "decimal",
            "text",
            "blob",
            "date",
            "timestamp",
        ]
    }

    fn universal_token(&self) -> &'static str {
        "text"
    }
}
