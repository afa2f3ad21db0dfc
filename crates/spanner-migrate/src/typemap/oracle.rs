//! Oracle type table.

use super::{Length, SourceDialect, TypeMapper, TypeOption};
use crate::conv::SchemaIssue::*;
use crate::target::schema::TypeCode;

/// Oracle → target type mapper.
#[derive(Debug, Clone, Default)]
pub struct OracleTypeMapper;

impl OracleTypeMapper {
    /// Create a new Oracle type mapper.
    pub fn new() -> Self {
        Self
    }
}

impl TypeMapper for OracleTypeMapper {
    fn dialect(&self) -> SourceDialect {
        SourceDialect::Oracle
    }

    fn candidates(&self, name: &str) -> Option<Vec<TypeOption>> {
        let options = match name {
            "number" => vec![
                TypeOption::new(TypeCode::Numeric, &[]),
                TypeOption::new(TypeCode::Int64, &[]),
                TypeOption::new(TypeCode::Float64, &[]),
            ],
            "float" | "binary_double" => vec![TypeOption::new(TypeCode::Float64, &[])],
            "binary_float" => vec![
                TypeOption::new(TypeCode::Float32, &[]),
                TypeOption::new(TypeCode::Float64, &[Widened]),
            ],

            // Character types
            "char" | "nchar" | "varchar" | "varchar2" | "nvarchar2" => {
                vec![TypeOption::sized(TypeCode::String, Length::Declared, &[])]
            }
            "clob" | "nclob" | "long" => vec![TypeOption::new(TypeCode::String, &[])],
            "xmltype" | "rowid" | "urowid" => {
                vec![TypeOption::new(TypeCode::String, &[NoGoodType])]
            }
            "json" => vec![
                TypeOption::new(TypeCode::Json, &[]),
                TypeOption::new(TypeCode::String, &[]),
            ],

            // Binary types
            "raw" => vec![TypeOption::sized(TypeCode::Bytes, Length::Declared, &[])],
            "blob" | "long raw" | "bfile" => vec![TypeOption::new(TypeCode::Bytes, &[])],

            // Date/time types; DATE carries a time of day.
            "date" => vec![
                TypeOption::new(TypeCode::Timestamp, &[Datetime]),
                TypeOption::new(TypeCode::Date, &[]),
                TypeOption::new(TypeCode::String, &[]),
            ],
            "timestamp" => vec![
                TypeOption::new(TypeCode::Timestamp, &[Timestamp]),
                TypeOption::new(TypeCode::String, &[]),
            ],
            "timestamp with time zone" | "timestamp with local time zone" => vec![
                TypeOption::new(TypeCode::Timestamp, &[]),
                TypeOption::new(TypeCode::String, &[]),
            ],
            "interval year to month" | "interval day to second" => {
                vec![TypeOption::new(TypeCode::String, &[NoGoodType])]
            }

            _ => return None,
        };
        Some(options)
    }

    fn tokens(&self) -> &'static [&'static str] {
        &[
            "NUMBER",
            "BINARY_FLOAT",
            "BINARY_DOUBLE",
            "CLOB",
            "BLOB",
            "DATE",
            "TIMESTAMP WITH TIME ZONE",
            "JSON",
        ]
    }

    fn universal_token(&self) -> &'static str {
        "CLOB"
    }
}
