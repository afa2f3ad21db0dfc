//! SQL Server type table.

use super::{Length, SourceDialect, TypeMapper, TypeOption};
use crate::conv::SchemaIssue::*;
use crate::target::schema::TypeCode;

/// SQL Server → target type mapper.
///
/// `varchar(max)` arrives either without a modifier or with length -1 from
/// `sys.columns`; both become MAX.
#[derive(Debug, Clone, Default)]
pub struct SqlServerTypeMapper;

impl SqlServerTypeMapper {
    /// Create a new SQL Server type mapper.
    pub fn new() -> Self {
        Self
    }
}

impl TypeMapper for SqlServerTypeMapper {
    fn dialect(&self) -> SourceDialect {
        SourceDialect::SqlServer
    }

    fn candidates(&self, name: &str) -> Option<Vec<TypeOption>> {
        let options = match name {
            // Boolean
            "bit" => vec![
                TypeOption::new(TypeCode::Bool, &[]),
                TypeOption::new(TypeCode::Int64, &[Widened]),
            ],

            // Integer types
            "tinyint" | "smallint" | "int" => vec![TypeOption::new(TypeCode::Int64, &[Widened])],
            "bigint" => vec![TypeOption::new(TypeCode::Int64, &[])],

            // Decimal/numeric
            "decimal" | "numeric" => vec![
                TypeOption::new(TypeCode::Numeric, &[]),
                TypeOption::new(TypeCode::String, &[]),
            ],
            "money" | "smallmoney" => vec![TypeOption::new(TypeCode::Numeric, &[])],

            // Floating point
            "float" => vec![TypeOption::new(TypeCode::Float64, &[])],
            "real" => vec![
                TypeOption::new(TypeCode::Float32, &[]),
                TypeOption::new(TypeCode::Float64, &[Widened]),
            ],

            // String types
            "char" | "nchar" | "varchar" | "nvarchar" => {
                vec![TypeOption::sized(TypeCode::String, Length::Declared, &[])]
            }
            "text" | "ntext" | "xml" => vec![TypeOption::new(TypeCode::String, &[])],

            // Binary types
            "binary" | "varbinary" => vec![TypeOption::sized(TypeCode::Bytes, Length::Declared, &[])],
            "image" => vec![TypeOption::new(TypeCode::Bytes, &[])],
            "timestamp" | "rowversion" => vec![TypeOption::sized(TypeCode::Bytes, Length::Fixed(8), &[])],

            // Date/time types
            "date" => vec![
                TypeOption::new(TypeCode::Date, &[]),
                TypeOption::new(TypeCode::String, &[]),
            ],
            "time" => vec![TypeOption::new(TypeCode::String, &[Time])],
            "datetime" | "datetime2" | "smalldatetime" => vec![
                TypeOption::new(TypeCode::Timestamp, &[Datetime]),
                TypeOption::new(TypeCode::String, &[]),
            ],
            "datetimeoffset" => vec![
                TypeOption::new(TypeCode::Timestamp, &[]),
                TypeOption::new(TypeCode::String, &[]),
            ],

            // GUID
            "uniqueidentifier" => vec![
                TypeOption::sized(TypeCode::String, Length::Fixed(36), &[]),
                TypeOption::new(TypeCode::Bytes, &[]),
            ],

            // Spatial and other CLR types (convert to text)
            "geometry" | "geography" | "hierarchyid" | "sql_variant" => {
                vec![TypeOption::new(TypeCode::String, &[NoGoodType])]
            }

            _ => return None,
        };
        Some(options)
    }

    fn tokens(&self) -> &'static [&'static str] {
        &[
            "bit",
            "bigint",
            "real",
            "float",
            "decimal",
            "nvarchar",
            "varbinary",
            "date",
            "datetimeoffset",
        ]
    }

    fn universal_token(&self) -> &'static str {
        "nvarchar"
    }
}
