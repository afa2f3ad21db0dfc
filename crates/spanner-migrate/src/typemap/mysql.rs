//! MySQL type table.

use super::{map_source_type, Length, MappedType, SourceDialect, TypeMapper, TypeOption};
use crate::conv::SchemaIssue::*;
use crate::core::schema::SourceType;
use crate::target::schema::TypeCode;

/// MySQL → target type mapper.
#[derive(Debug, Clone, Default)]
pub struct MysqlTypeMapper;

impl MysqlTypeMapper {
    /// Create a new MySQL type mapper.
    pub fn new() -> Self {
        Self
    }
}

fn mysql_candidates(name: &str) -> Option<Vec<TypeOption>> {
    let options = match name {
        // Boolean
        "bool" | "boolean" => vec![TypeOption::new(TypeCode::Bool, &[])],
        "bit" => vec![
            TypeOption::new(TypeCode::Bytes, &[]),
            TypeOption::new(TypeCode::Bool, &[]),
            TypeOption::new(TypeCode::Int64, &[]),
        ],

        // Integer types
        "tinyint" => vec![
            TypeOption::new(TypeCode::Int64, &[Widened]),
            TypeOption::new(TypeCode::Bool, &[]),
        ],
        "smallint" | "mediumint" | "int" | "integer" => {
            vec![TypeOption::new(TypeCode::Int64, &[Widened])]
        }
        "bigint" => vec![TypeOption::new(TypeCode::Int64, &[])],
        "tinyint unsigned" | "smallint unsigned" | "mediumint unsigned" | "int unsigned"
        | "integer unsigned" => vec![TypeOption::new(TypeCode::Int64, &[Widened])],
        "bigint unsigned" => vec![
            TypeOption::new(TypeCode::Int64, &[Unsigned]),
            TypeOption::new(TypeCode::Numeric, &[]),
        ],
        "year" => vec![TypeOption::new(TypeCode::Int64, &[Widened])],

        // Floating point and decimal
        "float" => vec![
            TypeOption::new(TypeCode::Float32, &[]),
            TypeOption::new(TypeCode::Float64, &[Widened]),
        ],
        "double" | "double precision" | "real" => vec![TypeOption::new(TypeCode::Float64, &[])],
        "decimal" | "numeric" | "dec" | "fixed" => vec![
            TypeOption::new(TypeCode::Numeric, &[]),
            TypeOption::new(TypeCode::String, &[]),
        ],

        // String types
        "char" | "varchar" => vec![TypeOption::sized(TypeCode::String, Length::Declared, &[])],
        "tinytext" | "text" | "mediumtext" | "longtext" => {
            vec![TypeOption::new(TypeCode::String, &[])]
        }
        "enum" | "set" => vec![TypeOption::new(TypeCode::String, &[])],
        "json" => vec![
            TypeOption::new(TypeCode::Json, &[]),
            TypeOption::new(TypeCode::String, &[]),
        ],

        // Binary types
        "binary" | "varbinary" => vec![TypeOption::sized(TypeCode::Bytes, Length::Declared, &[])],
        "tinyblob" | "blob" | "mediumblob" | "longblob" => {
            vec![TypeOption::new(TypeCode::Bytes, &[])]
        }

        // Date/time types
        "date" => vec![
            TypeOption::new(TypeCode::Date, &[]),
            TypeOption::new(TypeCode::String, &[]),
        ],
        "datetime" => vec![
            TypeOption::new(TypeCode::Timestamp, &[Datetime]),
            TypeOption::new(TypeCode::String, &[]),
        ],
        "timestamp" => vec![
            TypeOption::new(TypeCode::Timestamp, &[]),
            TypeOption::new(TypeCode::String, &[]),
        ],
        "time" => vec![TypeOption::new(TypeCode::String, &[Time])],

        // Spatial types (convert to text)
        "geometry" | "point" | "linestring" | "polygon" | "multipoint" | "multilinestring"
        | "multipolygon" | "geometrycollection" => {
            vec![TypeOption::new(TypeCode::String, &[NoGoodType])]
        }

        _ => {
            let base = name
                .strip_suffix(" zerofill")
                .or_else(|| name.strip_suffix(" unsigned"))?;
            return mysql_candidates(base.trim_end());
        }
    };
    Some(options)
}

impl TypeMapper for MysqlTypeMapper {
    fn dialect(&self) -> SourceDialect {
        SourceDialect::Mysql
    }

    fn candidates(&self, name: &str) -> Option<Vec<TypeOption>> {
        mysql_candidates(name)
    }

    /// `tinyint(1)` is MySQL's boolean spelling and defaults to BOOL.
    fn map_type(&self, ty: &SourceType, requested: Option<&str>) -> MappedType {
        let is_flag = ty.name.eq_ignore_ascii_case("tinyint") && ty.mods == [1] && !ty.is_array();
        match requested {
            None if is_flag => map_source_type(self, ty, Some("BOOL")),
            _ => map_source_type(self, ty, requested),
        }
    }

    fn tokens(&self) -> &'static [&'static str] {
        &[
            "bool", "bigint", "double", "float", "decimal", "text", "varchar", "longblob",
            "date", "timestamp", "datetime", "json",
        ]
    }

    fn universal_token(&self) -> &'static str {
        "text"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conv::SchemaIssue;
    use crate::target::schema::{TargetType, MAX_LENGTH};

    fn map(decl: &str) -> (TargetType, Vec<SchemaIssue>) {
        let mapped = MysqlTypeMapper::new().map_type(&SourceType::parse(decl), None);
        (mapped.target, mapped.issues)
    }

    #[test]
    fn test_integer_types() {
        assert_eq!(map("int(11)"), (TargetType::scalar(TypeCode::Int64), vec![Widened]));
        assert_eq!(map("bigint(20)"), (TargetType::scalar(TypeCode::Int64), vec![]));
        assert_eq!(
            map("bigint(20) unsigned"),
            (TargetType::scalar(TypeCode::Int64), vec![Unsigned])
        );
        assert_eq!(
            map("int(10) unsigned zerofill"),
            (TargetType::scalar(TypeCode::Int64), vec![Widened])
        );
    }

    #[test]
    fn test_tinyint_flag_maps_to_bool() {
        assert_eq!(map("tinyint(1)"), (TargetType::scalar(TypeCode::Bool), vec![]));
        assert_eq!(map("TINYINT(1)").0.code, TypeCode::Bool);
        assert_eq!(map("tinyint(4)"), (TargetType::scalar(TypeCode::Int64), vec![Widened]));
        assert_eq!(map("tinyint"), (TargetType::scalar(TypeCode::Int64), vec![Widened]));
        assert_eq!(map("tinyint(1) unsigned").0.code, TypeCode::Int64);

        let ty = SourceType::parse("tinyint(1)");
        let widened = MysqlTypeMapper::new().map_type(&ty, Some("INT64"));
        assert_eq!(widened.target.code, TypeCode::Int64);
    }

    #[test]
    fn test_string_types() {
        assert_eq!(
            map("varchar(255)"),
            (TargetType::sized(TypeCode::String, 255), vec![])
        );
        assert_eq!(map("longtext").0.len, MAX_LENGTH);
    }

    #[test]
    fn test_decimal_types() {
        assert_eq!(map("decimal(10,2)"), (TargetType::scalar(TypeCode::Numeric), vec![]));
        assert_eq!(map("decimal(65,30)").1, vec![PrecisionLoss]);
    }

    #[test]
    fn test_datetime_types() {
        assert_eq!(map("datetime").1, vec![Datetime]);
        assert_eq!(map("timestamp").1, vec![]);
        assert_eq!(map("time"), (TargetType::string_max(), vec![Time]));
    }

    #[test]
    fn test_special_types() {
        assert_eq!(map("json").0.code, TypeCode::Json);
        assert_eq!(map("geometry").1, vec![NoGoodType]);
        assert_eq!(map("blob").0, TargetType::scalar(TypeCode::Bytes));
    }

    #[test]
    fn test_type_option() {
        let mapper = MysqlTypeMapper::new();
        assert_eq!(mapper.type_option(&TargetType::scalar(TypeCode::Int64)), "bigint");
        assert_eq!(mapper.type_option(&TargetType::scalar(TypeCode::Bool)), "bool");
        assert_eq!(
            mapper.type_option(&TargetType::scalar(TypeCode::Int64).into_array()),
            "text"
        );
    }
}
