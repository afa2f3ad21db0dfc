//! CSV manifest type table.
//!
//! CSV sources declare column types in their manifest using target-style
//! names, so every entry maps one to one.

use super::{SourceDialect, TypeMapper, TypeOption, Length};
use crate::target::schema::TypeCode;

/// CSV manifest → target type mapper.
#[derive(Debug, Clone, Default)]
pub struct CsvTypeMapper;

impl CsvTypeMapper {
    /// Create a new CSV type mapper.
    pub fn new() -> Self {
        Self
    }
}

impl TypeMapper for CsvTypeMapper {
    fn dialect(&self) -> SourceDialect {
        SourceDialect::Csv
    }

    fn candidates(&self, name: &str) -> Option<Vec<TypeOption>> {
        let code = match name {
            "string" => return Some(vec![TypeOption::sized(TypeCode::String, Length::Declared, &[])]),
            "bytes" => return Some(vec![TypeOption::sized(TypeCode::Bytes, Length::Declared, &[])]),
            "bool" => TypeCode::Bool,
            "int64" => TypeCode::Int64,
            "float32" => TypeCode::Float32,
            "float64" => TypeCode::Float64,
            "numeric" => TypeCode::Numeric,
            "date" => TypeCode::Date,
            "timestamp" => TypeCode::Timestamp,
            "json" => TypeCode::Json,
            _ => return None,
        };
        Some(vec![TypeOption::new(code, &[])])
    }

    fn tokens(&self) -> &'static [&'static str] {
        &[
            "bool",
            "int64",
            "float64",
            "numeric",
            "string",
            "bytes",
            "date",
            "timestamp",
            "json",
        ]
    }

    fn universal_token(&self) -> &'static str {
        "string"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::SourceType;
    use crate::target::schema::TargetType;

    #[test]
    fn test_one_to_one() {
        let mapper = CsvTypeMapper::new();
        for token in mapper.tokens() {
            let mapped = mapper.map_type(&SourceType::new(*token), None);
            assert!(mapped.is_lossless(), "{}", token);
            assert_eq!(mapper.type_option(&mapped.target), *token);
        }
        let sized = mapper.map_type(&SourceType::parse("string(20)"), None);
        assert_eq!(sized.target, TargetType::sized(TypeCode::String, 20));
    }
}
