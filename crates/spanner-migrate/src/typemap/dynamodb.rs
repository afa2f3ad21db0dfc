//! DynamoDB attribute type table.
//!
//! Attribute type descriptors are single tokens (`S`, `N`, `SS`, ...). The
//! set types become arrays; `L` and `M` hold arbitrary nested documents and
//! become JSON.

use super::{Collection, SourceDialect, TypeMapper, TypeOption};
use crate::target::schema::TypeCode;

/// DynamoDB → target type mapper.
#[derive(Debug, Clone, Default)]
pub struct DynamoDbTypeMapper;

impl DynamoDbTypeMapper {
    /// Create a new DynamoDB type mapper.
    pub fn new() -> Self {
        Self
    }
}

impl TypeMapper for DynamoDbTypeMapper {
    fn dialect(&self) -> SourceDialect {
        SourceDialect::DynamoDb
    }

    fn candidates(&self, name: &str) -> Option<Vec<TypeOption>> {
        let options = match name {
            "s" => vec![TypeOption::new(TypeCode::String, &[])],
            "n" => vec![
                TypeOption::new(TypeCode::Numeric, &[]),
                TypeOption::new(TypeCode::Int64, &[]),
                TypeOption::new(TypeCode::Float64, &[]),
                TypeOption::new(TypeCode::String, &[]),
            ],
            "b" => vec![TypeOption::new(TypeCode::Bytes, &[])],
            "bool" => vec![TypeOption::new(TypeCode::Bool, &[])],
            "l" | "m" => vec![
                TypeOption::new(TypeCode::Json, &[]),
                TypeOption::new(TypeCode::String, &[]),
            ],
            _ => return None,
        };
        Some(options)
    }

    fn collection(&self, name: &str) -> Option<Collection> {
        let element = match name.to_lowercase().as_str() {
            "ss" => "S",
            "ns" => "N",
            "bs" => "B",
            _ => return None,
        };
        Some(Collection::Array(element.to_string()))
    }

    fn array_token(&self, element: &str) -> Option<String> {
        let token = match element {
            "S" => "SS",
            "N" => "NS",
            "B" => "BS",
            _ => "L",
        };
        Some(token.to_string())
    }

    fn tokens(&self) -> &'static [&'static str] {
        &["BOOL", "N", "S", "B", "M"]
    }

    fn universal_token(&self) -> &'static str {
        "S"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::SourceType;
    use crate::target::schema::TargetType;

    fn map(name: &str) -> TargetType {
        DynamoDbTypeMapper::new()
            .map_type(&SourceType::new(name), None)
            .target
    }

    #[test]
    fn test_attribute_types() {
        assert_eq!(map("S"), TargetType::string_max());
        assert_eq!(map("N").code, TypeCode::Numeric);
        assert_eq!(map("NS"), TargetType::scalar(TypeCode::Numeric).into_array());
        assert_eq!(map("BS"), TargetType::scalar(TypeCode::Bytes).into_array());
        assert_eq!(map("L").code, TypeCode::Json);
        assert_eq!(map("M").code, TypeCode::Json);
    }

    #[test]
    fn test_type_option() {
        let mapper = DynamoDbTypeMapper::new();
        assert_eq!(mapper.type_option(&TargetType::scalar(TypeCode::Int64)), "N");
        assert_eq!(
            mapper.type_option(&TargetType::string_max().into_array()),
            "SS"
        );
        assert_eq!(
            mapper.type_option(&TargetType::scalar(TypeCode::Bool).into_array()),
            "L"
        );
    }
}
