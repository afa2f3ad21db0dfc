//! Type mapping from source column types to target types.
//!
//! Each source dialect has one table mapping a bare type token to an ordered
//! list of [`TypeOption`] candidates. The first candidate is the default; a
//! caller may request another by target type name. Collections are resolved
//! recursively, one element at a time. Mapping never fails: anything the
//! tables do not know becomes `STRING(MAX)` tagged [`SchemaIssue::NoGoodType`].

mod cassandra;
mod csv;
mod dynamodb;
mod mysql;
mod oracle;
mod postgres;
mod sqlserver;

pub use self::cassandra::CassandraTypeMapper;
pub use self::csv::CsvTypeMapper;
pub use self::dynamodb::DynamoDbTypeMapper;
pub use self::mysql::MysqlTypeMapper;
pub use self::oracle::OracleTypeMapper;
pub use self::postgres::PostgresTypeMapper;
pub use self::sqlserver::SqlServerTypeMapper;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::conv::SchemaIssue;
use crate::core::schema::SourceType;
use crate::target::schema::{
    TargetType, TypeCode, BYTES_MAX_LENGTH, MAX_LENGTH, NUMERIC_PRECISION, NUMERIC_SCALE,
    STRING_MAX_LENGTH,
};

/// Source database dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceDialect {
    #[default]
    Mysql,
    Postgres,
    #[serde(rename = "sqlserver", alias = "mssql")]
    SqlServer,
    Oracle,
    Cassandra,
    #[serde(rename = "dynamodb")]
    DynamoDb,
    Csv,
}

impl SourceDialect {
    pub fn name(&self) -> &'static str {
        match self {
            SourceDialect::Mysql => "mysql",
            SourceDialect::Postgres => "postgres",
            SourceDialect::SqlServer => "sqlserver",
            SourceDialect::Oracle => "oracle",
            SourceDialect::Cassandra => "cassandra",
            SourceDialect::DynamoDb => "dynamodb",
            SourceDialect::Csv => "csv",
        }
    }

    /// Parse a dialect name from configuration.
    pub fn parse(s: &str) -> Option<Self> {
        let dialect = match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => SourceDialect::Mysql,
            "postgres" | "postgresql" | "pg" => SourceDialect::Postgres,
            "sqlserver" | "mssql" | "sql_server" => SourceDialect::SqlServer,
            "oracle" => SourceDialect::Oracle,
            "cassandra" => SourceDialect::Cassandra,
            "dynamodb" => SourceDialect::DynamoDb,
            "csv" => SourceDialect::Csv,
            _ => return None,
        };
        Some(dialect)
    }
}

impl fmt::Display for SourceDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a candidate derives the target length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    /// The type has no length (or the default MAX for STRING/BYTES).
    Max,
    /// Always this length.
    Fixed(i64),
    /// Take the first declared modifier; MAX when absent or non-positive.
    Declared,
}

/// One target candidate for a source type token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeOption {
    pub code: TypeCode,
    pub length: Length,
    pub issues: &'static [SchemaIssue],
}

impl TypeOption {
    pub const fn new(code: TypeCode, issues: &'static [SchemaIssue]) -> Self {
        Self {
            code,
            length: Length::Max,
            issues,
        }
    }

    pub const fn sized(code: TypeCode, length: Length, issues: &'static [SchemaIssue]) -> Self {
        Self {
            code,
            length,
            issues,
        }
    }
}

/// Result of mapping one source type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedType {
    pub target: TargetType,
    pub issues: Vec<SchemaIssue>,
}

impl MappedType {
    pub fn new(target: TargetType, issues: Vec<SchemaIssue>) -> Self {
        let mut mapped = Self {
            target,
            issues: Vec::new(),
        };
        for issue in issues {
            mapped.push_issue(issue);
        }
        mapped
    }

    /// `STRING(MAX)` with [`SchemaIssue::NoGoodType`].
    pub fn fallback() -> Self {
        Self::new(TargetType::string_max(), vec![SchemaIssue::NoGoodType])
    }

    /// JSON carrying the given element issues.
    fn json(issues: Vec<SchemaIssue>) -> Self {
        Self::new(TargetType::scalar(TypeCode::Json), issues)
    }

    /// Whether the mapping is 1:1 without loss.
    pub fn is_lossless(&self) -> bool {
        self.issues.is_empty()
    }

    /// Whether the source type had no real target equivalent.
    pub fn is_unmapped(&self) -> bool {
        self.issues.contains(&SchemaIssue::NoGoodType)
    }

    fn push_issue(&mut self, issue: SchemaIssue) {
        if !self.issues.contains(&issue) {
            self.issues.push(issue);
        }
    }
}

/// Collection syntax recognised in a type token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collection {
    /// `list<T>`, `set<T>`, `_t` (PostgreSQL array), `SS`/`NS`/`BS`.
    Array(String),
    /// `frozen<T>`: same as `T`.
    Frozen(String),
    /// `map<K, V>` and `tuple<A, B, ..>`: stored as JSON.
    Composite(Vec<String>),
}

/// Maps source column types of one dialect onto target types.
pub trait TypeMapper: Send + Sync {
    /// The dialect this mapper handles.
    fn dialect(&self) -> SourceDialect;

    /// Candidates for a lowercased bare type token, default first.
    fn candidates(&self, name: &str) -> Option<Vec<TypeOption>>;

    /// Source tokens in preference order, used by [`TypeMapper::type_option`].
    fn tokens(&self) -> &'static [&'static str];

    /// Token that represents any value as a string in this dialect.
    fn universal_token(&self) -> &'static str;

    /// Collection syntax of this dialect. Defaults to the generic
    /// `list<>`/`set<>`/`frozen<>`/`map<>`/`tuple<>` forms.
    fn collection(&self, name: &str) -> Option<Collection> {
        parse_collection(name)
    }

    /// Source spelling of an array of `element`, when the dialect has one.
    fn array_token(&self, _element: &str) -> Option<String> {
        None
    }

    /// Map a source type, optionally requesting a non-default target type
    /// by name. Unknown requests fall back to the default candidate.
    fn map_type(&self, ty: &SourceType, requested: Option<&str>) -> MappedType {
        map_source_type(self, ty, requested)
    }

    /// Invert a target type to the best matching source token.
    fn type_option(&self, target: &TargetType) -> String {
        if target.is_array {
            let element = TargetType {
                is_array: false,
                ..target.clone()
            };
            let token = self.type_option(&element);
            return self
                .array_token(&token)
                .unwrap_or_else(|| self.universal_token().to_string());
        }
        let tokens = self.tokens();
        let default_match = tokens.iter().find(|tok| {
            self.candidates(&tok.to_lowercase())
                .and_then(|opts| opts.first().copied())
                .is_some_and(|opt| opt.code == target.code)
        });
        let any_match = || {
            tokens.iter().find(|tok| {
                self.candidates(&tok.to_lowercase())
                    .is_some_and(|opts| opts.iter().any(|opt| opt.code == target.code))
            })
        };
        default_match
            .or_else(any_match)
            .map(|tok| tok.to_string())
            .unwrap_or_else(|| self.universal_token().to_string())
    }
}

/// Get the type mapper for a source dialect.
pub fn mapper_for(dialect: SourceDialect) -> Box<dyn TypeMapper> {
    match dialect {
        SourceDialect::Mysql => Box::new(MysqlTypeMapper::new()),
        SourceDialect::Postgres => Box::new(PostgresTypeMapper::new()),
        SourceDialect::SqlServer => Box::new(SqlServerTypeMapper::new()),
        SourceDialect::Oracle => Box::new(OracleTypeMapper::new()),
        SourceDialect::Cassandra => Box::new(CassandraTypeMapper::new()),
        SourceDialect::DynamoDb => Box::new(DynamoDbTypeMapper::new()),
        SourceDialect::Csv => Box::new(CsvTypeMapper::new()),
    }
}

/// Split `outer<a, b<c, d>>` into `outer` and its top-level arguments.
fn split_generic(name: &str) -> Option<(String, Vec<String>)> {
    let open = name.find('<')?;
    let inner = name.trim_end().strip_suffix('>')?;
    let outer = name[..open].trim().to_lowercase();
    let body = &inner[open + 1..];

    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                args.push(body[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    args.push(body[start..].trim().to_string());
    if args.iter().any(String::is_empty) {
        return None;
    }
    Some((outer, args))
}

/// Generic collection syntax shared by the dialects.
pub fn parse_collection(name: &str) -> Option<Collection> {
    let (outer, mut args) = split_generic(name)?;
    match (outer.as_str(), args.len()) {
        ("list" | "set", 1) => args.pop().map(Collection::Array),
        ("frozen", 1) => args.pop().map(Collection::Frozen),
        ("map", 2) | ("tuple", _) => Some(Collection::Composite(args)),
        _ => None,
    }
}

/// Map an array whose element type is `element`.
fn map_array<M: TypeMapper + ?Sized>(mapper: &M, element: &SourceType) -> MappedType {
    let inner = map_source_type(mapper, element, None);
    if inner.target.is_array {
        // Nested arrays have no target equivalent.
        let mut mapped = MappedType::json(inner.issues);
        mapped.push_issue(SchemaIssue::NoGoodType);
        return mapped;
    }
    if inner.is_unmapped() {
        return MappedType::json(inner.issues);
    }
    MappedType::new(inner.target.into_array(), inner.issues)
}

fn map_source_type<M: TypeMapper + ?Sized>(
    mapper: &M,
    ty: &SourceType,
    requested: Option<&str>,
) -> MappedType {
    // Declared array dimensions (`int4[]`, `text[][]`).
    if ty.is_array() {
        let element = SourceType::with_mods(ty.name.clone(), &ty.mods);
        if ty.array_bounds.len() > 1 {
            let inner = map_source_type(mapper, &element, None);
            let mut mapped = MappedType::json(inner.issues);
            mapped.push_issue(SchemaIssue::MultiDimensionalArray);
            return mapped;
        }
        return map_array(mapper, &element);
    }

    if let Some(collection) = mapper.collection(&ty.name) {
        return match collection {
            Collection::Array(element) => map_array(mapper, &SourceType::parse(&element)),
            Collection::Frozen(inner) => map_source_type(mapper, &SourceType::parse(&inner), requested),
            Collection::Composite(elements) => {
                let mut issues = Vec::new();
                let mut unmapped = false;
                for element in &elements {
                    let inner = map_source_type(mapper, &SourceType::parse(element), None);
                    unmapped |= inner.is_unmapped();
                    issues.extend(inner.issues);
                }
                let mut mapped = MappedType::json(issues);
                if unmapped {
                    mapped.push_issue(SchemaIssue::NoGoodType);
                }
                mapped
            }
        };
    }

    let token = ty.name.trim().to_lowercase();
    let Some(options) = mapper.candidates(&token) else {
        return MappedType::fallback();
    };
    let Some(default) = options.first().copied() else {
        return MappedType::fallback();
    };
    let option = requested
        .and_then(TypeCode::parse)
        .and_then(|code| options.iter().copied().find(|opt| opt.code == code))
        .unwrap_or(default);

    apply_option(option, ty)
}

/// Build the target type for a chosen candidate, applying modifiers.
fn apply_option(option: TypeOption, ty: &SourceType) -> MappedType {
    let mut mapped = MappedType::new(TargetType::scalar(option.code), option.issues.to_vec());

    if option.code.has_length() {
        let declared = match option.length {
            Length::Max => MAX_LENGTH,
            Length::Fixed(len) => len,
            Length::Declared => match ty.mods.first() {
                Some(&len) if len > 0 => len,
                _ => MAX_LENGTH,
            },
        };
        let limit = if option.code == TypeCode::String {
            STRING_MAX_LENGTH
        } else {
            BYTES_MAX_LENGTH
        };
        mapped.target.len = if declared != MAX_LENGTH && declared > limit {
            mapped.push_issue(SchemaIssue::StringOverflow);
            MAX_LENGTH
        } else {
            declared
        };
    }

    if option.code == TypeCode::Numeric {
        let precision = ty.mods.first().copied().unwrap_or(0);
        let scale = ty.mods.get(1).copied().unwrap_or(0);
        if precision > NUMERIC_PRECISION || scale > NUMERIC_SCALE {
            mapped.push_issue(SchemaIssue::PrecisionLoss);
        }
    }

    mapped
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SourceDialect; 7] = [
        SourceDialect::Mysql,
        SourceDialect::Postgres,
        SourceDialect::SqlServer,
        SourceDialect::Oracle,
        SourceDialect::Cassandra,
        SourceDialect::DynamoDb,
        SourceDialect::Csv,
    ];

    #[test]
    fn test_split_generic() {
        let (outer, args) = split_generic("map<text, frozen<list<int>>>").unwrap();
        assert_eq!(outer, "map");
        assert_eq!(args, vec!["text", "frozen<list<int>>"]);
        assert!(split_generic("list<int").is_none());
        assert!(split_generic("list<>").is_none());
    }

    #[test]
    fn test_mapping_is_total() {
        let junk = ["", "???", "list<", "map<a>", "geography(4326)", "x[1][2][3]"];
        for dialect in ALL {
            let mapper = mapper_for(dialect);
            for name in junk {
                let mapped = mapper.map_type(&SourceType::parse(name), None);
                assert!(!mapped.issues.is_empty(), "{}: {:?}", dialect, name);
            }
        }
    }

    #[test]
    fn test_mapping_is_deterministic() {
        for dialect in ALL {
            let mapper = mapper_for(dialect);
            for token in mapper.tokens() {
                let ty = SourceType::parse(token);
                assert_eq!(mapper.map_type(&ty, None), mapper.map_type(&ty, None));
            }
        }
    }

    #[test]
    fn test_universal_token_maps_to_string() {
        for dialect in ALL {
            let mapper = mapper_for(dialect);
            let mapped = mapper.map_type(&SourceType::new(mapper.universal_token()), None);
            assert_eq!(mapped.target.code, TypeCode::String, "{}", dialect);
        }
    }

    #[test]
    fn test_type_option_defaults_to_universal_token() {
        let mapper = mapper_for(SourceDialect::Csv);
        let target = TargetType::scalar(TypeCode::Float32);
        assert_eq!(mapper.type_option(&target), "string");
    }

    #[test]
    fn test_collection_issue_propagation() {
        let mapper = mapper_for(SourceDialect::Cassandra);

        let ok = mapper.map_type(&SourceType::parse("list<int>"), None);
        assert_eq!(ok.target, TargetType::scalar(TypeCode::Int64).into_array());
        assert_eq!(ok.issues, vec![SchemaIssue::Widened]);

        let bad = mapper.map_type(&SourceType::parse("list<nosuchtype>"), None);
        assert_eq!(bad.target.code, TypeCode::Json);
        assert!(bad.issues.contains(&SchemaIssue::NoGoodType));

        let nested = mapper.map_type(&SourceType::parse("list<frozen<list<int>>>"), None);
        assert_eq!(nested.target.code, TypeCode::Json);
        assert!(nested.issues.contains(&SchemaIssue::NoGoodType));
        assert!(nested.issues.contains(&SchemaIssue::Widened));
    }

    #[test]
    fn test_string_overflow_clamps_to_max() {
        let mapper = mapper_for(SourceDialect::Mysql);
        let mapped = mapper.map_type(&SourceType::with_mods("varchar", &[3_000_000]), None);
        assert_eq!(mapped.target.len, MAX_LENGTH);
        assert_eq!(mapped.issues, vec![SchemaIssue::StringOverflow]);
    }

    #[test]
    fn test_requested_option() {
        let mapper = mapper_for(SourceDialect::Mysql);
        let ty = SourceType::with_mods("tinyint", &[4]);
        assert_eq!(mapper.map_type(&ty, None).target.code, TypeCode::Int64);
        assert_eq!(mapper.map_type(&ty, Some("BOOL")).target.code, TypeCode::Bool);
        // Unknown request falls back to the default.
        assert_eq!(mapper.map_type(&ty, Some("DATE")).target.code, TypeCode::Int64);

        let flag = SourceType::with_mods("tinyint", &[1]);
        assert_eq!(mapper.map_type(&flag, None).target.code, TypeCode::Bool);
        assert_eq!(mapper.map_type(&flag, Some("INT64")).target.code, TypeCode::Int64);
    }
}
