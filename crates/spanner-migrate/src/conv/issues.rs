//! Schema conversion issues.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A conversion risk recorded against a column (or a whole table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaIssue {
    /// Safe upcast to a wider type.
    Widened,
    PrecisionLoss,
    /// Length clamped to the target maximum.
    StringOverflow,
    /// No good target type; fell back to a universal representation.
    NoGoodType,
    Timestamp,
    Time,
    Datetime,
    AutoIncrement,
    Serial,
    DefaultValue,
    MultiDimensionalArray,
    UuidVersion,
    Unsigned,
    MissingPrimaryKey,
    ForeignKeyOnInterleave,
    IdentifierRenamed,
    CheckConstraint,
}

/// Severity of an issue in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Note,
    Warning,
}

impl SchemaIssue {
    /// Human-readable explanation used in reports and DDL comments.
    pub fn description(&self) -> &'static str {
        match self {
            SchemaIssue::Widened => "type widened to a larger representation",
            SchemaIssue::PrecisionLoss => "numeric precision or scale exceeds NUMERIC; values may be rounded",
            SchemaIssue::StringOverflow => "declared length exceeds the target maximum; using MAX",
            SchemaIssue::NoGoodType => "no good type match; using a universal representation",
            SchemaIssue::Timestamp => "timestamp without time zone stored as UTC TIMESTAMP",
            SchemaIssue::Time => "time of day stored as a string",
            SchemaIssue::Datetime => "datetime without time zone stored as UTC TIMESTAMP",
            SchemaIssue::AutoIncrement => "auto-increment replaced by a bit-reversed sequence",
            SchemaIssue::Serial => "serial replaced by a bit-reversed sequence",
            SchemaIssue::DefaultValue => "column default not migrated",
            SchemaIssue::MultiDimensionalArray => "multi-dimensional array stored as JSON",
            SchemaIssue::UuidVersion => "UUID version information is not preserved",
            SchemaIssue::Unsigned => "unsigned range may exceed INT64",
            SchemaIssue::MissingPrimaryKey => "no primary key; added synthetic key column",
            SchemaIssue::ForeignKeyOnInterleave => "foreign key converted to interleaving",
            SchemaIssue::IdentifierRenamed => "identifier renamed to a legal, unique name",
            SchemaIssue::CheckConstraint => "check constraint dropped",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            SchemaIssue::Widened
            | SchemaIssue::Timestamp
            | SchemaIssue::Datetime
            | SchemaIssue::AutoIncrement
            | SchemaIssue::Serial
            | SchemaIssue::ForeignKeyOnInterleave
            | SchemaIssue::IdentifierRenamed => Severity::Note,
            _ => Severity::Warning,
        }
    }
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity() {
        assert_eq!(SchemaIssue::Widened.severity(), Severity::Note);
        assert_eq!(SchemaIssue::NoGoodType.severity(), Severity::Warning);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&SchemaIssue::MissingPrimaryKey).unwrap();
        assert_eq!(json, "\"missing_primary_key\"");
    }
}
