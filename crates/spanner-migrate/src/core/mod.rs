//! Core types shared by every stage of a migration.
//!
//! - [`schema`]: source table, column, key and constraint metadata
//! - [`value`]: raw source values and converted target values
//! - [`identifier`]: identifier validation, quoting and normalization

pub mod identifier;
pub mod schema;
pub mod value;

pub use schema::{
    CheckConstraint, ColumnInfo, Constraints, ForeignKey, ForeignKeyInfo, Index, IndexInfo, Key,
    ReferentialAction, SchemaAndName, SourceColumn, SourceTable, SourceType,
};
pub use value::{RawValue, Value};
