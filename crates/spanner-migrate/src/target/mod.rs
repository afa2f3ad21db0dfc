//! Target schema model and DDL emission.

pub mod ddl;
pub mod schema;

pub use ddl::{ddl_script, ddl_statements, DdlConfig};
pub use schema::{TargetColumn, TargetDialect, TargetTable, TargetType, TypeCode};
