//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};
use crate::typemap::SourceDialect;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let source = &config.source;
    match source.r#type {
        SourceDialect::Csv => {
            if source.path.is_none() {
                return Err(MigrateError::Config(
                    "source.path (manifest) is required for csv sources".into(),
                ));
            }
        }
        SourceDialect::Mysql | SourceDialect::Postgres if !source.is_file_source() => {
            if source.host.is_empty() {
                return Err(MigrateError::Config("source.host is required".into()));
            }
            if source.database.is_empty() {
                return Err(MigrateError::Config("source.database is required".into()));
            }
            if source.user.is_empty() {
                return Err(MigrateError::Config("source.user is required".into()));
            }
        }
        SourceDialect::Mysql | SourceDialect::Postgres => {}
        other => {
            if !source.is_file_source() {
                return Err(MigrateError::Config(format!(
                    "source.type '{}' is only supported from a dump document (source.path)",
                    other.name()
                )));
            }
        }
    }
    if source.max_connections == 0 {
        return Err(MigrateError::Config(
            "source.max_connections must be at least 1".into(),
        ));
    }

    let writer = &config.writer;
    if writer.bytes_limit == 0 {
        return Err(MigrateError::Config(
            "writer.bytes_limit must be at least 1".into(),
        ));
    }
    if writer.mutation_limit == 0 {
        return Err(MigrateError::Config(
            "writer.mutation_limit must be at least 1".into(),
        ));
    }
    if writer.write_limit == 0 {
        return Err(MigrateError::Config(
            "writer.write_limit must be at least 1".into(),
        ));
    }

    let migration = &config.migration;
    if migration.workers == 0 {
        return Err(MigrateError::Config(
            "migration.workers must be at least 1".into(),
        ));
    }
    if migration.null_marker.is_empty() {
        return Err(MigrateError::Config(
            "migration.null_marker cannot be empty".into(),
        ));
    }

    Ok(())
}
