//! End-to-end migration runs.
//!
//! A run opens the configured source, builds (or resumes) the conversion
//! state, emits DDL, streams every table through the row converter into the
//! batch writer, and finally saves the session and report. Several sources
//! (shards) can run side by side through [`migrate_shards`].

mod shards;

pub use shards::{migrate_shards, validate_shards};

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::{Config, SourceConfig};
use crate::conv::{Conv, Session};
use crate::error::{MigrateError, Result};
use crate::report::MigrationReport;
use crate::schema::{process_schema, SchemaOptions};
use crate::source::{CsvInfoSchema, InfoSchema, MemoryInfoSchema};
use crate::target::{ddl_statements, DdlConfig};
use crate::typemap::{mapper_for, SourceDialect};
use crate::writer::{BatchWriter, CommitFn, WriterStats};

/// Outcome of one migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    /// Tables in the target schema.
    pub tables_total: usize,

    /// Rows converted and handed to the writer.
    pub rows_converted: u64,

    /// Rows that failed conversion.
    pub rows_bad: u64,

    /// Rows committed by the writer.
    pub rows_committed: u64,

    /// Rows the writer dropped after failed commits.
    pub rows_dropped: u64,

    /// Executable DDL for the target schema.
    pub ddl: Vec<String>,
}

impl MigrationResult {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Open the introspector for a source configuration.
pub async fn open_source(config: &SourceConfig) -> Result<Box<dyn InfoSchema>> {
    if let Some(path) = &config.path {
        if config.r#type == SourceDialect::Csv {
            return Ok(Box::new(CsvInfoSchema::from_manifest(path)?));
        }
        let dump = MemoryInfoSchema::load(path)?;
        if dump.dialect() != config.r#type {
            return Err(MigrateError::DialectMismatch {
                expected: config.r#type.name().to_string(),
                actual: dump.dialect().name().to_string(),
            });
        }
        return Ok(Box::new(dump));
    }

    match config.r#type {
        #[cfg(feature = "mysql")]
        SourceDialect::Mysql => Ok(Box::new(crate::source::MysqlInfoSchema::new(config).await?)),
        #[cfg(feature = "postgres")]
        SourceDialect::Postgres => {
            Ok(Box::new(crate::source::PostgresInfoSchema::new(config).await?))
        }
        other => Err(MigrateError::unsupported(
            other.name(),
            "direct connection (use a dump document)",
        )),
    }
}

/// Fresh conversion state for a configuration.
pub fn new_conv(config: &Config) -> Conv {
    let mut conv = Conv::new(config.source.r#type, config.target.dialect)
        .with_mode(config.migration.mode);
    conv.rules = config.migration.rules.clone();
    conv.null_marker = config.migration.null_marker.clone();
    conv.bad_row_sample_limit = config.migration.bad_row_sample_limit;
    conv
}

/// Resume from the configured session file when it exists.
fn resume_or_new(config: &Config) -> Result<Conv> {
    let Some(path) = &config.migration.session_file else {
        return Ok(new_conv(config));
    };
    if !path.exists() {
        return Ok(new_conv(config));
    }
    let session = Session::load(path)?;
    session.validate_config(&config.hash())?;
    if session.conv.target_dialect != config.target.dialect {
        return Err(MigrateError::DialectMismatch {
            expected: config.target.dialect.name().to_string(),
            actual: session.conv.target_dialect.name().to_string(),
        });
    }
    info!("Resuming session {} from {}", session.session_id, path.display());
    let mut conv = session.conv;
    conv.mode = config.migration.mode;
    Ok(conv)
}

/// Run the schema and data phases selected by `conv.mode` against `source`.
///
/// The schema is (re)built when the mode includes it or when `conv` has
/// none yet. Bad rows and dropped writes are counted, never fatal. A table
/// whose row stream fails is recorded in `conv.stats.table_errors` and the
/// remaining tables still run; the writer is always flushed.
pub async fn migrate(
    conv: &mut Conv,
    source: &dyn InfoSchema,
    options: &SchemaOptions,
    writer: &mut BatchWriter,
) -> Result<(Vec<String>, WriterStats)> {
    let mapper = mapper_for(source.dialect());
    if conv.mode.includes_schema() || conv.src_schema.is_empty() {
        process_schema(conv, source, mapper.as_ref(), options).await?;
    }
    let ddl = ddl_statements(conv, &DdlConfig::executable().with_flavor(conv.target_dialect))?;
    info!("Target schema: {} statements", ddl.len());

    if conv.mode.includes_data() {
        conv.stats.reset_data();
        let total: u64 = conv.stats.rows.values().sum();
        conv.progress.start(total);
        let table_ids: Vec<String> = conv.src_schema.keys().cloned().collect();
        for table_id in &table_ids {
            if let Err(e) = source.process_data(conv, table_id, writer).await {
                let name = conv
                    .src_schema
                    .get(table_id)
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|| table_id.clone());
                error!("{}: reading rows failed, continuing with next table: {}", name, e);
                conv.stats.table_errors.insert(name, e.to_string());
            }
        }
        writer.flush().await?;
        info!(
            "Converted {} rows ({} bad)",
            conv.good_rows(),
            conv.bad_rows()
        );
    }
    Ok((ddl, writer.stats().await))
}

/// Migrate one configured source, committing rows through `commit`.
pub async fn run(config: &Config, commit: Arc<dyn CommitFn>) -> Result<MigrationResult> {
    config.validate()?;
    let run_id = uuid::Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let start = Instant::now();
    info!("Starting run {} ({} source)", run_id, config.source.r#type.name());

    let mut conv = resume_or_new(config)?;
    let source = open_source(&config.source).await?;
    let options = SchemaOptions {
        interleave: config.migration.interleave,
        workers: config.migration.workers,
    };
    let mut writer = BatchWriter::new(config.writer.clone(), commit);

    let outcome = migrate(&mut conv, source.as_ref(), &options, &mut writer).await;
    source.close().await;
    let (ddl, writer_stats) = outcome?;

    if let Some(path) = &config.migration.session_file {
        let mut session = Session::new(conv.clone(), config.hash());
        session.save(path)?;
        info!("Saved session to {}", path.display());
    }
    let report = MigrationReport::build(&conv, Some(&writer_stats));
    if let Some(path) = &config.migration.report_file {
        report.write_to(path)?;
        info!("Wrote report to {}", path.display());
    }
    if report.total_bad_rows() > 0 || report.total_dropped_rows() > 0 {
        warn!(
            "{} bad rows and {} dropped rows; see the report for samples",
            report.total_bad_rows(),
            report.total_dropped_rows()
        );
    }

    if !conv.stats.table_errors.is_empty() {
        return Err(MigrateError::Multiple(
            conv.stats
                .table_errors
                .iter()
                .map(|(table, e)| format!("{}: {}", table, e))
                .collect(),
        ));
    }

    let duration = start.elapsed().as_secs_f64();
    let status = if writer_stats.dropped_rows() > 0 || conv.bad_rows() > 0 {
        "completed_with_errors"
    } else {
        "completed"
    };
    Ok(MigrationResult {
        run_id,
        status: status.to_string(),
        duration_seconds: duration,
        started_at,
        completed_at: Utc::now(),
        tables_total: conv.target_schema.len(),
        rows_converted: conv.good_rows(),
        rows_bad: conv.bad_rows(),
        rows_committed: writer_stats.committed_rows(),
        rows_dropped: writer_stats.dropped_rows(),
        ddl,
    })
}
