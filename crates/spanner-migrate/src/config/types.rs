//! Configuration types.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::conv::{ConvMode, DEFAULT_BAD_ROW_SAMPLE_LIMIT, DEFAULT_NULL_MARKER};
use crate::convert::rules::TransformationRule;
use crate::target::schema::TargetDialect;
use crate::typemap::SourceDialect;
use crate::writer::WriterConfig;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration.
    pub source: SourceConfig,

    /// Target database configuration.
    #[serde(default)]
    pub target: TargetConfig,

    /// Batch writer budgets.
    #[serde(default)]
    pub writer: WriterConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source dialect.
    pub r#type: SourceDialect,

    /// Database host (network sources).
    #[serde(default)]
    pub host: String,

    /// Database port. Zero selects the dialect default.
    #[serde(default)]
    pub port: u16,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Source schema. Defaults to the database (MySQL) or "public" (PostgreSQL).
    #[serde(default)]
    pub schema: Option<String>,

    /// Manifest (CSV) or dump document (file sources).
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// SSL mode for PostgreSQL sources (default: "prefer").
    #[serde(default = "default_prefer")]
    pub ssl_mode: String,
}

impl SourceConfig {
    /// Port to connect to, falling back to the dialect default.
    pub fn effective_port(&self) -> u16 {
        if self.port != 0 {
            return self.port;
        }
        match self.r#type {
            SourceDialect::Mysql => 3306,
            SourceDialect::Postgres => 5432,
            SourceDialect::SqlServer => 1433,
            SourceDialect::Oracle => 1521,
            SourceDialect::Cassandra => 9042,
            _ => 0,
        }
    }

    /// Schema to introspect.
    pub fn effective_schema(&self) -> String {
        match (&self.schema, self.r#type) {
            (Some(schema), _) => schema.clone(),
            (None, SourceDialect::Postgres) => "public".to_string(),
            (None, _) => self.database.clone(),
        }
    }

    /// Whether this source is read from a local file rather than a server.
    pub fn is_file_source(&self) -> bool {
        self.path.is_some()
    }
}

// Custom Debug implementation that redacts the password.
impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("path", &self.path)
            .field("max_connections", &self.max_connections)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Target database configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    /// SQL flavor of the target database (default: google_sql).
    #[serde(default)]
    pub dialect: TargetDialect,

    /// Project the target instance lives in.
    #[serde(default)]
    pub project: String,

    /// Target instance.
    #[serde(default)]
    pub instance: String,

    /// Target database name.
    #[serde(default)]
    pub database: String,
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Phases to run (default: schema_and_data).
    #[serde(default)]
    pub mode: ConvMode,

    /// Turn eligible foreign keys into interleaving (default: true).
    #[serde(default = "default_true")]
    pub interleave: bool,

    /// Text read as NULL in textual sources (default: "NULL").
    #[serde(default = "default_null_marker")]
    pub null_marker: String,

    /// Cap on sampled bad rows per table (default: 100).
    #[serde(default = "default_bad_row_sample_limit")]
    pub bad_row_sample_limit: usize,

    /// Tables introspected concurrently (default: 4).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Abort remaining tables on the first introspection failure.
    #[serde(default)]
    pub fast_exit: bool,

    /// Emit annotated rather than strictly executable DDL.
    #[serde(default)]
    pub readable_ddl: bool,

    /// Transformation rules applied to schema and data.
    #[serde(default)]
    pub rules: Vec<TransformationRule>,

    /// Where the session snapshot is written.
    #[serde(default)]
    pub session_file: Option<PathBuf>,

    /// Where the text report is written.
    #[serde(default)]
    pub report_file: Option<PathBuf>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            mode: ConvMode::default(),
            interleave: true,
            null_marker: default_null_marker(),
            bad_row_sample_limit: default_bad_row_sample_limit(),
            workers: default_workers(),
            fast_exit: false,
            readable_ddl: false,
            rules: Vec::new(),
            session_file: None,
            report_file: None,
        }
    }
}

// Default value functions for serde
fn default_max_connections() -> usize {
    4
}

fn default_prefer() -> String {
    "prefer".to_string()
}

fn default_true() -> bool {
    true
}

fn default_null_marker() -> String {
    DEFAULT_NULL_MARKER.to_string()
}

fn default_bad_row_sample_limit() -> usize {
    DEFAULT_BAD_ROW_SAMPLE_LIMIT
}

fn default_workers() -> usize {
    4
}
