//! Error types for the migration library.

use thiserror::Error;

/// Classification of errors for retry decisions.
///
/// The retry utility only retries errors whose class appears in the
/// caller-supplied set, so the set of retryable conditions stays explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Deadline exceeded or request timed out.
    Timeout,
    /// Backend temporarily unavailable.
    Unavailable,
    /// Transaction aborted by the backend (lock conflict and similar).
    Aborted,
    /// Quota or resource limit hit.
    ResourceExhausted,
    /// Transport-level connection failure.
    Connection,
    /// Anything else; never retried.
    Permanent,
}

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema-level failure naming the table (and column when known).
    #[error("Schema error in table {table}: {message}")]
    Schema { table: String, message: String },

    /// Requested target flavor does not match the one the state was built for.
    #[error("Dialect mismatch: expected {expected}, got {actual}")]
    DialectMismatch { expected: String, actual: String },

    /// Source database connection or query error
    #[error("Source database error: {0}")]
    Source(String),

    /// Connection pool error with context.
    #[error("Connection pool error ({context}): {message}")]
    Pool { message: String, context: String },

    /// A single value or row could not be converted.
    #[error("Conversion failed for table {table}: {message}")]
    Conversion { table: String, message: String },

    /// Commit callback failure.
    #[error("Commit failed ({class:?}): {message}")]
    Commit { class: ErrorClass, message: String },

    /// Operation is not supported by this source dialect.
    #[error("{operation} is not supported for {dialect} sources")]
    Unsupported { dialect: String, operation: String },

    /// Retry budget exhausted for a retryable error.
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<MigrateError>,
    },

    /// Several independent failures collected from a worker pool.
    #[error("{} tasks failed:\n  {}", .0.len(), .0.join("\n  "))]
    Multiple(Vec<String>),

    /// Session snapshot error
    #[error("Session error: {0}")]
    Session(String),

    /// Background task panicked or was cancelled.
    #[error("Task failed: {0}")]
    Task(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV parsing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// MySQL driver error
    #[cfg(feature = "mysql")]
    #[error("MySQL error: {0}")]
    Mysql(#[from] sqlx::Error),

    /// PostgreSQL driver error
    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

impl MigrateError {
    /// Create a Schema error
    pub fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Schema {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Pool error with context
    pub fn pool<E: std::fmt::Display>(err: E, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: err.to_string(),
            context: context.into(),
        }
    }

    /// Create a Conversion error
    pub fn conversion(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Conversion {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Commit error with the given class.
    pub fn commit(class: ErrorClass, message: impl Into<String>) -> Self {
        MigrateError::Commit {
            class,
            message: message.into(),
        }
    }

    /// Create the "not supported" sentinel for a dialect capability gap.
    pub fn unsupported(dialect: impl Into<String>, operation: impl Into<String>) -> Self {
        MigrateError::Unsupported {
            dialect: dialect.into(),
            operation: operation.into(),
        }
    }

    /// Whether this is the capability-gap sentinel.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, MigrateError::Unsupported { .. })
    }

    /// Retry classification of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            MigrateError::Commit { class, .. } => *class,
            MigrateError::Pool { .. } => ErrorClass::Connection,
            MigrateError::Io(e) => match e.kind() {
                std::io::ErrorKind::TimedOut => ErrorClass::Timeout,
                std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::BrokenPipe => ErrorClass::Connection,
                _ => ErrorClass::Permanent,
            },
            #[cfg(feature = "mysql")]
            MigrateError::Mysql(e) => match e {
                sqlx::Error::PoolTimedOut => ErrorClass::Timeout,
                sqlx::Error::Io(_) => ErrorClass::Connection,
                _ => ErrorClass::Permanent,
            },
            #[cfg(feature = "postgres")]
            MigrateError::Postgres(e) if e.is_closed() => ErrorClass::Connection,
            _ => ErrorClass::Permanent,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
