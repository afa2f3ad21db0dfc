//! # spanner-migrate
//!
//! Schema conversion and data migration from relational and NoSQL sources
//! into Spanner.
//!
//! This library provides:
//!
//! - **Introspection** of MySQL and PostgreSQL servers, CSV manifests and
//!   JSON dump documents for the remaining dialects
//! - **Type mapping** from every source dialect to the GoogleSQL and
//!   PostgreSQL flavors of Spanner, with issues recorded per column
//! - **Schema conversion** with interleaving, synthetic keys, sequences and
//!   transformation rules
//! - **DDL emission** in readable or executable form
//! - **Batched writes** under byte and mutation budgets, isolating bad rows
//!   by recursive splitting
//! - **Sessions** that snapshot the conversion state for later runs
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use spanner_migrate::{pipeline, CommitFn, Config, MigrateError, Mutation};
//!
//! #[tokio::main]
//! async fn main() -> spanner_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let commit: Arc<dyn CommitFn> = Arc::new(|batch: Vec<Mutation>| async move {
//!         println!("committing {} mutations", batch.len());
//!         Ok::<(), MigrateError>(())
//!     });
//!     let result = pipeline::run(&config, commit).await?;
//!     println!("Committed {} rows", result.rows_committed);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod conv;
pub mod convert;
pub mod core;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod pool;
pub mod report;
pub mod retry;
pub mod schema;
pub mod source;
pub mod target;
pub mod typemap;
pub mod writer;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig};
pub use conv::{Conv, ConvMode, SchemaIssue, Session};
pub use error::{MigrateError, Result};
pub use pipeline::{migrate_shards, run, validate_shards, MigrationResult};
pub use report::MigrationReport;
pub use source::{InfoSchema, MemoryInfoSchema};
pub use target::{ddl_script, ddl_statements, DdlConfig, TargetDialect};
pub use typemap::SourceDialect;
pub use writer::{BatchWriter, CommitFn, Mutation, WriterConfig, WriterStats};
