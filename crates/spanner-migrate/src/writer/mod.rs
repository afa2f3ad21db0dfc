//! Batched, concurrency-bounded writes to the target.
//!
//! Rows accumulate first-fit into a write unit until the next row would
//! exceed the byte or mutation budget. Full units are committed by spawned
//! tasks, at most `write_limit` at a time; `add_row` waits for a free slot.
//! A unit whose commit fails is split in half and each half committed on
//! its own, down to single rows, which are then dropped and counted.

mod mutation;

pub use mutation::Mutation;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::conv::BadRow;
use crate::convert::ConvertedRow;
use crate::core::value::Value;
use crate::error::{MigrateError, Result};
use crate::source::RowSink;

/// Error recorded for rows that exceed a unit budget on their own.
pub const OVERSIZE_ROW_ERROR: &str = "row exceeds write unit limits";

/// Batch writer budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Serialized bytes per write unit.
    #[serde(default = "default_bytes_limit")]
    pub bytes_limit: usize,

    /// Cells per write unit.
    #[serde(default = "default_mutation_limit")]
    pub mutation_limit: usize,

    /// Write units in flight at once.
    #[serde(default = "default_write_limit")]
    pub write_limit: usize,

    /// Maximum split depth for a failing unit.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Log every unit.
    #[serde(default)]
    pub verbose: bool,

    /// Dropped rows kept as samples.
    #[serde(default = "default_bad_row_sample_limit")]
    pub bad_row_sample_limit: usize,
}

fn default_bytes_limit() -> usize {
    100 * 1024 * 1024
}

fn default_mutation_limit() -> usize {
    80_000
}

fn default_write_limit() -> usize {
    40
}

fn default_retry_limit() -> u32 {
    1000
}

fn default_bad_row_sample_limit() -> usize {
    100
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            bytes_limit: default_bytes_limit(),
            mutation_limit: default_mutation_limit(),
            write_limit: default_write_limit(),
            retry_limit: default_retry_limit(),
            verbose: false,
            bad_row_sample_limit: default_bad_row_sample_limit(),
        }
    }
}

/// Commits one write unit to the target.
///
/// Implemented for any `Fn(Vec<Mutation>) -> impl Future<Output = Result<()>>`.
#[async_trait]
pub trait CommitFn: Send + Sync {
    async fn commit(&self, mutations: Vec<Mutation>) -> Result<()>;
}

#[async_trait]
impl<F, Fut> CommitFn for F
where
    F: Fn(Vec<Mutation>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn commit(&self, mutations: Vec<Mutation>) -> Result<()> {
        (self)(mutations).await
    }
}

/// Counters shared by the writer and its tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriterStats {
    /// Rows committed, by table.
    pub committed: BTreeMap<String, u64>,
    /// Rows dropped, by table.
    pub dropped: BTreeMap<String, u64>,
    /// Sample of dropped rows.
    pub dropped_samples: Vec<BadRow>,
    /// Error message → rows dropped with it.
    pub errors: BTreeMap<String, u64>,
    /// Commit calls made, including retries of split units.
    pub commits: u64,
    pub failed_commits: u64,
    /// Units currently being committed.
    pub in_flight: usize,
    /// Highest `in_flight` seen.
    pub max_in_flight: usize,
}

impl WriterStats {
    pub fn committed_rows(&self) -> u64 {
        self.committed.values().sum()
    }

    pub fn dropped_rows(&self) -> u64 {
        self.dropped.values().sum()
    }
}

/// State shared with dispatched units.
struct Shared {
    commit: Arc<dyn CommitFn>,
    stats: Mutex<WriterStats>,
    retry_limit: u32,
    sample_limit: usize,
    verbose: bool,
}

impl Shared {
    async fn record_committed(&self, unit: &[Mutation]) {
        let mut stats = self.stats.lock().await;
        stats.commits += 1;
        for m in unit {
            *stats.committed.entry(m.table.clone()).or_default() += 1;
        }
    }

    async fn record_dropped(&self, unit: Vec<Mutation>, error: &str) {
        let mut stats = self.stats.lock().await;
        *stats.errors.entry(error.to_string()).or_default() += unit.len() as u64;
        for m in unit {
            *stats.dropped.entry(m.table.clone()).or_default() += 1;
            if stats.dropped_samples.len() < self.sample_limit {
                stats.dropped_samples.push(BadRow {
                    values: m.values.iter().map(Value::display).collect(),
                    table: m.table,
                    columns: m.columns,
                    error: error.to_string(),
                });
            }
        }
    }
}

/// Commit `unit`; on failure split it and commit the halves in turn.
fn write_unit(shared: Arc<Shared>, mut unit: Vec<Mutation>, depth: u32) -> BoxFuture<'static, ()> {
    async move {
        let rows = unit.len();
        match shared.commit.commit(unit.clone()).await {
            Ok(()) => {
                if shared.verbose {
                    debug!("Committed unit of {} rows (depth {})", rows, depth);
                }
                shared.record_committed(&unit).await;
            }
            Err(e) => {
                let message = e.to_string();
                shared.stats.lock().await.failed_commits += 1;
                if rows <= 1 || depth >= shared.retry_limit {
                    warn!("Dropping {} rows after failed commit: {}", rows, message);
                    shared.record_dropped(unit, &message).await;
                    return;
                }
                if shared.verbose {
                    debug!("Commit of {} rows failed, splitting: {}", rows, message);
                }
                let right = unit.split_off(rows / 2);
                write_unit(shared.clone(), unit, depth + 1).await;
                write_unit(shared, right, depth + 1).await;
            }
        }
    }
    .boxed()
}

/// Buffers rows and commits them in bounded, concurrent write units.
pub struct BatchWriter {
    config: WriterConfig,
    shared: Arc<Shared>,
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
    task_failures: Vec<String>,
    buffer: Vec<Mutation>,
    buffer_bytes: usize,
    buffer_cells: usize,
}

impl BatchWriter {
    pub fn new(config: WriterConfig, commit: Arc<dyn CommitFn>) -> Self {
        let permits = config.write_limit.max(1);
        info!(
            "Batch writer: {} bytes / {} mutations per unit, {} units in flight",
            config.bytes_limit, config.mutation_limit, permits
        );
        let shared = Arc::new(Shared {
            commit,
            stats: Mutex::new(WriterStats::default()),
            retry_limit: config.retry_limit,
            sample_limit: config.bad_row_sample_limit,
            verbose: config.verbose,
        });
        Self {
            config,
            shared,
            semaphore: Arc::new(Semaphore::new(permits)),
            tasks: JoinSet::new(),
            task_failures: Vec::new(),
            buffer: Vec::new(),
            buffer_bytes: 0,
            buffer_cells: 0,
        }
    }

    /// Buffer one row, dispatching the current unit first if the row does
    /// not fit. Waits while `write_limit` units are in flight.
    pub async fn add_row(
        &mut self,
        table: impl Into<String>,
        columns: Vec<String>,
        values: Vec<Value>,
    ) -> Result<()> {
        self.add_mutation(Mutation::new(table, columns, values)).await
    }

    pub async fn add_mutation(&mut self, mutation: Mutation) -> Result<()> {
        let bytes = mutation.encoded_size();
        let cells = mutation.cell_count();
        if bytes > self.config.bytes_limit || cells > self.config.mutation_limit {
            warn!(
                "{}: dropping row of {} bytes / {} cells, over unit limits",
                mutation.table, bytes, cells
            );
            self.shared
                .record_dropped(vec![mutation], OVERSIZE_ROW_ERROR)
                .await;
            return Ok(());
        }

        if self.buffer_bytes + bytes > self.config.bytes_limit
            || self.buffer_cells + cells > self.config.mutation_limit
        {
            self.dispatch().await?;
        }
        self.buffer.push(mutation);
        self.buffer_bytes += bytes;
        self.buffer_cells += cells;
        Ok(())
    }

    /// Dispatch the buffer and wait for every unit, including splits.
    pub async fn flush(&mut self) -> Result<()> {
        self.dispatch().await?;
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                self.task_failures.push(e.to_string());
            }
        }
        if self.task_failures.is_empty() {
            Ok(())
        } else {
            Err(MigrateError::Task(format!(
                "write unit tasks failed: {}",
                std::mem::take(&mut self.task_failures).join("; ")
            )))
        }
    }

    /// Snapshot of the counters.
    pub async fn stats(&self) -> WriterStats {
        self.shared.stats.lock().await.clone()
    }

    async fn dispatch(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let unit = std::mem::take(&mut self.buffer);
        self.buffer_bytes = 0;
        self.buffer_cells = 0;

        // Reap finished units so the set stays small on long runs.
        while let Some(joined) = self.tasks.try_join_next() {
            if let Err(e) = joined {
                warn!("Write unit task failed: {}", e);
                self.task_failures.push(e.to_string());
            }
        }

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| MigrateError::Task(format!("writer semaphore closed: {}", e)))?;
        let shared = self.shared.clone();
        self.tasks.spawn(async move {
            {
                let mut stats = shared.stats.lock().await;
                stats.in_flight += 1;
                stats.max_in_flight = stats.max_in_flight.max(stats.in_flight);
            }
            write_unit(shared.clone(), unit, 0).await;
            shared.stats.lock().await.in_flight -= 1;
            drop(permit);
        });
        Ok(())
    }
}

#[async_trait]
impl RowSink for BatchWriter {
    async fn write_row(&mut self, row: ConvertedRow) -> Result<()> {
        self.add_mutation(row.into()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use std::sync::Mutex as StdMutex;

    fn row(id: i64) -> Mutation {
        Mutation::new("t", vec!["id".into()], vec![Value::Int64(id)])
    }

    #[tokio::test]
    async fn test_units_respect_mutation_budget() {
        let units = Arc::new(StdMutex::new(Vec::new()));
        let seen = units.clone();
        let commit = move |unit: Vec<Mutation>| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(unit.len());
                Ok::<(), MigrateError>(())
            }
        };
        let config = WriterConfig {
            mutation_limit: 3,
            ..WriterConfig::default()
        };
        let mut writer = BatchWriter::new(config, Arc::new(commit));
        for i in 0..10 {
            writer.add_mutation(row(i)).await.unwrap();
        }
        writer.flush().await.unwrap();

        let mut sizes = units.lock().unwrap().clone();
        sizes.sort();
        assert_eq!(sizes, vec![1, 3, 3, 3]);
        assert_eq!(writer.stats().await.committed_rows(), 10);
    }

    #[tokio::test]
    async fn test_failing_row_is_isolated() {
        let commit = |unit: Vec<Mutation>| async move {
            if unit.iter().any(|m| m.values[0] == Value::Int64(3)) {
                Err(MigrateError::commit(ErrorClass::Permanent, "constraint violation"))
            } else {
                Ok(())
            }
        };
        let mut writer = BatchWriter::new(WriterConfig::default(), Arc::new(commit));
        for i in 0..8 {
            writer.add_mutation(row(i)).await.unwrap();
        }
        writer.flush().await.unwrap();

        let stats = writer.stats().await;
        assert_eq!(stats.committed_rows(), 7);
        assert_eq!(stats.dropped["t"], 1);
        assert_eq!(stats.dropped_samples[0].values, vec!["3".to_string()]);
        assert_eq!(stats.errors.len(), 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_oversize_row_dropped_without_commit() {
        let commits = Arc::new(StdMutex::new(0));
        let counter = commits.clone();
        let commit = move |_unit: Vec<Mutation>| {
            let counter = counter.clone();
            async move {
                *counter.lock().unwrap() += 1;
                Ok::<(), MigrateError>(())
            }
        };
        let config = WriterConfig {
            bytes_limit: 16,
            ..WriterConfig::default()
        };
        let mut writer = BatchWriter::new(config, Arc::new(commit));
        writer
            .add_row("t", vec!["name".into()], vec![Value::String("x".repeat(64))])
            .await
            .unwrap();
        writer.flush().await.unwrap();

        let stats = writer.stats().await;
        assert_eq!(stats.dropped["t"], 1);
        assert_eq!(stats.errors[OVERSIZE_ROW_ERROR], 1);
        assert_eq!(*commits.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retry_limit_caps_split_depth() {
        let commit = |_unit: Vec<Mutation>| async move {
            Err::<(), _>(MigrateError::commit(ErrorClass::Unavailable, "down"))
        };
        let config = WriterConfig {
            retry_limit: 0,
            ..WriterConfig::default()
        };
        let mut writer = BatchWriter::new(config, Arc::new(commit));
        for i in 0..4 {
            writer.add_mutation(row(i)).await.unwrap();
        }
        writer.flush().await.unwrap();
        let stats = writer.stats().await;
        assert_eq!(stats.failed_commits, 1);
        assert_eq!(stats.dropped_rows(), 4);
    }
}
