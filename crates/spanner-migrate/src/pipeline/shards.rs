//! Running one migration per shard.

use std::sync::Arc;

use tracing::info;

use super::{open_source, run, MigrationResult};
use crate::config::Config;
use crate::error::Result;
use crate::pool::{combine, run_parallel_tasks};
use crate::writer::CommitFn;

/// Migrate every shard configuration with at most `workers` at once.
///
/// With `fast_exit` the first failing shard aborts the rest. Otherwise all
/// shards run and their failures are reported together.
pub async fn migrate_shards(
    configs: Vec<Config>,
    commit: Arc<dyn CommitFn>,
    workers: usize,
    fast_exit: bool,
) -> Result<Vec<MigrationResult>> {
    info!("Migrating {} shards on {} workers", configs.len(), workers);
    let results = run_parallel_tasks(configs, workers, fast_exit, move |config| {
        let commit = commit.clone();
        async move { run(&config, commit).await }
    })
    .await?;
    combine(results)
}

/// Check that every shard is configured correctly and its source reachable.
pub async fn validate_shards(configs: Vec<Config>, workers: usize) -> Result<()> {
    let results = run_parallel_tasks(configs, workers, false, |config| async move {
        config.validate()?;
        let source = open_source(&config.source).await?;
        source.close().await;
        Ok(())
    })
    .await?;
    combine(results).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MigrateError;
    use crate::writer::Mutation;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn write_shard(dir: &Path, shard: &str, rows: usize) -> Config {
        let path = dir.join(format!("{}.json", shard));
        let rows: Vec<String> = (0..rows).map(|i| format!("[\"{}\"]", i)).collect();
        let dump = format!(
            r#"{{"dialect": "mysql", "tables": [{{
                "name": "orders",
                "columns": [{{"name": "id", "source_type": {{"name": "bigint"}}, "nullable": false}}],
                "constraints": {{"primary_keys": ["id"]}},
                "rows": [{}]
            }}]}}"#,
            rows.join(", ")
        );
        std::fs::write(&path, dump).unwrap();
        let yaml = format!(
            "source:\n  type: mysql\n  path: {}\nmigration:\n  rules:\n    - kind: add_shard_id_column\n      shard_id: {}\n",
            path.display(),
            shard
        );
        Config::from_yaml(&yaml).unwrap()
    }

    #[tokio::test]
    async fn test_migrate_shards_commits_every_row() {
        let dir = tempfile::TempDir::new().unwrap();
        let configs = vec![
            write_shard(dir.path(), "east", 3),
            write_shard(dir.path(), "west", 5),
        ];
        let committed = Arc::new(AtomicUsize::new(0));
        let counter = committed.clone();
        let commit: Arc<dyn CommitFn> = Arc::new(move |batch: Vec<Mutation>| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(batch.len(), Ordering::SeqCst);
                Ok::<(), MigrateError>(())
            }
        });

        let results = migrate_shards(configs, commit, 2, false).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].rows_committed, 3);
        assert_eq!(results[1].rows_committed, 5);
        assert_eq!(committed.load(Ordering::SeqCst), 8);
        assert!(results[0].ddl[0].contains("shard_id"));
    }

    #[tokio::test]
    async fn test_validate_shards_reports_every_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let good = write_shard(dir.path(), "east", 1);
        let mut missing = good.clone();
        missing.source.path = Some(dir.path().join("gone.json"));
        let mut wrong_dialect = good.clone();
        wrong_dialect.source.r#type = crate::typemap::SourceDialect::Oracle;

        validate_shards(vec![good.clone()], 2).await.unwrap();
        match validate_shards(vec![good, missing, wrong_dialect], 2).await {
            Err(MigrateError::Multiple(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
