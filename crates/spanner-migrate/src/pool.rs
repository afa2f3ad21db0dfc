//! Bounded worker pool for independent work items (shards, tables).

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{MigrateError, Result};

/// Run `f` over `items` with at most `workers` running at once.
///
/// With `fast_exit`, the first error aborts every remaining item and is
/// returned. Otherwise every item runs and the per-item results come back
/// in input order; [`combine`] folds them into one result.
pub async fn run_parallel_tasks<I, T, F, Fut>(
    items: Vec<I>,
    workers: usize,
    fast_exit: bool,
    f: F,
) -> Result<Vec<Result<T>>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let f = Arc::new(f);
    let mut tasks = JoinSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let f = f.clone();
        tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => return (index, Err(MigrateError::Task(e.to_string()))),
            };
            (index, f(item).await)
        });
    }
    debug!("Scheduled {} tasks on {} workers", total, workers.max(1));

    let mut results: Vec<Option<Result<T>>> = (0..total).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        let (index, result) = match joined {
            Ok(done) => done,
            Err(e) => {
                tasks.abort_all();
                return Err(MigrateError::Task(e.to_string()));
            }
        };
        if fast_exit {
            if let Err(e) = result {
                warn!("Task {} failed, aborting remaining tasks: {}", index, e);
                tasks.abort_all();
                return Err(e);
            }
        }
        results[index] = Some(result);
    }

    results
        .into_iter()
        .enumerate()
        .map(|(index, result)| {
            result.ok_or_else(|| MigrateError::Task(format!("task {} produced no result", index)))
        })
        .collect()
}

/// Collect successes, or every failure as one [`MigrateError::Multiple`].
pub fn combine<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    let mut values = Vec::with_capacity(results.len());
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(e) => errors.push(e.to_string()),
        }
    }
    if errors.is_empty() {
        Ok(values)
    } else {
        Err(MigrateError::Multiple(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_in_input_order() {
        let results = run_parallel_tasks((0..20u64).collect(), 4, false, |i| async move {
            tokio::time::sleep(Duration::from_millis(20 - i)).await;
            Ok(i * 2)
        })
        .await
        .unwrap();
        let values = combine(results).unwrap();
        assert_eq!(values, (0..20u64).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_worker_bound() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (running.clone(), peak.clone());
        run_parallel_tasks((0..12).collect::<Vec<u32>>(), 3, false, move |_| {
            let (r, p) = (r.clone(), p.clone());
            async move {
                let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                r.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_collects_all_errors_without_fast_exit() {
        let results = run_parallel_tasks(vec![1, 2, 3, 4], 2, false, |i: u32| async move {
            if i % 2 == 0 {
                Err(MigrateError::Config(format!("shard {} invalid", i)))
            } else {
                Ok(i)
            }
        })
        .await
        .unwrap();
        assert_eq!(results.len(), 4);
        match combine(results).unwrap_err() {
            MigrateError::Multiple(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].contains("shard 2"));
                assert!(errors[1].contains("shard 4"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_fast_exit_stops_on_first_error() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();
        let err = run_parallel_tasks((0..50).collect::<Vec<u32>>(), 1, true, move |i| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if i == 2 {
                    return Err(MigrateError::Config("bad shard".into()));
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
                Ok(i)
            }
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("bad shard"));
        assert!(started.load(Ordering::SeqCst) < 50);
    }
}
