//! Batch writer integration tests.
//!
//! These tests drive the writer through a commit callback that fails on
//! chosen rows, and check budgets, backpressure and row accounting.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use spanner_migrate::core::Value;
use spanner_migrate::error::ErrorClass;
use spanner_migrate::{BatchWriter, CommitFn, MigrateError, Mutation, WriterConfig};

/// Commit callback that rejects any unit holding one of `bad` ids and
/// records the size of every unit it accepts.
struct Recorder {
    bad: BTreeSet<i64>,
    accepted: Mutex<Vec<(usize, usize)>>,
    running: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl Recorder {
    fn new(bad: &[i64]) -> Arc<Self> {
        Arc::new(Self {
            bad: bad.iter().copied().collect(),
            accepted: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::ZERO,
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            bad: BTreeSet::new(),
            accepted: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay,
        })
    }

    fn accepted_rows(&self) -> usize {
        self.accepted.lock().unwrap().iter().map(|(rows, _)| rows).sum()
    }
}

#[async_trait::async_trait]
impl CommitFn for Recorder {
    async fn commit(&self, mutations: Vec<Mutation>) -> spanner_migrate::Result<()> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        let rejected = mutations
            .iter()
            .any(|m| matches!(m.values[0], Value::Int64(id) if self.bad.contains(&id)));
        if rejected {
            return Err(MigrateError::commit(ErrorClass::Permanent, "constraint violation"));
        }
        let bytes = mutations.iter().map(Mutation::encoded_size).sum();
        self.accepted.lock().unwrap().push((mutations.len(), bytes));
        Ok(())
    }
}

fn row(id: i64, payload: usize) -> Mutation {
    Mutation::new(
        "events",
        vec!["id".to_string(), "payload".to_string()],
        vec![Value::Int64(id), Value::String("x".repeat(payload))],
    )
}

async fn write_all(config: WriterConfig, recorder: Arc<Recorder>, rows: Vec<Mutation>) -> BatchWriter {
    let mut writer = BatchWriter::new(config, recorder);
    for m in rows {
        writer.add_mutation(m).await.unwrap();
    }
    writer.flush().await.unwrap();
    writer
}

// =============================================================================
// Bad row isolation
// =============================================================================

#[tokio::test]
async fn test_bad_rows_isolated_at_any_volume() {
    for total in [1i64, 50, 50_000] {
        let recorder = Recorder::new(&[6, 17]);
        let rows = (0..total).map(|id| row(id, (id % 7) as usize * 10)).collect();
        let writer = write_all(WriterConfig::default(), recorder.clone(), rows).await;

        let stats = writer.stats().await;
        let expected_bad = [6, 17].iter().filter(|id| **id < total).count() as u64;
        assert_eq!(stats.dropped_rows(), expected_bad, "total {}", total);
        assert_eq!(stats.committed_rows(), total as u64 - expected_bad);
        assert_eq!(recorder.accepted_rows() as u64, stats.committed_rows());

        let dropped: Vec<&str> = stats
            .dropped_samples
            .iter()
            .map(|r| r.values[0].as_str())
            .collect();
        let expected: Vec<&str> = ["6", "17"]
            .into_iter()
            .take(expected_bad as usize)
            .collect();
        assert_eq!(dropped, expected);
    }
}

#[tokio::test]
async fn test_no_row_lost_with_small_units() {
    let recorder = Recorder::new(&[3, 4, 5, 40]);
    let config = WriterConfig {
        mutation_limit: 8,
        write_limit: 3,
        ..WriterConfig::default()
    };
    let rows = (0..100).map(|id| row(id, 5)).collect();
    let writer = write_all(config, recorder, rows).await;

    let stats = writer.stats().await;
    assert_eq!(stats.committed_rows() + stats.dropped_rows(), 100);
    assert_eq!(stats.dropped_rows(), 4);
    assert_eq!(stats.errors.values().sum::<u64>(), 4);
}

// =============================================================================
// Budgets
// =============================================================================

#[tokio::test]
async fn test_units_respect_byte_budget() {
    let recorder = Recorder::new(&[]);
    let config = WriterConfig {
        bytes_limit: 500,
        ..WriterConfig::default()
    };
    let rows = (0..200).map(|id| row(id, (id % 13) as usize * 7)).collect();
    let writer = write_all(config, recorder.clone(), rows).await;

    let accepted = recorder.accepted.lock().unwrap().clone();
    assert!(accepted.len() > 1);
    assert!(accepted.iter().all(|(_, bytes)| *bytes <= 500));
    assert_eq!(writer.stats().await.committed_rows(), 200);
}

#[tokio::test]
async fn test_units_respect_mutation_budget() {
    let recorder = Recorder::new(&[]);
    let config = WriterConfig {
        mutation_limit: 10,
        ..WriterConfig::default()
    };
    let rows = (0..23).map(|id| row(id, 1)).collect();
    write_all(config, recorder.clone(), rows).await;

    // Two cells per row: five rows per unit.
    let mut sizes: Vec<usize> = recorder
        .accepted
        .lock()
        .unwrap()
        .iter()
        .map(|(rows, _)| *rows)
        .collect();
    sizes.sort();
    assert_eq!(sizes, vec![3, 5, 5, 5, 5]);
}

#[tokio::test]
async fn test_oversize_rows_never_reach_commit() {
    let recorder = Recorder::new(&[]);
    let config = WriterConfig {
        bytes_limit: 100,
        ..WriterConfig::default()
    };
    let rows = vec![row(1, 10), row(2, 500), row(3, 10)];
    let writer = write_all(config, recorder.clone(), rows).await;

    let stats = writer.stats().await;
    assert_eq!(stats.committed_rows(), 2);
    assert_eq!(stats.dropped_rows(), 1);
    assert_eq!(stats.errors["row exceeds write unit limits"], 1);
    assert_eq!(recorder.accepted_rows(), 2);
}

// =============================================================================
// Backpressure
// =============================================================================

#[tokio::test]
async fn test_in_flight_bounded_by_write_limit() {
    let recorder = Recorder::slow(Duration::from_millis(10));
    let config = WriterConfig {
        mutation_limit: 2,
        write_limit: 3,
        ..WriterConfig::default()
    };
    let rows = (0..60).map(|id| row(id, 1)).collect();
    let writer = write_all(config, recorder.clone(), rows).await;

    let stats = writer.stats().await;
    assert_eq!(stats.committed_rows(), 60);
    assert!(stats.max_in_flight <= 3);
    assert!(recorder.peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(stats.in_flight, 0);
}
