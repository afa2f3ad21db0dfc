//! Conversion state threaded through a migration.
//!
//! [`Conv`] is created once per invocation, filled by the schema processor,
//! updated by the row converter, and read by DDL emission and reporting.
//! It round-trips through JSON (see [`snapshot`]).

pub mod issues;
pub mod snapshot;

pub use issues::{SchemaIssue, Severity};
pub use snapshot::Session;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::convert::rules::TransformationRule;
use crate::core::schema::SourceTable;
use crate::target::schema::{Sequence, TargetDialect, TargetTable};
use crate::typemap::SourceDialect;

/// Default text treated as NULL in textual sources.
pub const DEFAULT_NULL_MARKER: &str = "NULL";

/// Default cap on sampled bad rows per table.
pub const DEFAULT_BAD_ROW_SAMPLE_LIMIT: usize = 100;

/// Which phases a migration runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvMode {
    SchemaOnly,
    DataOnly,
    #[default]
    SchemaAndData,
}

impl ConvMode {
    pub fn includes_schema(&self) -> bool {
        matches!(self, ConvMode::SchemaOnly | ConvMode::SchemaAndData)
    }

    pub fn includes_data(&self) -> bool {
        matches!(self, ConvMode::DataOnly | ConvMode::SchemaAndData)
    }
}

/// Issues recorded for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableIssues {
    /// Table-level issues (missing primary key, interleaving).
    #[serde(default)]
    pub table: Vec<SchemaIssue>,
    /// Column id → issues.
    #[serde(default)]
    pub columns: BTreeMap<String, Vec<SchemaIssue>>,
}

impl TableIssues {
    pub fn is_empty(&self) -> bool {
        self.table.is_empty() && self.columns.values().all(Vec::is_empty)
    }

    pub fn count(&self) -> usize {
        self.table.len() + self.columns.values().map(Vec::len).sum::<usize>()
    }
}

/// Synthetic primary key added to a table without one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticPk {
    /// Target column id of the synthetic key.
    pub col_id: String,
    /// Next value of the per-table counter.
    pub sequence: u64,
}

/// A sampled row that failed conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadRow {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<String>,
    pub error: String,
}

/// Counters collected during a migration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Source row counts by table name.
    #[serde(default)]
    pub rows: BTreeMap<String, u64>,
    /// Rows converted and forwarded to the sink, by table name.
    #[serde(default)]
    pub good_rows: BTreeMap<String, u64>,
    /// Rows that failed conversion, by table name.
    #[serde(default)]
    pub bad_rows: BTreeMap<String, u64>,
    /// Schema statements processed, by kind.
    #[serde(default)]
    pub statements: BTreeMap<String, u64>,
    /// Unexpected conditions seen, keyed by message.
    #[serde(default)]
    pub unexpected: BTreeMap<String, u64>,
    /// Sample of bad rows, bounded per table.
    #[serde(default)]
    pub bad_row_samples: Vec<BadRow>,
    /// Tables whose row stream failed part way, with the error.
    #[serde(default)]
    pub table_errors: BTreeMap<String, String>,
}

impl Stats {
    /// Forget the counters of a previous data phase.
    pub fn reset_data(&mut self) {
        self.good_rows.clear();
        self.bad_rows.clear();
        self.bad_row_samples.clear();
        self.table_errors.clear();
    }
}

/// Percentage-based progress logging for the data phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressTracker {
    total: u64,
    done: u64,
    last_pct: u64,
}

impl ProgressTracker {
    /// Reset with a new total row count.
    pub fn start(&mut self, total: u64) {
        self.total = total;
        self.done = 0;
        self.last_pct = 0;
    }

    /// Record `rows` more rows and log every 10% step.
    pub fn advance(&mut self, rows: u64) {
        self.done += rows;
        let pct = self.percent();
        if pct >= self.last_pct + 10 || (pct == 100 && self.last_pct < 100) {
            self.last_pct = pct - pct % 10;
            info!("Data conversion progress: {}% ({}/{} rows)", pct, self.done, self.total);
        }
    }

    /// Completed percentage, capped at 100.
    pub fn percent(&self) -> u64 {
        if self.total == 0 {
            return 0;
        }
        (self.done.saturating_mul(100) / self.total).min(100)
    }

    pub fn done(&self) -> u64 {
        self.done
    }
}

/// The conversion state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conv {
    pub source_dialect: SourceDialect,
    pub target_dialect: TargetDialect,
    pub mode: ConvMode,
    /// Table id → source table.
    pub src_schema: BTreeMap<String, SourceTable>,
    /// Table id → target table (same ids as the source).
    pub target_schema: BTreeMap<String, TargetTable>,
    /// Table id → issues.
    #[serde(default)]
    pub issues: BTreeMap<String, TableIssues>,
    /// Table id → synthetic key.
    #[serde(default)]
    pub synthetic_pks: BTreeMap<String, SyntheticPk>,
    /// Sequence id → sequence.
    #[serde(default)]
    pub sequences: BTreeMap<String, Sequence>,
    /// Transformation rules applied to schema and data.
    #[serde(default)]
    pub rules: Vec<TransformationRule>,
    #[serde(default)]
    pub stats: Stats,
    /// Lowercased target table names in use.
    #[serde(default)]
    pub used_names: BTreeSet<String>,
    /// Text treated as NULL.
    pub null_marker: String,
    /// Cap on sampled bad rows per table.
    pub bad_row_sample_limit: usize,
    /// Last id handed out by [`Conv::next_id`].
    pub id_counter: u64,
    #[serde(skip)]
    pub progress: ProgressTracker,
}

impl Conv {
    pub fn new(source_dialect: SourceDialect, target_dialect: TargetDialect) -> Self {
        Self {
            source_dialect,
            target_dialect,
            mode: ConvMode::default(),
            src_schema: BTreeMap::new(),
            target_schema: BTreeMap::new(),
            issues: BTreeMap::new(),
            synthetic_pks: BTreeMap::new(),
            sequences: BTreeMap::new(),
            rules: Vec::new(),
            stats: Stats::default(),
            used_names: BTreeSet::new(),
            null_marker: DEFAULT_NULL_MARKER.to_string(),
            bad_row_sample_limit: DEFAULT_BAD_ROW_SAMPLE_LIMIT,
            id_counter: 0,
            progress: ProgressTracker::default(),
        }
    }

    pub fn with_mode(mut self, mode: ConvMode) -> Self {
        self.mode = mode;
        self
    }

    /// Hand out the next deterministic id with the given prefix (`t1`, `c2`).
    pub fn next_id(&mut self, prefix: &str) -> String {
        self.id_counter += 1;
        format!("{}{}", prefix, self.id_counter)
    }

    /// Find a source table id by source table name (bare or schema-qualified).
    pub fn table_id(&self, name: &str) -> Option<&str> {
        self.src_schema
            .values()
            .find(|t| t.name == name || t.full_name() == name)
            .map(|t| t.id.as_str())
    }

    /// Record a column issue, ignoring duplicates.
    pub fn add_column_issue(&mut self, table_id: &str, col_id: &str, issue: SchemaIssue) {
        let issues = self
            .issues
            .entry(table_id.to_string())
            .or_default()
            .columns
            .entry(col_id.to_string())
            .or_default();
        if !issues.contains(&issue) {
            issues.push(issue);
        }
    }

    /// Record a table issue, ignoring duplicates.
    pub fn add_table_issue(&mut self, table_id: &str, issue: SchemaIssue) {
        let issues = &mut self.issues.entry(table_id.to_string()).or_default().table;
        if !issues.contains(&issue) {
            issues.push(issue);
        }
    }

    /// Issues recorded for a column.
    pub fn column_issues(&self, table_id: &str, col_id: &str) -> &[SchemaIssue] {
        self.issues
            .get(table_id)
            .and_then(|t| t.columns.get(col_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Record the source row count of a table.
    pub fn set_row_count(&mut self, table: &str, rows: u64) {
        self.stats.rows.insert(table.to_string(), rows);
    }

    pub fn stats_add_good_row(&mut self, table: &str, n: u64) {
        *self.stats.good_rows.entry(table.to_string()).or_default() += n;
    }

    /// Count a bad row and keep it as a sample while under the per-table cap.
    pub fn stats_add_bad_row(&mut self, sample: BadRow) {
        let count = self.stats.bad_rows.entry(sample.table.clone()).or_default();
        *count += 1;
        let sampled = self
            .stats
            .bad_row_samples
            .iter()
            .filter(|row| row.table == sample.table)
            .count();
        if sampled < self.bad_row_sample_limit {
            self.stats.bad_row_samples.push(sample);
        }
    }

    pub fn stats_add_statement(&mut self, kind: &str) {
        *self.stats.statements.entry(kind.to_string()).or_default() += 1;
    }

    pub fn unexpected(&mut self, message: impl Into<String>) {
        *self.stats.unexpected.entry(message.into()).or_default() += 1;
    }

    /// Total rows converted across tables.
    pub fn good_rows(&self) -> u64 {
        self.stats.good_rows.values().sum()
    }

    /// Total rows that failed conversion across tables.
    pub fn bad_rows(&self) -> u64 {
        self.stats.bad_rows.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv() -> Conv {
        Conv::new(SourceDialect::Mysql, TargetDialect::GoogleSql)
    }

    #[test]
    fn test_next_id_is_sequential() {
        let mut conv = conv();
        assert_eq!(conv.next_id("t"), "t1");
        assert_eq!(conv.next_id("c"), "c2");
        assert_eq!(conv.id_counter, 2);
    }

    #[test]
    fn test_issues_dedup() {
        let mut conv = conv();
        conv.add_column_issue("t1", "c2", SchemaIssue::Widened);
        conv.add_column_issue("t1", "c2", SchemaIssue::Widened);
        conv.add_table_issue("t1", SchemaIssue::MissingPrimaryKey);
        assert_eq!(conv.column_issues("t1", "c2"), &[SchemaIssue::Widened]);
        assert_eq!(conv.issues["t1"].count(), 2);
        assert!(conv.column_issues("t1", "c9").is_empty());
    }

    #[test]
    fn test_bad_row_sampling_is_bounded() {
        let mut conv = conv();
        conv.bad_row_sample_limit = 3;
        for i in 0..10 {
            conv.stats_add_bad_row(BadRow {
                table: "users".into(),
                columns: vec!["id".into()],
                values: vec![i.to_string()],
                error: "bad".into(),
            });
        }
        assert_eq!(conv.bad_rows(), 10);
        assert_eq!(conv.stats.bad_row_samples.len(), 3);
    }

    #[test]
    fn test_progress_percent() {
        let mut progress = ProgressTracker::default();
        progress.start(200);
        progress.advance(50);
        assert_eq!(progress.percent(), 25);
        progress.advance(500);
        assert_eq!(progress.percent(), 100);
        assert_eq!(progress.done(), 550);
    }

    #[test]
    fn test_mode_flags() {
        assert!(ConvMode::SchemaOnly.includes_schema());
        assert!(!ConvMode::SchemaOnly.includes_data());
        assert!(ConvMode::DataOnly.includes_data());
        assert!(ConvMode::SchemaAndData.includes_schema());
    }
}
