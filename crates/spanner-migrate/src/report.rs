//! Migration report: schema issues, bad and dropped rows, error histogram.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;

use crate::conv::{BadRow, Conv, SchemaIssue, Severity};
use crate::error::Result;
use crate::writer::WriterStats;

/// One table's line in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub source_name: String,
    pub target_name: String,
    pub source_rows: u64,
    pub good_rows: u64,
    pub bad_rows: u64,
    pub dropped_rows: u64,
    pub warnings: usize,
    pub notes: usize,
    /// Why reading the table's rows stopped early, if it did.
    pub error: Option<String>,
    /// Issue → number of columns (or the table itself) affected.
    pub issues: BTreeMap<String, usize>,
}

/// Summary of a migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub source_dialect: String,
    pub target_dialect: String,
    pub tables: Vec<TableReport>,
    pub statements: BTreeMap<String, u64>,
    pub unexpected: BTreeMap<String, u64>,
    pub bad_row_samples: Vec<BadRow>,
    pub dropped_samples: Vec<BadRow>,
    /// Commit error → rows dropped with it.
    pub write_errors: BTreeMap<String, u64>,
}

impl MigrationReport {
    pub fn build(conv: &Conv, writer: Option<&WriterStats>) -> Self {
        let mut tables = Vec::with_capacity(conv.src_schema.len());
        for src in conv.src_schema.values() {
            let target_name = conv
                .target_schema
                .get(&src.id)
                .map(|t| t.name.clone())
                .unwrap_or_default();
            let mut issues: BTreeMap<String, usize> = BTreeMap::new();
            let (mut warnings, mut notes) = (0, 0);
            if let Some(table_issues) = conv.issues.get(&src.id) {
                let all = table_issues
                    .table
                    .iter()
                    .chain(table_issues.columns.values().flatten());
                for issue in all {
                    *issues.entry(issue_key(issue)).or_default() += 1;
                    match issue.severity() {
                        Severity::Warning => warnings += 1,
                        Severity::Note => notes += 1,
                    }
                }
            }
            let dropped_rows = writer
                .and_then(|w| w.dropped.get(&target_name))
                .copied()
                .unwrap_or(0);
            tables.push(TableReport {
                source_name: src.name.clone(),
                target_name,
                source_rows: conv.stats.rows.get(&src.name).copied().unwrap_or(0),
                good_rows: conv.stats.good_rows.get(&src.name).copied().unwrap_or(0),
                bad_rows: conv.stats.bad_rows.get(&src.name).copied().unwrap_or(0),
                dropped_rows,
                warnings,
                notes,
                error: conv.stats.table_errors.get(&src.name).cloned(),
                issues,
            });
        }
        tables.sort_by(|a, b| a.source_name.cmp(&b.source_name));

        Self {
            source_dialect: conv.source_dialect.name().to_string(),
            target_dialect: conv.target_dialect.name().to_string(),
            tables,
            statements: conv.stats.statements.clone(),
            unexpected: conv.stats.unexpected.clone(),
            bad_row_samples: conv.stats.bad_row_samples.clone(),
            dropped_samples: writer.map(|w| w.dropped_samples.clone()).unwrap_or_default(),
            write_errors: writer.map(|w| w.errors.clone()).unwrap_or_default(),
        }
    }

    /// Plain-text rendering.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Migration report: {} -> {}",
            self.source_dialect, self.target_dialect
        );
        let _ = writeln!(out);
        for table in &self.tables {
            let _ = writeln!(
                out,
                "Table {} -> {}: {} source rows, {} converted, {} bad, {} dropped, {} warnings, {} notes",
                table.source_name,
                table.target_name,
                table.source_rows,
                table.good_rows,
                table.bad_rows,
                table.dropped_rows,
                table.warnings,
                table.notes
            );
            if let Some(error) = &table.error {
                let _ = writeln!(out, "  ! rows incomplete: {}", error);
            }
            for (issue, count) in &table.issues {
                let _ = writeln!(out, "  - {} ({})", issue, count);
            }
        }

        if !self.unexpected.is_empty() {
            let _ = writeln!(out, "\nUnexpected conditions:");
            for (message, count) in &self.unexpected {
                let _ = writeln!(out, "  {}: {}", message, count);
            }
        }
        write_samples(&mut out, "Bad rows (conversion)", &self.bad_row_samples);
        write_samples(&mut out, "Dropped rows (write)", &self.dropped_samples);
        if !self.write_errors.is_empty() {
            let _ = writeln!(out, "\nWrite errors:");
            for (message, count) in &self.write_errors {
                let _ = writeln!(out, "  {} rows: {}", count, message);
            }
        }
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the text report, or JSON when the path ends in `.json`.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = if path.extension().is_some_and(|ext| ext == "json") {
            self.to_json()?
        } else {
            self.to_text()
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn total_bad_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.bad_rows).sum()
    }

    pub fn total_dropped_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.dropped_rows).sum()
    }
}

fn issue_key(issue: &SchemaIssue) -> String {
    let level = match issue.severity() {
        Severity::Warning => "warning",
        Severity::Note => "note",
    };
    format!("{}: {}", level, issue.description())
}

fn write_samples(out: &mut String, title: &str, samples: &[BadRow]) {
    if samples.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{}:", title);
    for row in samples {
        let pairs: Vec<String> = row
            .columns
            .iter()
            .zip(&row.values)
            .map(|(c, v)| format!("{}={}", c, v))
            .collect();
        let _ = writeln!(out, "  {}: [{}] {}", row.table, pairs.join(", "), row.error);
    }
}
