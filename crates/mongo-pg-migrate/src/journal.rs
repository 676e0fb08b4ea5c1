//! Append-only error journal with in-memory aggregation.
//!
//! Every transform or batch-commit failure lands here as an immutable
//! structured block (including the raw source document, for forensic
//! replay) and feeds counters used for the end-of-run summary. The journal
//! is purely a sink: it never raises, and a failure to write the log file
//! itself only produces a warning.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

/// One journaled failure.
#[derive(Debug, Clone)]
pub struct MigrationErrorEntry {
    pub table: String,
    pub source_id: String,
    pub target_id: Option<Uuid>,
    pub message: String,
    pub batch_number: u64,
}

/// Aggregated journal summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalSummary {
    pub total_errors: u64,
    pub errors_by_table: HashMap<String, u64>,
    /// Pattern buckets ranked by frequency, most common first.
    pub top_patterns: Vec<(String, u64)>,
}

#[derive(Default)]
struct Counters {
    total: u64,
    by_table: HashMap<String, u64>,
    patterns: HashMap<String, u64>,
}

/// Durable error log plus in-memory counters.
pub struct ErrorJournal {
    path: PathBuf,
    file: Mutex<Option<File>>,
    counters: Mutex<Counters>,
}

/// Bucket an error message into a coarse pattern category for the summary.
fn pattern_of(message: &str) -> String {
    let lower = message.to_lowercase();
    if lower.contains("constraint") || lower.contains("duplicate") || lower.contains("violates") {
        "constraint violation".to_string()
    } else if lower.contains("missing") || lower.contains("required") {
        "missing required field".to_string()
    } else if lower.contains("expected") || lower.contains("invalid") || lower.contains("coerce") {
        "type coercion".to_string()
    } else if lower.contains("connection") || lower.contains("timeout") {
        "connectivity".to_string()
    } else {
        // Fall back to the message head so novel failures still cluster.
        message.chars().take(48).collect()
    }
}

impl ErrorJournal {
    /// Open (or create) the journal at `path`. The file is opened lazily on
    /// the first error so a clean run leaves no log behind.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Append one structured error block and bump the counters.
    pub fn log_error(&self, entry: &MigrationErrorEntry, raw_document: &Value) {
        {
            let mut counters = self.counters.lock().unwrap();
            counters.total += 1;
            *counters.by_table.entry(entry.table.clone()).or_insert(0) += 1;
            *counters
                .patterns
                .entry(pattern_of(&entry.message))
                .or_insert(0) += 1;
        }

        let block = format!(
            "--- error ---\n\
             timestamp: {}\n\
             table: {}\n\
             source_id: {}\n\
             target_id: {}\n\
             batch: {}\n\
             message: {}\n\
             raw: {}\n",
            Utc::now().to_rfc3339(),
            entry.table,
            entry.source_id,
            entry
                .target_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            entry.batch_number,
            entry.message,
            serde_json::to_string(raw_document).unwrap_or_else(|_| "<unserializable>".into()),
        );

        self.append(&block);
    }

    /// Append the trailing aggregated summary block (called once at the end
    /// of a run that had errors).
    pub fn write_summary(&self) {
        let summary = self.summary();
        if summary.total_errors == 0 {
            return;
        }
        let mut block = format!(
            "=== summary ===\ntotal_errors: {}\n",
            summary.total_errors
        );
        let mut by_table: Vec<_> = summary.errors_by_table.into_iter().collect();
        by_table.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        for (table, count) in by_table {
            block.push_str(&format!("  {table}: {count}\n"));
        }
        block.push_str("top_patterns:\n");
        for (pattern, count) in summary.top_patterns {
            block.push_str(&format!("  {count}x {pattern}\n"));
        }
        self.append(&block);
    }

    /// Current aggregation.
    pub fn summary(&self) -> JournalSummary {
        let counters = self.counters.lock().unwrap();
        let mut top_patterns: Vec<_> = counters
            .patterns
            .iter()
            .map(|(p, c)| (p.clone(), *c))
            .collect();
        top_patterns.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        JournalSummary {
            total_errors: counters.total,
            errors_by_table: counters.by_table.clone(),
            top_patterns,
        }
    }

    /// Total journaled errors so far.
    pub fn total_errors(&self) -> u64 {
        self.counters.lock().unwrap().total
    }

    /// Truncate the log and reset counters. Only used on an explicit
    /// fresh-start request.
    pub fn clear(&self) {
        *self.counters.lock().unwrap() = Counters::default();
        let mut file = self.file.lock().unwrap();
        *file = None;
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!("Could not clear error journal {}: {e}", self.path.display());
            }
        }
    }

    fn append(&self, block: &str) {
        let mut guard = self.file.lock().unwrap();
        if guard.is_none() {
            match OpenOptions::new().create(true).append(true).open(&self.path) {
                Ok(file) => *guard = Some(file),
                Err(e) => {
                    warn!(
                        "Could not open error journal {}: {e}; errors kept in memory only",
                        self.path.display()
                    );
                    return;
                }
            }
        }
        if let Some(file) = guard.as_mut() {
            if let Err(e) = file.write_all(block.as_bytes()) {
                warn!("Could not append to error journal: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn entry(table: &str, message: &str) -> MigrationErrorEntry {
        MigrationErrorEntry {
            table: table.to_string(),
            source_id: "0".repeat(24),
            target_id: None,
            message: message.to_string(),
            batch_number: 3,
        }
    }

    #[test]
    fn test_counters_and_patterns() {
        let dir = TempDir::new().unwrap();
        let journal = ErrorJournal::new(dir.path().join("errors.log"));

        journal.log_error(&entry("accounts", "missing required field name"), &json!({}));
        journal.log_error(&entry("accounts", "violates unique constraint"), &json!({}));
        journal.log_error(&entry("tasks", "missing required field title"), &json!({}));

        let summary = journal.summary();
        assert_eq!(summary.total_errors, 3);
        assert_eq!(summary.errors_by_table["accounts"], 2);
        assert_eq!(summary.errors_by_table["tasks"], 1);
        assert_eq!(
            summary.top_patterns[0],
            ("missing required field".to_string(), 2)
        );
    }

    #[test]
    fn test_log_file_is_append_only_structured() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("errors.log");
        let journal = ErrorJournal::new(&path);

        journal.log_error(&entry("accounts", "boom"), &json!({"_id": "x"}));
        journal.log_error(&entry("accounts", "boom again"), &json!({}));
        journal.write_summary();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("--- error ---").count(), 2);
        assert!(content.contains("raw: {\"_id\":\"x\"}"));
        assert!(content.contains("=== summary ==="));
        assert!(content.contains("total_errors: 2"));
    }

    #[test]
    fn test_no_errors_means_no_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("errors.log");
        let journal = ErrorJournal::new(&path);
        journal.write_summary();
        assert!(!path.exists());
    }

    #[test]
    fn test_clear_resets_everything() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("errors.log");
        let journal = ErrorJournal::new(&path);
        journal.log_error(&entry("accounts", "boom"), &json!({}));
        assert!(path.exists());

        journal.clear();
        assert!(!path.exists());
        assert_eq!(journal.total_errors(), 0);
    }

    #[test]
    fn test_journal_never_raises_on_unwritable_path() {
        let journal = ErrorJournal::new("/nonexistent-dir/errors.log");
        journal.log_error(&entry("accounts", "boom"), &json!({}));
        // Counters still advance even when the sink is unavailable.
        assert_eq!(journal.total_errors(), 1);
    }
}
