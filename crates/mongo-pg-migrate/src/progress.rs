//! Live progress and ETA reporting.
//!
//! Display only: removing this module changes nothing about migration
//! outcomes. Throughput is computed over the whole run, ETA over the
//! current table.

use std::time::Instant;
use tracing::info;

/// Rows per second over an elapsed wall-clock window.
pub fn rows_per_second(rows: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 0.0 {
        rows as f64 / elapsed_secs
    } else {
        0.0
    }
}

/// Estimated seconds remaining, if throughput is known.
pub fn eta_seconds(done: u64, total: u64, elapsed_secs: f64) -> Option<f64> {
    if done == 0 || total <= done {
        return None;
    }
    let rate = rows_per_second(done, elapsed_secs);
    if rate > 0.0 {
        Some((total - done) as f64 / rate)
    } else {
        None
    }
}

fn format_duration(secs: f64) -> String {
    let secs = secs.round() as u64;
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

struct TableProgress {
    name: String,
    total: u64,
    migrated: u64,
    started: Instant,
}

/// Tracks and renders per-table and run-level progress.
pub struct ProgressReporter {
    run_started: Instant,
    total_migrated: u64,
    tables_completed: usize,
    tables_total: usize,
    current: Option<TableProgress>,
}

impl ProgressReporter {
    /// Start the run clock.
    pub fn new(tables_total: usize) -> Self {
        Self {
            run_started: Instant::now(),
            total_migrated: 0,
            tables_completed: 0,
            tables_total,
            current: None,
        }
    }

    /// Begin tracking a table.
    pub fn table_started(&mut self, name: &str, total: u64) {
        info!(
            "[{}/{}] {name}: {total} records to migrate",
            self.tables_completed + 1,
            self.tables_total
        );
        self.current = Some(TableProgress {
            name: name.to_string(),
            total,
            migrated: 0,
            started: Instant::now(),
        });
    }

    /// Record one committed batch and render incremental progress.
    pub fn batch_committed(&mut self, inserted: u64) {
        self.total_migrated += inserted;
        if let Some(table) = self.current.as_mut() {
            table.migrated += inserted;
            let elapsed = table.started.elapsed().as_secs_f64();
            let pct = if table.total > 0 {
                (table.migrated as f64 / table.total as f64) * 100.0
            } else {
                100.0
            };
            let eta = eta_seconds(table.migrated, table.total, elapsed)
                .map(format_duration)
                .unwrap_or_else(|| "-".to_string());
            info!(
                "{}: {}/{} ({pct:.0}%) {:.0} rec/s eta {eta}",
                table.name,
                table.migrated,
                table.total,
                rows_per_second(table.migrated, elapsed),
            );
        }
    }

    /// Finish the current table.
    pub fn table_completed(&mut self) {
        if let Some(table) = self.current.take() {
            self.tables_completed += 1;
            info!(
                "{}: completed ({} records in {})",
                table.name,
                table.migrated,
                format_duration(table.started.elapsed().as_secs_f64())
            );
        }
    }

    /// Records migrated so far across the run.
    pub fn total_migrated(&self) -> u64 {
        self.total_migrated
    }

    /// Render the final run summary.
    pub fn final_summary(&self, total_errors: u64) {
        let elapsed = self.run_started.elapsed().as_secs_f64();
        info!(
            "Migration summary: {} tables, {} records in {} ({:.0} rec/s), {} errors",
            self.tables_completed,
            self.total_migrated,
            format_duration(elapsed),
            rows_per_second(self.total_migrated, elapsed),
            total_errors
        );
    }
}
