//! Durable, versioned checkpointing for resume capability.
//!
//! The checkpoint file is the single source of truth for what has durably
//! completed. Completion is recorded at *table* granularity only: an
//! interrupt mid-table re-attempts that whole table from its start on
//! resume, which is safe because target writes are duplicate-tolerant.

use crate::error::{MigrateError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// Current checkpoint format version. A file with any other version is
/// treated as absent (fresh start), never as an error.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Full migration progress snapshot. Field names are part of the external
/// checkpoint-file contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationState {
    /// Checkpoint format version.
    pub version: u32,

    /// When this snapshot was written.
    pub timestamp: DateTime<Utc>,

    /// SHA256 of the config this run started with; resume refuses to
    /// continue under a different config.
    #[serde(default)]
    pub config_hash: String,

    /// Table currently being migrated, if any.
    pub current_table: Option<String>,

    /// Tables that completed. Once listed here a table is never re-scanned,
    /// even on resume.
    pub completed_tables: Vec<String>,

    /// The full identifier map (source ObjectId -> target UUID).
    pub object_id_to_uuid_map: HashMap<String, String>,

    /// Per-table list of migrated target ids.
    pub migrated_records: HashMap<String, Vec<String>>,

    /// Per-table count of journaled errors.
    #[serde(default)]
    pub errors_by_table: HashMap<String, u64>,

    /// Cumulative count of migrated records.
    pub total_records_migrated: u64,

    /// Cumulative count of journaled errors.
    pub total_errors: u64,

    /// Batch number within the in-progress table.
    pub current_batch: u64,
}

impl MigrationState {
    /// Fresh state for a new run.
    pub fn new(config_hash: String) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            timestamp: Utc::now(),
            config_hash,
            current_table: None,
            completed_tables: Vec::new(),
            object_id_to_uuid_map: HashMap::new(),
            migrated_records: HashMap::new(),
            errors_by_table: HashMap::new(),
            total_records_migrated: 0,
            total_errors: 0,
            current_batch: 0,
        }
    }

    /// Whether a table already completed (and must be skipped on resume).
    pub fn is_table_completed(&self, table: &str) -> bool {
        self.completed_tables.iter().any(|t| t == table)
    }

    /// Record the outcome of one committed batch.
    pub fn record_batch(&mut self, table: &str, inserted_ids: Vec<String>, errors: u64) {
        self.total_records_migrated += inserted_ids.len() as u64;
        self.total_errors += errors;
        if errors > 0 {
            *self.errors_by_table.entry(table.to_string()).or_insert(0) += errors;
        }
        if !inserted_ids.is_empty() {
            self.migrated_records
                .entry(table.to_string())
                .or_default()
                .extend(inserted_ids);
        }
    }

    /// Undo a table's accumulated counts. Called when resuming lands on a
    /// table that was interrupted mid-way: the whole table re-runs, so its
    /// partial tallies must not be counted twice.
    pub fn rollback_table(&mut self, table: &str) {
        if let Some(ids) = self.migrated_records.remove(table) {
            self.total_records_migrated -= ids.len() as u64;
        }
        if let Some(errors) = self.errors_by_table.remove(table) {
            self.total_errors -= errors;
        }
        self.current_table = None;
        self.current_batch = 0;
    }

    /// Validate that the config hash matches for resume.
    pub fn validate_config(&self, config_hash: &str) -> Result<()> {
        if self.config_hash != config_hash {
            return Err(MigrateError::ConfigChanged);
        }
        Ok(())
    }
}

/// File-backed checkpoint store. Owns the one canonical [`MigrationState`]
/// file; all components read and update progress through the orchestrator,
/// never concurrently.
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Create a store for the given checkpoint path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the previous state, or `None` for a fresh start.
    ///
    /// Structural invalidity and version mismatches degrade to `None` with
    /// a warning: a corrupt checkpoint costs re-reading already-migrated
    /// pages, which duplicate-tolerant writes make harmless.
    pub fn load(&self) -> Option<MigrationState> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(
                    "Could not read checkpoint {}: {e}, starting fresh",
                    self.path.display()
                );
                return None;
            }
        };

        let state: MigrationState = match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    "Checkpoint {} is structurally invalid ({e}), starting fresh",
                    self.path.display()
                );
                return None;
            }
        };

        if state.version != CHECKPOINT_VERSION {
            warn!(
                "Checkpoint version {} != {}, starting fresh",
                state.version, CHECKPOINT_VERSION
            );
            return None;
        }

        info!(
            "Loaded checkpoint: {} tables completed, {} records migrated",
            state.completed_tables.len(),
            state.total_records_migrated
        );
        Some(state)
    }

    /// Save the state atomically (write to a temp file, then rename), so a
    /// crash mid-write cannot corrupt the previous valid checkpoint.
    pub fn save(&self, state: &mut MigrationState) -> Result<()> {
        state.timestamp = Utc::now();
        let content = serde_json::to_string_pretty(state)
            .map_err(|e| MigrateError::Checkpoint(format!("Failed to serialize state: {e}")))?;

        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, &content)
            .map_err(|e| MigrateError::Checkpoint(format!("Failed to write checkpoint: {e}")))?;
        std::fs::rename(&temp_path, &self.path)
            .map_err(|e| MigrateError::Checkpoint(format!("Failed to replace checkpoint: {e}")))?;
        Ok(())
    }

    /// Delete the checkpoint (explicit fresh-start request).
    pub fn delete(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MigrateError::Checkpoint(format!(
                "Failed to delete checkpoint: {e}"
            ))),
        }
    }

    /// Mark a table completed and persist.
    pub fn mark_table_completed(&self, state: &mut MigrationState, table: &str) -> Result<()> {
        if !state.is_table_completed(table) {
            state.completed_tables.push(table.to_string());
        }
        state.current_table = None;
        state.current_batch = 0;
        self.save(state)
    }

    /// Record the in-progress position and persist.
    pub fn save_progress(
        &self,
        state: &mut MigrationState,
        current_table: &str,
        batch_number: u64,
    ) -> Result<()> {
        state.current_table = Some(current_table.to_string());
        state.current_batch = batch_number;
        self.save(state)
    }
}
