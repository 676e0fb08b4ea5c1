//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source document export configuration.
    pub source: SourceConfig,

    /// Target database (PostgreSQL) configuration.
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source document store configuration.
///
/// The engine reads a mongoexport-style dump directory: one
/// `<collection>.jsonl` file per source collection, one JSON document per
/// line, in stable export order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source type (always "jsonl" for now).
    #[serde(default = "default_jsonl")]
    pub r#type: String,

    /// Directory holding `<collection>.jsonl` export files.
    pub dir: PathBuf,
}

/// Target database (PostgreSQL) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database type (always "postgres" for now).
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// SSL mode (default: "prefer").
    #[serde(default = "default_prefer")]
    pub ssl_mode: String,

    /// Maximum pool connections (default: 4; the engine is sequential, the
    /// pool only covers validator lookups interleaved with scans).
    #[serde(default = "default_pool_size")]
    pub max_connections: usize,
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Records per fetched/committed batch (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Save the checkpoint every N batches within a table (default: 10).
    /// The checkpoint is always saved at table completion regardless.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,

    /// Checkpoint file path (default: migration-state.json).
    #[serde(default = "default_checkpoint_file")]
    pub checkpoint_file: PathBuf,

    /// Error journal file path (default: migration-errors.log).
    #[serde(default = "default_error_log")]
    pub error_log: PathBuf,

    /// Validation report file path (default: validation-report.json).
    #[serde(default = "default_report_file")]
    pub report_file: PathBuf,

    /// Records sampled per table by validator layers 2 and 4 (default: 100).
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            checkpoint_interval: default_checkpoint_interval(),
            checkpoint_file: default_checkpoint_file(),
            error_log: default_error_log(),
            report_file: default_report_file(),
            sample_size: default_sample_size(),
        }
    }
}

// Default value functions for serde

fn default_jsonl() -> String {
    "jsonl".to_string()
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_prefer() -> String {
    "prefer".to_string()
}

fn default_pool_size() -> usize {
    4
}

fn default_batch_size() -> usize {
    1000
}

fn default_checkpoint_interval() -> usize {
    10
}

fn default_checkpoint_file() -> PathBuf {
    PathBuf::from("migration-state.json")
}

fn default_error_log() -> PathBuf {
    PathBuf::from("migration-errors.log")
}

fn default_report_file() -> PathBuf {
    PathBuf::from("validation-report.json")
}

fn default_sample_size() -> usize {
    100
}
