//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
///
/// Variants split into two families: per-record / per-batch errors that the
/// loader captures into the [`ErrorJournal`](crate::journal::ErrorJournal)
/// and keeps going, and fatal errors that abort the run with the checkpoint
/// preserved so a rerun can resume.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single record could not be transformed. Non-fatal: journaled and
    /// excluded from its batch.
    #[error("Transform failed for {table} record {source_id}: {message}")]
    Transform {
        table: String,
        source_id: String,
        message: String,
    },

    /// The atomic write for one batch failed (constraint or structural
    /// violation). Non-fatal: the whole batch is journaled, zero rows count
    /// as inserted, and processing continues with the next batch.
    #[error("Batch commit failed for table {table}: {message}")]
    BatchCommit { table: String, message: String },

    /// Source collection fetch failed. Fatal: checkpoint is preserved and
    /// the process exits non-zero; rerun to resume.
    #[error("Source fetch failed for collection {collection}: {message}")]
    SourceFetch { collection: String, message: String },

    /// Target store unreachable or connection lost. Fatal.
    #[error("Target store error: {0}")]
    TargetConnectivity(String),

    /// Checkpoint could not be saved. Fatal: silent progress loss is worse
    /// than stopping.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Invalid source identifier (not a 24-character hex ObjectId).
    #[error("Invalid source id {0:?}: expected 24 hex characters")]
    InvalidSourceId(String),

    /// No transformer registered for a table name.
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Validation run could not complete (distinct from discrepancies,
    /// which are aggregated into the report and never raised).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Checkpoint config hash mismatch on resume.
    #[error("Config has changed since last run - cannot resume. Use --clean to start fresh.")]
    ConfigChanged,

    /// Connection pool error.
    #[error("Pool error: {0}")]
    Pool(String),

    /// IO error (file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

// Process exit codes, stable for scripting around the CLI.
pub const EXIT_CONFIG_ERROR: u8 = 1;
pub const EXIT_SOURCE_ERROR: u8 = 2;
pub const EXIT_TARGET_ERROR: u8 = 3;
pub const EXIT_CHECKPOINT_ERROR: u8 = 4;
pub const EXIT_VALIDATION_FAILED: u8 = 5;
pub const EXIT_CANCELLED: u8 = 6;
pub const EXIT_IO_ERROR: u8 = 7;

impl MigrateError {
    /// Create a Transform error.
    pub fn transform(
        table: impl Into<String>,
        source_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MigrateError::Transform {
            table: table.into(),
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    /// Create a BatchCommit error.
    pub fn batch_commit(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::BatchCommit {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a SourceFetch error.
    pub fn source_fetch(collection: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::SourceFetch {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// True for errors the loader absorbs without aborting the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MigrateError::Transform { .. } | MigrateError::BatchCommit { .. }
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::ConfigChanged => {
                EXIT_CONFIG_ERROR
            }
            MigrateError::SourceFetch { .. } => EXIT_SOURCE_ERROR,
            MigrateError::TargetConnectivity(_) | MigrateError::Pool(_) => EXIT_TARGET_ERROR,
            MigrateError::Checkpoint(_) => EXIT_CHECKPOINT_ERROR,
            MigrateError::Validation(_) => EXIT_VALIDATION_FAILED,
            MigrateError::Cancelled => EXIT_CANCELLED,
            MigrateError::Io(_) => EXIT_IO_ERROR,
            _ => EXIT_CONFIG_ERROR,
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        if !self.is_recoverable()
            && !matches!(self, MigrateError::Cancelled | MigrateError::Validation(_))
        {
            output.push_str("\n\nThe checkpoint has been preserved. Rerun to resume.");
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
