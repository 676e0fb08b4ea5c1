//! Migration orchestrator: the state machine driving a full run.
//!
//! Phases run strictly in sequence: validate target connectivity, migrate
//! every entity phase of the plan, populate link tables, summarize. The
//! orchestrator owns the checkpoint: tables already listed as completed are
//! skipped on resume, an interrupt saves state and exits cleanly, and the
//! checkpoint file is kept after success so the validator can restore the
//! identifier map.

use crate::checkpoint::{CheckpointStore, MigrationState};
use crate::config::Config;
use crate::error::{MigrateError, Result};
use crate::idmap::IdMapper;
use crate::journal::ErrorJournal;
use crate::junction::{junction_for, JunctionLinker};
use crate::loader::BatchLoader;
use crate::plan::{PhasePlan, TableSpec};
use crate::progress::ProgressReporter;
use crate::store::{SourceStore, TargetStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Current phase of the run, for logging and the result summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Initializing,
    ValidatingTarget,
    MigratingEntities,
    LinkingJunctions,
    Summarizing,
    Completed,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunPhase::Initializing => "initializing",
            RunPhase::ValidatingTarget => "validating-target",
            RunPhase::MigratingEntities => "migrating-entities",
            RunPhase::LinkingJunctions => "linking-junctions",
            RunPhase::Summarizing => "summarizing",
            RunPhase::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    pub tables_completed: usize,
    pub total_records_migrated: u64,
    pub total_errors: u64,
    pub duration_secs: f64,
    pub resumed: bool,
}

/// Drives one migration run end to end.
pub struct Orchestrator {
    config: Config,
    plan: PhasePlan,
    source: Arc<dyn SourceStore>,
    target: Arc<dyn TargetStore>,
    cancel: CancellationToken,
    clean: bool,
    dry_run: bool,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        source: Arc<dyn SourceStore>,
        target: Arc<dyn TargetStore>,
    ) -> Self {
        Self {
            config,
            plan: PhasePlan::standard(),
            source,
            target,
            cancel: CancellationToken::new(),
            clean: false,
            dry_run: false,
        }
    }

    /// Cancellation token checked between batches; a cancelled token saves
    /// the checkpoint and ends the run with [`MigrateError::Cancelled`].
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Discard any previous checkpoint and error journal before starting.
    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    /// Run the full pipeline without persisting the checkpoint. The caller
    /// pairs this with a throwaway target.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Execute the run.
    pub async fn run(&self) -> Result<MigrationResult> {
        let started = Instant::now();

        info!("Phase: {}", RunPhase::Initializing);
        let checkpoints = CheckpointStore::new(&self.config.migration.checkpoint_file);
        let journal = ErrorJournal::new(&self.config.migration.error_log);
        if self.clean {
            checkpoints.delete()?;
            journal.clear();
            info!("Previous checkpoint and error journal discarded");
        }

        let config_hash = self.config.hash();
        let (mut state, mapper, resumed) = match checkpoints.load() {
            Some(mut state) => {
                state.validate_config(&config_hash)?;
                let mapper = IdMapper::restore(&state.object_id_to_uuid_map)?;
                info!(
                    "Resuming: {}/{} tables already completed",
                    state.completed_tables.len(),
                    self.plan.table_count()
                );
                if let Some(table) = state.current_table.take() {
                    info!("{table}: was interrupted mid-way, re-running from the start");
                    state.rollback_table(&table);
                }
                (state, mapper, true)
            }
            None => (MigrationState::new(config_hash), IdMapper::new(), false),
        };

        info!("Phase: {}", RunPhase::ValidatingTarget);
        self.target.ping().await?;

        info!("Phase: {}", RunPhase::MigratingEntities);
        let mut progress = ProgressReporter::new(self.plan.table_count());
        let loader = BatchLoader::new(
            &*self.source,
            &*self.target,
            &mapper,
            &journal,
            self.config.migration.batch_size,
        );
        for phase in self.plan.entity_phases() {
            info!("Entity phase {}/{}", phase.number, self.plan.phase_count());
            for table in &phase.tables {
                if state.is_table_completed(table.name) {
                    info!("{}: already completed, skipping", table.name);
                    continue;
                }
                self.migrate_table(
                    table,
                    &loader,
                    &journal,
                    &mapper,
                    &checkpoints,
                    &mut state,
                    &mut progress,
                )
                .await?;
            }
        }

        info!("Phase: {}", RunPhase::LinkingJunctions);
        let linker = JunctionLinker::new(
            &*self.source,
            &*self.target,
            &mapper,
            &journal,
            self.config.migration.batch_size,
        );
        for table in self.plan.link_tables() {
            if state.is_table_completed(table.name) {
                info!("{}: already completed, skipping", table.name);
                continue;
            }
            self.check_cancelled(&checkpoints, &mut state, &mapper, &journal)?;
            let spec = junction_for(table.name)
                .ok_or_else(|| MigrateError::UnknownTable(table.name.to_string()))?;
            progress.table_started(table.name, 0);
            let errors_before = journal.total_errors();
            let migrated = linker.link_table(spec).await?;
            state.record_batch(table.name, Vec::new(), journal.total_errors() - errors_before);
            state.total_records_migrated += migrated;
            progress.batch_committed(migrated);
            progress.table_completed();
            self.persist_completed(&checkpoints, &mut state, &mapper, table.name)?;
        }

        info!("Phase: {}", RunPhase::Summarizing);
        journal.write_summary();
        self.persist(&checkpoints, &mut state, &mapper)?;
        progress.final_summary(state.total_errors);
        info!("Phase: {}", RunPhase::Completed);

        Ok(MigrationResult {
            tables_completed: state.completed_tables.len(),
            total_records_migrated: state.total_records_migrated,
            total_errors: state.total_errors,
            duration_secs: started.elapsed().as_secs_f64(),
            resumed,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn migrate_table(
        &self,
        table: &TableSpec,
        loader: &BatchLoader<'_>,
        journal: &ErrorJournal,
        mapper: &IdMapper,
        checkpoints: &CheckpointStore,
        state: &mut MigrationState,
        progress: &mut ProgressReporter,
    ) -> Result<()> {
        let total = self.source.count(table.collection).await?;
        progress.table_started(table.name, total);

        // A table interrupted mid-way restarts from its first page on
        // resume; duplicate-tolerant writes make the replay harmless.
        let mut skip = 0u64;
        let mut batch_number = 0u64;
        loop {
            self.check_cancelled_at(checkpoints, state, mapper, journal, table.name, batch_number)?;
            batch_number += 1;

            let outcome = loader.run_batch(table, skip, batch_number).await?;
            if outcome.fetched == 0 {
                break;
            }
            skip += outcome.fetched as u64;

            state.record_batch(table.name, outcome.inserted_ids, outcome.errors);
            progress.batch_committed(outcome.inserted);

            if batch_number % self.config.migration.checkpoint_interval as u64 == 0 {
                state.object_id_to_uuid_map = mapper.export();
                if !self.dry_run {
                    checkpoints.save_progress(state, table.name, batch_number)?;
                }
            }

            // A short page is the last page: stable source ordering means
            // the table is exhausted, so skip the trailing empty probe.
            if outcome.fetched < self.config.migration.batch_size {
                break;
            }
        }

        progress.table_completed();
        self.persist_completed(checkpoints, state, mapper, table.name)?;
        Ok(())
    }

    fn check_cancelled(
        &self,
        checkpoints: &CheckpointStore,
        state: &mut MigrationState,
        mapper: &IdMapper,
        journal: &ErrorJournal,
    ) -> Result<()> {
        if self.cancel.is_cancelled() {
            info!("Cancellation requested, saving checkpoint");
            journal.write_summary();
            self.persist(checkpoints, state, mapper)?;
            return Err(MigrateError::Cancelled);
        }
        Ok(())
    }

    fn check_cancelled_at(
        &self,
        checkpoints: &CheckpointStore,
        state: &mut MigrationState,
        mapper: &IdMapper,
        journal: &ErrorJournal,
        table: &str,
        batch_number: u64,
    ) -> Result<()> {
        if self.cancel.is_cancelled() {
            state.current_table = Some(table.to_string());
            state.current_batch = batch_number;
        }
        self.check_cancelled(checkpoints, state, mapper, journal)
    }

    fn persist(
        &self,
        checkpoints: &CheckpointStore,
        state: &mut MigrationState,
        mapper: &IdMapper,
    ) -> Result<()> {
        state.object_id_to_uuid_map = mapper.export();
        if self.dry_run {
            return Ok(());
        }
        checkpoints.save(state)
    }

    fn persist_completed(
        &self,
        checkpoints: &CheckpointStore,
        state: &mut MigrationState,
        mapper: &IdMapper,
        table: &str,
    ) -> Result<()> {
        state.object_id_to_uuid_map = mapper.export();
        if self.dry_run {
            if !state.is_table_completed(table) {
                state.completed_tables.push(table.to_string());
            }
            state.current_table = None;
            state.current_batch = 0;
            return Ok(());
        }
        checkpoints.mark_table_completed(state, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MigrationConfig, SourceConfig, TargetConfig};
    use crate::store::{MemorySource, MemoryTarget};
    use serde_json::json;
    use tempfile::TempDir;

    fn oid(prefix: u32, n: u32) -> String {
        format!("{:08x}{:016x}", prefix, n)
    }

    fn test_config(dir: &TempDir, batch_size: usize) -> Config {
        Config {
            source: SourceConfig {
                r#type: "jsonl".into(),
                dir: dir.path().to_path_buf(),
            },
            target: TargetConfig {
                r#type: "postgres".into(),
                host: "localhost".into(),
                port: 5432,
                database: "crm".into(),
                user: "crm".into(),
                password: "crm".into(),
                ssl_mode: "prefer".into(),
                max_connections: 4,
            },
            migration: MigrationConfig {
                batch_size,
                checkpoint_interval: 2,
                checkpoint_file: dir.path().join("migration-state.json"),
                error_log: dir.path().join("migration-errors.log"),
                report_file: dir.path().join("validation-report.json"),
                sample_size: 100,
            },
        }
    }

    fn seeded_source() -> MemorySource {
        MemorySource::new()
            .with_collection(
                "tenants",
                vec![json!({"_id": oid(1, 1), "name": "Initech", "plan": "growth"})],
            )
            .with_collection(
                "users",
                vec![
                    json!({"_id": oid(2, 1), "tenantId": oid(1, 1), "email": "a@initech.test"}),
                    json!({"_id": oid(2, 2), "tenantId": oid(1, 1), "email": "b@initech.test"}),
                ],
            )
            .with_collection(
                "accounts",
                vec![json!({
                    "_id": oid(3, 1),
                    "tenantId": oid(1, 1),
                    "ownerId": oid(2, 1),
                    "name": "Globex",
                    "watchers": [oid(2, 1), oid(2, 2)],
                })],
            )
    }

    #[tokio::test]
    async fn test_full_run_migrates_entities_and_links() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(seeded_source());
        let target = Arc::new(MemoryTarget::new());

        let orchestrator =
            Orchestrator::new(test_config(&dir, 100), source, Arc::clone(&target) as _);
        let result = orchestrator.run().await.unwrap();

        assert!(!result.resumed);
        assert_eq!(result.tables_completed, 28);
        // 1 tenant + 2 users + 1 account + 2 watcher links.
        assert_eq!(result.total_records_migrated, 6);
        assert_eq!(result.total_errors, 0);
        assert_eq!(target.rows("tenants").len(), 1);
        assert_eq!(target.rows("users").len(), 2);
        assert_eq!(target.rows("accounts").len(), 1);
        assert_eq!(target.rows("account_watchers").len(), 2);
        // FK actually rewritten to the tenant's UUID.
        let user = &target.rows("users")[0];
        let tenant = &target.rows("tenants")[0];
        assert_eq!(user["tenant_id"], tenant["id"]);
    }

    #[tokio::test]
    async fn test_resume_skips_completed_tables_without_duplicates() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, 100);
        let source = Arc::new(seeded_source());
        let target = Arc::new(MemoryTarget::new());

        let first = Orchestrator::new(config.clone(), Arc::clone(&source) as _, Arc::clone(&target) as _)
            .run()
            .await
            .unwrap();
        let second = Orchestrator::new(config, source, Arc::clone(&target) as _)
            .run()
            .await
            .unwrap();

        assert!(second.resumed);
        // Nothing new landed on the second run.
        assert_eq!(second.total_records_migrated, first.total_records_migrated);
        assert_eq!(target.rows("users").len(), 2);
        assert_eq!(target.rows("account_watchers").len(), 2);
    }

    #[tokio::test]
    async fn test_changed_config_refuses_to_resume() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, 100);
        let source = Arc::new(seeded_source());
        let target = Arc::new(MemoryTarget::new());

        Orchestrator::new(config.clone(), Arc::clone(&source) as _, Arc::clone(&target) as _)
            .run()
            .await
            .unwrap();

        let mut changed = config;
        changed.migration.batch_size = 7;
        let err = Orchestrator::new(changed, source, target)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::ConfigChanged));
    }

    #[tokio::test]
    async fn test_clean_discards_checkpoint() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, 100);
        let source = Arc::new(seeded_source());
        let target = Arc::new(MemoryTarget::new());

        Orchestrator::new(config.clone(), Arc::clone(&source) as _, Arc::clone(&target) as _)
            .run()
            .await
            .unwrap();

        let mut changed = config;
        changed.migration.batch_size = 7;
        // Same config change as above, but --clean makes it a fresh start.
        let result = Orchestrator::new(changed, source, target)
            .with_clean(true)
            .run()
            .await
            .unwrap();
        assert!(!result.resumed);
    }

    #[tokio::test]
    async fn test_unreachable_target_is_fatal_before_any_write() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(seeded_source());
        let target = Arc::new(MemoryTarget::new());
        target.inject_ping_failure();

        let err = Orchestrator::new(test_config(&dir, 100), source, Arc::clone(&target) as _)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::TargetConnectivity(_)));
        assert!(target.rows("tenants").is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_saves_checkpoint_and_exits_cleanly() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, 100);
        let source = Arc::new(seeded_source());
        let target = Arc::new(MemoryTarget::new());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = Orchestrator::new(config.clone(), Arc::clone(&source) as _, Arc::clone(&target) as _)
            .with_cancellation_token(cancel)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Cancelled));

        // The saved checkpoint lets a rerun finish the job.
        let result = Orchestrator::new(config, source, Arc::clone(&target) as _)
            .run()
            .await
            .unwrap();
        assert!(result.resumed);
        assert_eq!(target.rows("account_watchers").len(), 2);
    }

    #[tokio::test]
    async fn test_transform_failures_are_counted_not_fatal() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, 100);
        let source = Arc::new(
            seeded_source().with_collection(
                "roles",
                vec![json!({"_id": oid(4, 1)})], // missing required name
            ),
        );
        let target = Arc::new(MemoryTarget::new());

        let result = Orchestrator::new(config, source, target).run().await.unwrap();
        assert_eq!(result.total_errors, 1);
        assert_eq!(result.tables_completed, 28);
    }
}
