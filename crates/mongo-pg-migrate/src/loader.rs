//! Batch loader: one fetch/transform/write cycle per batch.
//!
//! Failure isolation happens here. A record that fails to transform is
//! journaled and skipped without touching its batch; a batch the target
//! rejects wholesale is journaled record-by-record and the run moves on to
//! the next batch. Only source-fetch and target-connectivity failures
//! propagate, because continuing past those would silently lose data.

use crate::error::{MigrateError, Result};
use crate::idmap::IdMapper;
use crate::journal::{ErrorJournal, MigrationErrorEntry};
use crate::plan::TableSpec;
use crate::store::{Record, SourceStore, TargetStore};
use crate::transform;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outcome of one processed batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Raw documents fetched from the source for this batch. Zero means the
    /// table is exhausted.
    pub fetched: usize,
    /// Records the target acknowledged (duplicates skipped by the target do
    /// not count).
    pub inserted: u64,
    /// Records journaled as failed, transform and commit failures combined.
    pub errors: u64,
    /// Target ids of the records offered to the target in this batch.
    pub inserted_ids: Vec<String>,
}

/// Drives batches for one table at a time.
pub struct BatchLoader<'a> {
    source: &'a dyn SourceStore,
    target: &'a dyn TargetStore,
    mapper: &'a IdMapper,
    journal: &'a ErrorJournal,
    batch_size: usize,
}

impl<'a> BatchLoader<'a> {
    pub fn new(
        source: &'a dyn SourceStore,
        target: &'a dyn TargetStore,
        mapper: &'a IdMapper,
        journal: &'a ErrorJournal,
        batch_size: usize,
    ) -> Self {
        Self {
            source,
            target,
            mapper,
            journal,
            batch_size,
        }
    }

    /// Fetch, transform, and write one batch of `table`, starting at source
    /// offset `skip`. `batch_number` is only used for journal context.
    pub async fn run_batch(
        &self,
        table: &TableSpec,
        skip: u64,
        batch_number: u64,
    ) -> Result<BatchOutcome> {
        let docs = self
            .source
            .scan(table.collection, skip, self.batch_size)
            .await?;
        let mut outcome = BatchOutcome {
            fetched: docs.len(),
            ..Default::default()
        };
        if docs.is_empty() {
            return Ok(outcome);
        }

        let mut records: Vec<Record> = Vec::with_capacity(docs.len());
        let mut raw_for: Vec<&Value> = Vec::with_capacity(docs.len());
        for doc in &docs {
            match transform::transform(table.name, doc, self.mapper) {
                Ok(record) => {
                    records.push(record);
                    raw_for.push(doc);
                }
                Err(e) if e.is_recoverable() => {
                    self.journal_one(table, doc, None, &e, batch_number);
                    outcome.errors += 1;
                }
                Err(e) => return Err(e),
            }
        }
        if records.is_empty() {
            return Ok(outcome);
        }

        match self.target.insert_many(table.name, &records).await {
            Ok(inserted) => {
                outcome.inserted = inserted;
                outcome.inserted_ids = records
                    .iter()
                    .filter_map(|r| r.get("id").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect();
                debug!(
                    "{}: batch {batch_number} committed ({inserted}/{} rows)",
                    table.name,
                    records.len()
                );
            }
            Err(e @ MigrateError::BatchCommit { .. }) => {
                // The target rejected the batch as a unit, so every record
                // in it is journaled with the same cause and none count as
                // migrated.
                // TODO: bisect rejected batches to pin the blame on the
                // offending record(s) instead of journaling all of them.
                warn!("{}: batch {batch_number} rejected: {e}", table.name);
                for (record, raw) in records.iter().zip(&raw_for) {
                    let target_id = record
                        .get("id")
                        .and_then(Value::as_str)
                        .and_then(|s| Uuid::parse_str(s).ok());
                    self.journal_one(table, raw, target_id, &e, batch_number);
                }
                outcome.errors += records.len() as u64;
            }
            Err(e) => return Err(e),
        }

        Ok(outcome)
    }

    fn journal_one(
        &self,
        table: &TableSpec,
        raw: &Value,
        target_id: Option<Uuid>,
        error: &MigrateError,
        batch_number: u64,
    ) {
        let source_id = transform::source_id_of(raw).unwrap_or("<unknown>");
        self.journal.log_error(
            &MigrationErrorEntry {
                table: table.name.to_string(),
                source_id: source_id.to_string(),
                target_id,
                message: error.to_string(),
                batch_number,
            },
            raw,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PhasePlan;
    use crate::store::{MemorySource, MemoryTarget};
    use serde_json::json;
    use tempfile::TempDir;

    fn oid(n: u32) -> String {
        format!("{:024x}", n)
    }

    fn account_doc(n: u32) -> Value {
        json!({"_id": oid(n), "name": format!("Account {n}")})
    }

    #[tokio::test]
    async fn test_bad_record_does_not_poison_its_batch() {
        let plan = PhasePlan::standard();
        let table = plan.table("accounts").unwrap();
        let dir = TempDir::new().unwrap();

        let mut docs: Vec<Value> = (1..=9).map(account_doc).collect();
        docs.insert(4, json!({"_id": oid(100)})); // no name
        let source = MemorySource::new().with_collection("accounts", docs);
        let target = MemoryTarget::new();
        let mapper = IdMapper::new();
        let journal = ErrorJournal::new(dir.path().join("errors.log"));

        let loader = BatchLoader::new(&source, &target, &mapper, &journal, 100);
        let outcome = loader.run_batch(table, 0, 1).await.unwrap();

        assert_eq!(outcome.fetched, 10);
        assert_eq!(outcome.inserted, 9);
        assert_eq!(outcome.errors, 1);
        assert_eq!(outcome.inserted_ids.len(), 9);
        assert_eq!(target.rows("accounts").len(), 9);
        assert_eq!(journal.total_errors(), 1);
    }

    #[tokio::test]
    async fn test_rejected_batch_journals_every_record_and_continues() {
        let plan = PhasePlan::standard();
        let table = plan.table("accounts").unwrap();
        let dir = TempDir::new().unwrap();

        let source = MemorySource::new()
            .with_collection("accounts", (1..=5).map(account_doc).collect::<Vec<_>>());
        let target = MemoryTarget::new();
        target.inject_batch_failures("accounts", 1);
        let mapper = IdMapper::new();
        let journal = ErrorJournal::new(dir.path().join("errors.log"));

        let loader = BatchLoader::new(&source, &target, &mapper, &journal, 3);
        let first = loader.run_batch(table, 0, 1).await.unwrap();
        assert_eq!(first.inserted, 0);
        assert_eq!(first.errors, 3);
        assert!(first.inserted_ids.is_empty());
        assert_eq!(journal.total_errors(), 3);

        // The injected failure is consumed; the next batch lands.
        let second = loader.run_batch(table, 3, 2).await.unwrap();
        assert_eq!(second.inserted, 2);
        assert_eq!(second.errors, 0);
        assert_eq!(target.rows("accounts").len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_table_reports_zero_fetched() {
        let plan = PhasePlan::standard();
        let table = plan.table("accounts").unwrap();
        let dir = TempDir::new().unwrap();

        let source = MemorySource::new().with_collection("accounts", vec![account_doc(1)]);
        let target = MemoryTarget::new();
        let mapper = IdMapper::new();
        let journal = ErrorJournal::new(dir.path().join("errors.log"));
        let loader = BatchLoader::new(&source, &target, &mapper, &journal, 10);

        assert_eq!(loader.run_batch(table, 0, 1).await.unwrap().fetched, 1);
        assert_eq!(loader.run_batch(table, 1, 2).await.unwrap().fetched, 0);
    }

    #[tokio::test]
    async fn test_source_fetch_failure_is_fatal() {
        let plan = PhasePlan::standard();
        let table = plan.table("accounts").unwrap();
        let dir = TempDir::new().unwrap();

        let source = MemorySource::new().with_collection("accounts", vec![account_doc(1)]);
        source.inject_fetch_failure("accounts");
        let target = MemoryTarget::new();
        let mapper = IdMapper::new();
        let journal = ErrorJournal::new(dir.path().join("errors.log"));
        let loader = BatchLoader::new(&source, &target, &mapper, &journal, 10);

        let err = loader.run_batch(table, 0, 1).await.unwrap_err();
        assert!(matches!(err, MigrateError::SourceFetch { .. }));
        assert_eq!(journal.total_errors(), 0);
    }
}
