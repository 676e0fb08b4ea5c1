//! In-memory store implementations for tests and dry runs.

use super::{Record, SourceStore, TargetStore};
use crate::error::{MigrateError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

/// In-memory source: named collections of raw documents in fixed order.
#[derive(Debug, Default)]
pub struct MemorySource {
    collections: Mutex<HashMap<String, Vec<Value>>>,
    failing: Mutex<HashSet<String>>,
    scans: Mutex<HashMap<String, u64>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style collection seeding.
    pub fn with_collection(self, name: &str, docs: Vec<Value>) -> Self {
        self.collections
            .lock()
            .unwrap()
            .insert(name.to_string(), docs);
        self
    }

    /// Append a document to a collection.
    pub fn insert(&self, collection: &str, doc: Value) {
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(doc);
    }

    /// Make every subsequent fetch from `collection` fail (fatal-path tests).
    pub fn inject_fetch_failure(&self, collection: &str) {
        self.failing.lock().unwrap().insert(collection.to_string());
    }

    /// Number of `scan` calls issued against `collection` so far.
    pub fn scan_calls(&self, collection: &str) -> u64 {
        self.scans
            .lock()
            .unwrap()
            .get(collection)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl SourceStore for MemorySource {
    async fn count(&self, collection: &str) -> Result<u64> {
        if self.failing.lock().unwrap().contains(collection) {
            return Err(MigrateError::source_fetch(collection, "injected failure"));
        }
        Ok(self
            .collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|docs| docs.len() as u64)
            .unwrap_or(0))
    }

    async fn scan(&self, collection: &str, skip: u64, limit: usize) -> Result<Vec<Value>> {
        *self
            .scans
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_insert(0) += 1;
        if self.failing.lock().unwrap().contains(collection) {
            return Err(MigrateError::source_fetch(collection, "injected failure"));
        }
        let collections = self.collections.lock().unwrap();
        let docs = match collections.get(collection) {
            Some(docs) => docs,
            None => return Ok(Vec::new()),
        };
        Ok(docs
            .iter()
            .skip(skip as usize)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
struct MemoryTable {
    rows: Vec<Record>,
    // Row identity: "id" column for entity rows, the serialized pair for
    // link rows. Duplicate identities are silently skipped on insert.
    seen: HashSet<String>,
}

/// In-memory target with duplicate-tolerant inserts and injectable
/// batch-commit failures.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    tables: Mutex<HashMap<String, MemoryTable>>,
    // table -> number of insert_many calls left to reject.
    failing_batches: Mutex<HashMap<String, usize>>,
    fail_ping: Mutex<bool>,
}

fn row_identity(record: &Record) -> String {
    match record.get("id").and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => serde_json::to_string(record).unwrap_or_default(),
    }
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `n` batch writes to `table` with a commit error.
    pub fn inject_batch_failures(&self, table: &str, n: usize) {
        self.failing_batches
            .lock()
            .unwrap()
            .insert(table.to_string(), n);
    }

    /// Make ping fail (target-connectivity tests).
    pub fn inject_ping_failure(&self) {
        *self.fail_ping.lock().unwrap() = true;
    }

    /// Snapshot of all rows in a table, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Remove a single row by id (used to stage validator discrepancies).
    pub fn remove_row(&self, table: &str, id: Uuid) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(t) = tables.get_mut(table) {
            let id = id.to_string();
            t.rows
                .retain(|r| r.get("id").and_then(Value::as_str) != Some(id.as_str()));
            t.seen.remove(&id);
        }
    }

    /// Overwrite one column of one row in place (validator mismatch tests).
    pub fn patch_row(&self, table: &str, id: Uuid, column: &str, value: Value) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(t) = tables.get_mut(table) {
            let id = id.to_string();
            for row in &mut t.rows {
                if row.get("id").and_then(Value::as_str) == Some(id.as_str()) {
                    row.insert(column.to_string(), value);
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl TargetStore for MemoryTarget {
    async fn ping(&self) -> Result<()> {
        if *self.fail_ping.lock().unwrap() {
            return Err(MigrateError::TargetConnectivity(
                "injected ping failure".into(),
            ));
        }
        Ok(())
    }

    async fn insert_many(&self, table: &str, records: &[Record]) -> Result<u64> {
        {
            let mut failing = self.failing_batches.lock().unwrap();
            if let Some(remaining) = failing.get_mut(table) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(MigrateError::batch_commit(table, "injected commit failure"));
                }
            }
        }

        let mut tables = self.tables.lock().unwrap();
        let entry = tables.entry(table.to_string()).or_default();
        let mut inserted = 0;
        for record in records {
            if entry.seen.insert(row_identity(record)) {
                entry.rows.push(record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn find_by_id(&self, table: &str, id: Uuid) -> Result<Option<Record>> {
        let tables = self.tables.lock().unwrap();
        let id = id.to_string();
        Ok(tables.get(table).and_then(|t| {
            t.rows
                .iter()
                .find(|r| r.get("id").and_then(Value::as_str) == Some(id.as_str()))
                .cloned()
        }))
    }

    async fn count(&self, table: &str) -> Result<u64> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.rows.len() as u64)
            .unwrap_or(0))
    }

    async fn scan(&self, table: &str, offset: u64, limit: usize) -> Result<Vec<Record>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| {
                t.rows
                    .iter()
                    .skip(offset as usize)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str) -> Record {
        let mut r = Record::new();
        r.insert("id".into(), json!(id));
        r
    }

    #[tokio::test]
    async fn test_source_scan_is_stable() {
        let source = MemorySource::new().with_collection(
            "accounts",
            vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})],
        );
        let a = source.scan("accounts", 1, 2).await.unwrap();
        let b = source.scan("accounts", 1, 2).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(source.scan_calls("accounts"), 2);
        assert_eq!(source.count("accounts").await.unwrap(), 3);
        assert_eq!(source.count("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_many_skips_duplicates() {
        let target = MemoryTarget::new();
        let id = Uuid::new_v4().to_string();
        let batch = vec![record(&id), record(&Uuid::new_v4().to_string())];

        assert_eq!(target.insert_many("accounts", &batch).await.unwrap(), 2);
        // Re-inserting the same batch is harmless.
        assert_eq!(target.insert_many("accounts", &batch).await.unwrap(), 0);
        assert_eq!(target.count("accounts").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_link_rows_dedupe_on_pair() {
        let target = MemoryTarget::new();
        let mut row = Record::new();
        row.insert("account_id".into(), json!(Uuid::new_v4().to_string()));
        row.insert("user_id".into(), json!(Uuid::new_v4().to_string()));

        assert_eq!(
            target
                .insert_many("account_watchers", &[row.clone(), row.clone()])
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_injected_batch_failure_is_consumed() {
        let target = MemoryTarget::new();
        target.inject_batch_failures("accounts", 1);

        let batch = vec![record(&Uuid::new_v4().to_string())];
        let err = target.insert_many("accounts", &batch).await.unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(target.count("accounts").await.unwrap(), 0);

        // Next attempt succeeds.
        assert_eq!(target.insert_many("accounts", &batch).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let target = MemoryTarget::new();
        let id = Uuid::new_v4();
        target
            .insert_many("users", &[record(&id.to_string())])
            .await
            .unwrap();
        assert!(target.find_by_id("users", id).await.unwrap().is_some());
        assert!(target
            .find_by_id("users", Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }
}
