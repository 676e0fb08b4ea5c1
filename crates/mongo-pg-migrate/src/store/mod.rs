//! Store collaborator traits.
//!
//! The engine never talks to a concrete database directly; it goes through
//! [`SourceStore`] (paginated reads of raw documents) and [`TargetStore`]
//! (duplicate-tolerant batch writes plus the point reads the validator
//! needs). Production runs pair [`JsonlSource`] with [`PgTarget`]; tests
//! use the in-memory implementations.

mod jsonl;
mod memory;
mod postgres;

pub use jsonl::JsonlSource;
pub use memory::{MemorySource, MemoryTarget};
pub use postgres::PgTarget;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// A target-shape record: a flat map of column name to JSON value, with an
/// `id` column for entity tables and a pure FK pair for link tables.
pub type Record = serde_json::Map<String, Value>;

/// Read access to the source document store.
///
/// `scan` must return a stable ordering across repeated calls with the same
/// parameters; pagination and resume correctness depend on it.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Number of documents in a collection.
    async fn count(&self, collection: &str) -> Result<u64>;

    /// Fetch one page of raw documents.
    async fn scan(&self, collection: &str, skip: u64, limit: usize) -> Result<Vec<Value>>;
}

/// Write and audit access to the target relational store.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Verify connectivity.
    async fn ping(&self) -> Result<()>;

    /// Insert a batch as one atomic, duplicate-tolerant operation: rows
    /// whose identity already exists are silently skipped. Returns the
    /// number of rows actually inserted. A returned
    /// [`MigrateError::BatchCommit`](crate::error::MigrateError::BatchCommit)
    /// means the whole batch was rejected and zero rows landed.
    async fn insert_many(&self, table: &str, records: &[Record]) -> Result<u64>;

    /// Point lookup by primary key.
    async fn find_by_id(&self, table: &str, id: Uuid) -> Result<Option<Record>>;

    /// Number of rows in a table.
    async fn count(&self, table: &str) -> Result<u64>;

    /// Read a page of rows in a stable order (validator layers 3 and 4).
    async fn scan(&self, table: &str, offset: u64, limit: usize) -> Result<Vec<Record>>;
}

/// Extract the `id` column of a record as a UUID, if present and valid.
pub fn record_id(record: &Record) -> Option<Uuid> {
    record
        .get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}
