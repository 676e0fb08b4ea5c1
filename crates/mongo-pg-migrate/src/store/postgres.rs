//! PostgreSQL target store implementation.
//!
//! Batches travel as a single `jsonb` parameter expanded server-side with
//! `jsonb_populate_recordset`, inserted with `ON CONFLICT DO NOTHING` so
//! re-processing already-migrated pages after a resume is harmless. SQL
//! state classes distinguish batch-level constraint failures (recoverable,
//! journaled by the loader) from connectivity loss (fatal).

use super::{Record, TargetStore};
use crate::config::TargetConfig;
use crate::error::{MigrateError, Result};
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use serde_json::Value;
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::info;
use uuid::Uuid;

/// Pooled PostgreSQL target.
pub struct PgTarget {
    pool: Pool,
}

impl PgTarget {
    /// Create a pool and verify connectivity.
    pub async fn new(config: &TargetConfig) -> Result<Self> {
        let pg_config: PgConfig = config
            .connection_string()
            .parse()
            .map_err(|e| MigrateError::Config(format!("Invalid target config: {e}")))?;

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(config.max_connections)
            .build()
            .map_err(|e| MigrateError::Pool(format!("Failed to create pool: {}", e)))?;

        let target = Self { pool };
        target.ping().await?;

        info!(
            "Connected to PostgreSQL: {}:{}/{}",
            config.host, config.port, config.database
        );
        Ok(target)
    }

    async fn client(&self) -> Result<deadpool_postgres::Client> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::TargetConnectivity(format!("Failed to get connection: {e}")))
    }
}

/// Classify a driver error for one batch write: constraint/data/structure
/// violations reject the batch but leave the run alive; anything else is
/// treated as connectivity loss.
fn classify_write_error(table: &str, e: tokio_postgres::Error) -> MigrateError {
    if let Some(db_err) = e.as_db_error() {
        let class = &db_err.code().code()[..2];
        // 22 = data exception, 23 = integrity constraint violation,
        // 42 = syntax error or access rule violation (e.g. dropped column).
        if matches!(class, "22" | "23" | "42") {
            return MigrateError::batch_commit(table, db_err.message());
        }
    }
    MigrateError::TargetConnectivity(e.to_string())
}

#[async_trait]
impl TargetStore for PgTarget {
    async fn ping(&self) -> Result<()> {
        let client = self.client().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::TargetConnectivity(e.to_string()))?;
        Ok(())
    }

    async fn insert_many(&self, table: &str, records: &[Record]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let client = self.client().await?;
        let payload = Value::Array(records.iter().cloned().map(Value::Object).collect());
        // Table names come from the static phase plan, never from input.
        let sql = format!(
            "INSERT INTO \"{table}\" \
             SELECT * FROM jsonb_populate_recordset(NULL::\"{table}\", $1) \
             ON CONFLICT DO NOTHING"
        );
        client
            .execute(&sql, &[&payload])
            .await
            .map_err(|e| classify_write_error(table, e))
    }

    async fn find_by_id(&self, table: &str, id: Uuid) -> Result<Option<Record>> {
        let client = self.client().await?;
        let sql = format!("SELECT to_jsonb(t) FROM \"{table}\" t WHERE t.id = $1");
        let row = client
            .query_opt(&sql, &[&id])
            .await
            .map_err(|e| MigrateError::TargetConnectivity(e.to_string()))?;
        Ok(row.and_then(|r| match r.get::<_, Value>(0) {
            Value::Object(map) => Some(map),
            _ => None,
        }))
    }

    async fn count(&self, table: &str) -> Result<u64> {
        let client = self.client().await?;
        let sql = format!("SELECT count(*) FROM \"{table}\"");
        let row = client
            .query_one(&sql, &[])
            .await
            .map_err(|e| MigrateError::TargetConnectivity(e.to_string()))?;
        Ok(row.get::<_, i64>(0) as u64)
    }

    async fn scan(&self, table: &str, offset: u64, limit: usize) -> Result<Vec<Record>> {
        let client = self.client().await?;
        // Ordering by the jsonb projection keeps pagination stable for
        // link tables, which have no id column.
        let sql = format!(
            "SELECT to_jsonb(t) FROM \"{table}\" t ORDER BY 1 OFFSET $1 LIMIT $2"
        );
        let rows = client
            .query(&sql, &[&(offset as i64), &(limit as i64)])
            .await
            .map_err(|e| MigrateError::TargetConnectivity(e.to_string()))?;
        Ok(rows
            .into_iter()
            .filter_map(|r| match r.get::<_, Value>(0) {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }
}
