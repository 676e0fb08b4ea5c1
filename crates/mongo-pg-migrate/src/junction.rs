//! Junction linker: turns embedded reference arrays into link-table rows.
//!
//! Runs only in the terminal phase, after every entity table has completed,
//! so both endpoints of every pair are already in the identifier map. An
//! array element that never maps (a dangling source reference) is dropped
//! with a warning rather than inserted as a violation; row-count parity for
//! link tables is therefore against *resolvable* pairs, not array lengths.

use crate::error::{MigrateError, Result};
use crate::idmap::IdMapper;
use crate::journal::{ErrorJournal, MigrationErrorEntry};
use crate::store::{Record, SourceStore, TargetStore};
use crate::transform::source_id_of;
use serde_json::Value;
use tracing::{debug, warn};

/// How one link table is fed: the owning collection, the embedded array
/// field holding referenced source ids, and the two target columns.
#[derive(Debug, Clone, Copy)]
pub struct JunctionSpec {
    pub table: &'static str,
    pub collection: &'static str,
    pub array_field: &'static str,
    pub owner_column: &'static str,
    pub ref_column: &'static str,
}

/// The fixed set of embedded arrays promoted to link tables.
pub const JUNCTIONS: &[JunctionSpec] = &[
    JunctionSpec {
        table: "account_watchers",
        collection: "accounts",
        array_field: "watchers",
        owner_column: "account_id",
        ref_column: "user_id",
    },
    JunctionSpec {
        table: "board_watchers",
        collection: "boards",
        array_field: "watchers",
        owner_column: "board_id",
        ref_column: "user_id",
    },
    JunctionSpec {
        table: "opportunity_contacts",
        collection: "opportunities",
        array_field: "contactIds",
        owner_column: "opportunity_id",
        ref_column: "contact_id",
    },
    JunctionSpec {
        table: "document_invoices",
        collection: "documents",
        array_field: "invoiceIds",
        owner_column: "document_id",
        ref_column: "invoice_id",
    },
    JunctionSpec {
        table: "document_opportunities",
        collection: "documents",
        array_field: "opportunityIds",
        owner_column: "document_id",
        ref_column: "opportunity_id",
    },
    JunctionSpec {
        table: "document_contacts",
        collection: "documents",
        array_field: "contactIds",
        owner_column: "document_id",
        ref_column: "contact_id",
    },
    JunctionSpec {
        table: "document_tasks",
        collection: "documents",
        array_field: "taskIds",
        owner_column: "document_id",
        ref_column: "task_id",
    },
];

/// Look up the junction spec feeding a link table.
pub fn junction_for(table: &str) -> Option<&'static JunctionSpec> {
    JUNCTIONS.iter().find(|j| j.table == table)
}

/// Populates link tables from embedded arrays.
pub struct JunctionLinker<'a> {
    source: &'a dyn SourceStore,
    target: &'a dyn TargetStore,
    mapper: &'a IdMapper,
    journal: &'a ErrorJournal,
    batch_size: usize,
}

impl<'a> JunctionLinker<'a> {
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

    /// Populate one link table. Returns the number of resolved pairs
    /// committed, counted the same way entity tables count records: rows
    /// offered in an accepted batch, whether or not the target skipped them
    /// as duplicates. Reruns therefore tally the same total as the first
    /// pass.
    pub async fn link_table(&self, spec: &JunctionSpec) -> Result<u64> {
        let mut migrated = 0u64;
        let mut skip = 0u64;
        let mut pending: Vec<(String, Record)> = Vec::new();

        loop {
            let docs = self
                .source
                .scan(spec.collection, skip, self.batch_size)
                .await?;
            if docs.is_empty() {
                break;
            }
            skip += docs.len() as u64;

            for doc in &docs {
                self.collect_rows(spec, doc, &mut pending);
                if pending.len() >= self.batch_size {
                    migrated += self.flush(spec, &mut pending).await?;
                }
            }
            // A short page is the last page; skip the empty probe.
            if docs.len() < self.batch_size {
                break;
            }
        }
        migrated += self.flush(spec, &mut pending).await?;

        debug!("{}: {migrated} link rows migrated", spec.table);
        Ok(migrated)
    }

    /// Resolve one owner document's array into link rows.
    fn collect_rows(&self, spec: &JunctionSpec, doc: &Value, out: &mut Vec<(String, Record)>) {
        let owner_oid = match source_id_of(doc) {
            Some(oid) => oid,
            None => {
                warn!("{}: document without _id skipped", spec.collection);
                return;
            }
        };
        let owner_uuid = match self.mapper.lookup(owner_oid) {
            Some(uuid) => uuid,
            None => {
                // Owner never migrated (journaled during its entity phase).
                warn!(
                    "{}: owner {owner_oid} not in identifier map, {} rows skipped",
                    spec.table, spec.collection
                );
                return;
            }
        };

        let elements = match doc.get(spec.array_field) {
            Some(Value::Array(elements)) => elements,
            _ => return,
        };
        for element in elements {
            let referenced = match self.mapper.rewrite_fk(Some(element)) {
                Some(uuid) => uuid,
                None => continue, // dangling reference, already warned
            };
            let mut row = Record::new();
            row.insert(
                spec.owner_column.to_string(),
                Value::String(owner_uuid.to_string()),
            );
            row.insert(
                spec.ref_column.to_string(),
                Value::String(referenced.to_string()),
            );
            out.push((owner_oid.to_string(), row));
        }
    }

    async fn flush(&self, spec: &JunctionSpec, pending: &mut Vec<(String, Record)>) -> Result<u64> {
        if pending.is_empty() {
            return Ok(0);
        }
        let rows: Vec<Record> = pending.iter().map(|(_, row)| row.clone()).collect();
        let result = self.target.insert_many(spec.table, &rows).await;
        match result {
            Ok(_) => {
                let offered = pending.len() as u64;
                pending.clear();
                Ok(offered)
            }
            Err(e @ MigrateError::BatchCommit { .. }) => {
                warn!("{}: link batch rejected: {e}", spec.table);
                for (owner_oid, row) in pending.drain(..) {
                    self.journal.log_error(
                        &MigrationErrorEntry {
                            table: spec.table.to_string(),
                            source_id: owner_oid,
                            target_id: None,
                            message: e.to_string(),
                            batch_number: 0,
                        },
                        &Value::Object(row),
                    );
                }
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemorySource, MemoryTarget};
    use serde_json::json;
    use tempfile::TempDir;

    fn oid(n: u32) -> String {
        format!("{:024x}", n)
    }

    #[tokio::test]
    async fn test_unmapped_references_are_dropped() {
        let dir = TempDir::new().unwrap();
        let mapper = IdMapper::new();
        let account = mapper.map_or_create(&oid(1)).unwrap();
        let user_a = mapper.map_or_create(&oid(2)).unwrap();
        let user_b = mapper.map_or_create(&oid(3)).unwrap();
        // oid(4) deliberately never mapped.

        let source = MemorySource::new().with_collection(
            "accounts",
            vec![json!({"_id": oid(1), "watchers": [oid(2), oid(4), oid(3)]})],
        );
        let target = MemoryTarget::new();
        let journal = ErrorJournal::new(dir.path().join("errors.log"));
        let linker = JunctionLinker::new(&source, &target, &mapper, &journal, 100);

        let spec = junction_for("account_watchers").unwrap();
        assert_eq!(linker.link_table(spec).await.unwrap(), 2);

        let rows = target.rows("account_watchers");
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row["account_id"], json!(account.to_string()));
        }
        let refs: Vec<_> = rows.iter().map(|r| r["user_id"].clone()).collect();
        assert!(refs.contains(&json!(user_a.to_string())));
        assert!(refs.contains(&json!(user_b.to_string())));
    }

    #[tokio::test]
    async fn test_missing_array_and_unmapped_owner_are_skipped() {
        let dir = TempDir::new().unwrap();
        let mapper = IdMapper::new();
        mapper.map_or_create(&oid(2)).unwrap();

        let source = MemorySource::new().with_collection(
            "boards",
            vec![
                json!({"_id": oid(1), "watchers": [oid(2)]}), // owner unmapped
                json!({"_id": oid(9)}),                       // no array at all
            ],
        );
        let target = MemoryTarget::new();
        let journal = ErrorJournal::new(dir.path().join("errors.log"));
        let linker = JunctionLinker::new(&source, &target, &mapper, &journal, 100);

        let spec = junction_for("board_watchers").unwrap();
        assert_eq!(linker.link_table(spec).await.unwrap(), 0);
        assert!(target.rows("board_watchers").is_empty());
    }

    #[tokio::test]
    async fn test_relinking_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mapper = IdMapper::new();
        mapper.map_or_create(&oid(1)).unwrap();
        mapper.map_or_create(&oid(2)).unwrap();

        let source = MemorySource::new().with_collection(
            "opportunities",
            vec![json!({"_id": oid(1), "contactIds": [oid(2)]})],
        );
        let target = MemoryTarget::new();
        let journal = ErrorJournal::new(dir.path().join("errors.log"));
        let linker = JunctionLinker::new(&source, &target, &mapper, &journal, 100);

        let spec = junction_for("opportunity_contacts").unwrap();
        assert_eq!(linker.link_table(spec).await.unwrap(), 1);
        // A rerun resolves the same pair and reports the same count even
        // though the duplicate-tolerant target keeps a single row, so a
        // resumed run's totals match a clean run's.
        assert_eq!(linker.link_table(spec).await.unwrap(), 1);
        assert_eq!(target.rows("opportunity_contacts").len(), 1);
        // One short page per pass; no trailing empty probe.
        assert_eq!(source.scan_calls("opportunities"), 2);
    }

    #[test]
    fn test_every_link_table_has_a_junction() {
        let plan = crate::plan::PhasePlan::standard();
        for table in plan.link_tables() {
            let spec = junction_for(table.name)
                .unwrap_or_else(|| panic!("no junction feeding {}", table.name));
            assert_eq!(spec.owner_column, table.fields[0].name);
            assert_eq!(spec.ref_column, table.fields[1].name);
        }
        assert_eq!(JUNCTIONS.len(), plan.link_tables().count());
    }
}
