//! Post-migration validation: a four-layer read-only audit of the target.
//!
//! Layer 1 checks row-count parity per entity table, layer 2 re-transforms
//! a sample of source documents and compares them field-by-field against
//! the target, layer 3 walks every declared foreign key looking for
//! dangling references, and layer 4 samples rows for declared-type
//! conformance. Discrepancies are aggregated into the report, never raised:
//! a [`MigrateError::Validation`](crate::error::MigrateError::Validation)
//! only means the audit itself could not run.
//!
//! The validator needs the identifier map from the completed run's
//! checkpoint; without it, source documents cannot be matched to target
//! rows.

mod compare;
mod report;

pub use report::{LayerReport, LayerStatus, ValidationReport};

use crate::error::Result;
use crate::idmap::IdMapper;
use crate::plan::{FieldKind, PhasePlan, TableSpec};
use crate::store::{SourceStore, TargetStore};
use crate::transform;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

// Page size for full-table walks (layer 3).
const SCAN_PAGE: usize = 500;

/// Read-only auditor over a finished migration.
pub struct Validator<'a> {
    source: &'a dyn SourceStore,
    target: &'a dyn TargetStore,
    plan: PhasePlan,
    mapper: IdMapper,
    sample_size: usize,
}

impl<'a> Validator<'a> {
    /// `mapper` is the identifier map restored from the run's checkpoint.
    pub fn new(
        source: &'a dyn SourceStore,
        target: &'a dyn TargetStore,
        mapper: IdMapper,
        sample_size: usize,
    ) -> Self {
        Self {
            source,
            target,
            plan: PhasePlan::standard(),
            mapper,
            sample_size,
        }
    }

    /// Run all four layers and build the report.
    pub async fn run(&self) -> Result<ValidationReport> {
        let layers = vec![
            self.layer_row_counts().await?,
            self.layer_content_equality().await?,
            self.layer_referential_integrity().await?,
            self.layer_type_conformance().await?,
        ];
        for layer in &layers {
            info!(
                "Validation layer {} ({}): {:?}, {} checked, {} discrepancies",
                layer.layer, layer.name, layer.status, layer.checked, layer.discrepancy_count
            );
        }
        Ok(ValidationReport::new(layers))
    }

    /// Layer 1: source and target row counts per entity table. A journaled
    /// failure during migration surfaces here as a count gap; missing rows
    /// are discrepancies regardless of why they are missing. Link tables
    /// have no one-to-one source collection and are audited by layer 3.
    async fn layer_row_counts(&self) -> Result<LayerReport> {
        let mut layer = LayerReport::new(1, "row-count parity");
        for table in self.plan.entity_tables() {
            let source_count = self.source.count(table.collection).await?;
            let target_count = self.target.count(table.name).await?;
            layer.checked += 1;
            if source_count != target_count {
                layer.discrepancy(format!(
                    "{}: source has {source_count} documents, target has {target_count} rows",
                    table.name
                ));
            }
        }
        Ok(layer)
    }

    /// Layer 2: re-transform a sample of source documents and compare each
    /// field against the stored row, using type-aware equality.
    async fn layer_content_equality(&self) -> Result<LayerReport> {
        let mut layer = LayerReport::new(2, "content equality");
        for table in self.plan.entity_tables() {
            let docs = self.source.scan(table.collection, 0, self.sample_size).await?;
            for doc in &docs {
                let source_id = match transform::source_id_of(doc) {
                    Some(id) => id,
                    None => continue,
                };
                // Unmapped means the record never migrated; that gap is
                // layer 1's finding, not a content mismatch.
                let target_id = match self.mapper.lookup(source_id) {
                    Some(id) => id,
                    None => continue,
                };
                let expected = match transform::transform(table.name, doc, &self.mapper) {
                    Ok(expected) => expected,
                    Err(_) => continue, // journaled during migration
                };
                layer.checked += 1;

                let actual = match self.target.find_by_id(table.name, target_id).await? {
                    Some(actual) => actual,
                    None => {
                        layer.discrepancy(format!(
                            "{}: mapped row {target_id} (source {source_id}) not found",
                            table.name
                        ));
                        continue;
                    }
                };
                for field in &table.fields {
                    let want = expected.get(field.name).unwrap_or(&Value::Null);
                    let got = actual.get(field.name).unwrap_or(&Value::Null);
                    if !compare::values_match(field.kind, want, got) {
                        layer.discrepancy(format!(
                            "{}.{} for {target_id}: expected {want}, found {got}",
                            table.name, field.name
                        ));
                    }
                }
            }
        }
        Ok(layer)
    }

    /// Layer 3: every non-null declared foreign key in the target (entity
    /// and link tables alike) must resolve to an existing row.
    async fn layer_referential_integrity(&self) -> Result<LayerReport> {
        let mut layer = LayerReport::new(3, "referential integrity");
        for phase in self.plan.phases() {
            for table in &phase.tables {
                self.check_table_references(table, &mut layer).await?;
            }
        }
        Ok(layer)
    }

    async fn check_table_references(
        &self,
        table: &TableSpec,
        layer: &mut LayerReport,
    ) -> Result<()> {
        if table.foreign_keys.is_empty() {
            return Ok(());
        }
        let mut offset = 0u64;
        loop {
            let rows = self.target.scan(table.name, offset, SCAN_PAGE).await?;
            if rows.is_empty() {
                return Ok(());
            }
            offset += rows.len() as u64;

            for row in &rows {
                for fkey in &table.foreign_keys {
                    let value = match row.get(fkey.field) {
                        None | Some(Value::Null) => continue,
                        Some(value) => value,
                    };
                    layer.checked += 1;
                    let id = match value.as_str().and_then(|s| Uuid::parse_str(s).ok()) {
                        Some(id) => id,
                        None => {
                            layer.discrepancy(format!(
                                "{}.{}: {value} is not a UUID",
                                table.name, fkey.field
                            ));
                            continue;
                        }
                    };
                    if self.target.find_by_id(fkey.references, id).await?.is_none() {
                        layer.discrepancy(format!(
                            "{}.{}: {id} has no row in {}",
                            table.name, fkey.field, fkey.references
                        ));
                    }
                }
            }
        }
    }

    /// Layer 4: sampled rows carry values of the declared kinds. `id` and
    /// link-table columns must be non-null; everything else may be null.
    async fn layer_type_conformance(&self) -> Result<LayerReport> {
        let mut layer = LayerReport::new(4, "type conformance");
        for phase in self.plan.phases() {
            for table in &phase.tables {
                let rows = self.target.scan(table.name, 0, self.sample_size).await?;
                for row in &rows {
                    layer.checked += 1;
                    for field in &table.fields {
                        let value = row.get(field.name).unwrap_or(&Value::Null);
                        if value.is_null() {
                            if field.name == "id" || table.is_link {
                                layer.discrepancy(format!(
                                    "{}.{}: unexpected null",
                                    table.name, field.name
                                ));
                            }
                            continue;
                        }
                        if !conforms(field.kind, value) {
                            layer.discrepancy(format!(
                                "{}.{}: {value} does not conform to {:?}",
                                table.name, field.name, field.kind
                            ));
                        }
                    }
                }
            }
        }
        Ok(layer)
    }
}

/// Whether a non-null stored value conforms to its declared kind.
fn conforms(kind: FieldKind, value: &Value) -> bool {
    match kind {
        FieldKind::Uuid => value
            .as_str()
            .map(|s| Uuid::parse_str(s).is_ok())
            .unwrap_or(false),
        FieldKind::Text => value.is_string(),
        FieldKind::Timestamp => value
            .as_str()
            .map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
            .unwrap_or(false),
        FieldKind::Enum { allowed, .. } => value
            .as_str()
            .map(|s| allowed.contains(&s))
            .unwrap_or(false),
        FieldKind::Number => value.is_number(),
        FieldKind::Boolean => value.is_boolean(),
        FieldKind::Payload => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{record_id, MemorySource, MemoryTarget};
    use serde_json::json;

    fn oid(prefix: u32, n: u32) -> String {
        format!("{:08x}{:016x}", prefix, n)
    }

    /// Migrate a small dataset by hand: map ids, transform, insert.
    async fn migrated_fixture() -> (MemorySource, MemoryTarget, IdMapper) {
        let source = MemorySource::new()
            .with_collection(
                "tenants",
                vec![json!({
                    "_id": oid(1, 1),
                    "name": "Initech",
                    "plan": "growth",
                    "settings": {"locale": "en"},
                    "createdAt": "2023-01-01T00:00:00Z",
                })],
            )
            .with_collection(
                "users",
                vec![json!({
                    "_id": oid(2, 1),
                    "tenantId": oid(1, 1),
                    "email": "a@initech.test",
                    "status": "active",
                })],
            );
        let target = MemoryTarget::new();
        let mapper = IdMapper::new();

        for (table, collection) in [("tenants", "tenants"), ("users", "users")] {
            let docs = source.scan(collection, 0, 100).await.unwrap();
            let records: Vec<_> = docs
                .iter()
                .map(|d| transform::transform(table, d, &mapper).unwrap())
                .collect();
            target.insert_many(table, &records).await.unwrap();
        }
        (source, target, mapper)
    }

    #[tokio::test]
    async fn test_clean_migration_passes_all_layers() {
        let (source, target, mapper) = migrated_fixture().await;
        let validator = Validator::new(&source, &target, mapper, 100);
        let report = validator.run().await.unwrap();
        assert!(report.passed(), "{:?}", report);
        assert_eq!(report.layers.len(), 4);
    }

    #[tokio::test]
    async fn test_missing_row_fails_count_parity() {
        let (source, target, mapper) = migrated_fixture().await;
        let user_id = record_id(&target.rows("users")[0]).unwrap();
        target.remove_row("users", user_id);

        let validator = Validator::new(&source, &target, mapper, 100);
        let report = validator.run().await.unwrap();
        assert!(!report.passed());
        let layer1 = &report.layers[0];
        assert_eq!(layer1.status, LayerStatus::Fail);
        assert!(layer1.discrepancies[0].contains("users"));
    }

    #[tokio::test]
    async fn test_corrupted_field_fails_content_equality() {
        let (source, target, mapper) = migrated_fixture().await;
        let user_id = record_id(&target.rows("users")[0]).unwrap();
        target.patch_row("users", user_id, "email", json!("tampered@evil.test"));

        let validator = Validator::new(&source, &target, mapper, 100);
        let report = validator.run().await.unwrap();
        let layer2 = &report.layers[1];
        assert_eq!(layer2.status, LayerStatus::Fail);
        assert!(layer2.discrepancies[0].contains("users.email"));
    }

    #[tokio::test]
    async fn test_dangling_reference_fails_referential_integrity() {
        let (source, target, mapper) = migrated_fixture().await;
        let user_id = record_id(&target.rows("users")[0]).unwrap();
        target.patch_row(
            "users",
            user_id,
            "tenant_id",
            json!(Uuid::new_v4().to_string()),
        );

        let validator = Validator::new(&source, &target, mapper, 100);
        let report = validator.run().await.unwrap();
        let layer3 = &report.layers[2];
        assert_eq!(layer3.status, LayerStatus::Fail);
        assert!(layer3.discrepancies[0].contains("users.tenant_id"));
    }

    #[tokio::test]
    async fn test_wrong_type_fails_conformance() {
        let (source, target, mapper) = migrated_fixture().await;
        let tenant_id = record_id(&target.rows("tenants")[0]).unwrap();
        target.patch_row("tenants", tenant_id, "plan", json!("platinum"));

        let validator = Validator::new(&source, &target, mapper, 100);
        let report = validator.run().await.unwrap();
        let layer4 = &report.layers[3];
        assert_eq!(layer4.status, LayerStatus::Fail);
        assert!(layer4.discrepancies[0].contains("tenants.plan"));
    }

    #[test]
    fn test_conforms_kinds() {
        assert!(conforms(FieldKind::Uuid, &json!(Uuid::new_v4().to_string())));
        assert!(!conforms(FieldKind::Uuid, &json!("not-a-uuid")));
        assert!(conforms(FieldKind::Timestamp, &json!("2024-01-01T00:00:00Z")));
        assert!(!conforms(FieldKind::Timestamp, &json!("tomorrow")));
        assert!(conforms(FieldKind::Payload, &json!({"anything": [1, 2]})));
        assert!(!conforms(FieldKind::Boolean, &json!("true")));
    }
}
