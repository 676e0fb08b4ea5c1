//! Idempotent ObjectId-to-UUID identifier mapping.
//!
//! Every source record identifier (a 24-hex-character ObjectId string) is
//! remapped to a freshly minted v4 UUID exactly once. The map lives in
//! memory for the lifetime of a run and round-trips through the checkpoint,
//! which is what makes re-processing after a partial failure safe: the same
//! source id always resolves to the same target id.

use crate::error::{MigrateError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

/// Bidirectional-enough identifier mapper: forward lookups are O(1); the
/// reverse direction is only needed by audits, which iterate the export.
///
/// Interior locking keeps the `&self` API shareable through `Arc`. The map
/// is single-writer today (the engine is strictly sequential); parallelizing
/// tables later requires sharding this map per table to preserve the
/// idempotence invariant.
#[derive(Debug, Default)]
pub struct IdMapper {
    map: RwLock<HashMap<String, Uuid>>,
}

/// True if `id` looks like a Mongo ObjectId (24 hex characters).
pub fn is_object_id(id: &str) -> bool {
    id.len() == 24 && id.bytes().all(|b| b.is_ascii_hexdigit())
}

impl IdMapper {
    /// Create an empty mapper.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the existing mapping for `source_id`, or mint and store a new
    /// target id. Never mints twice for the same input.
    pub fn map_or_create(&self, source_id: &str) -> Result<Uuid> {
        if !is_object_id(source_id) {
            return Err(MigrateError::InvalidSourceId(source_id.to_string()));
        }
        let mut map = self.map.write().expect("idmap lock poisoned");
        Ok(*map
            .entry(source_id.to_string())
            .or_insert_with(Uuid::new_v4))
    }

    /// Non-mutating lookup.
    pub fn lookup(&self, source_id: &str) -> Option<Uuid> {
        self.map
            .read()
            .expect("idmap lock poisoned")
            .get(source_id)
            .copied()
    }

    /// Rewrite a foreign-key value read from a raw document.
    ///
    /// Absent and null pass through as `None`. A present id with no mapping
    /// yet degrades to `None` with a warning rather than failing the record;
    /// strict correctness is deferred to the validator's referential
    /// integrity layer.
    pub fn rewrite_fk(&self, value: Option<&Value>) -> Option<Uuid> {
        let raw = match value {
            None | Some(Value::Null) => return None,
            Some(Value::String(s)) => s.as_str(),
            Some(other) => {
                warn!("Foreign key is not a string ({other}), dropping reference");
                return None;
            }
        };
        match self.lookup(raw) {
            Some(uuid) => Some(uuid),
            None => {
                warn!("No mapping for referenced id {raw}, rewriting to null");
                None
            }
        }
    }

    /// Number of mapped identifiers.
    pub fn len(&self) -> usize {
        self.map.read().expect("idmap lock poisoned").len()
    }

    /// True if no identifiers have been mapped yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize the full map for the checkpoint.
    pub fn export(&self) -> HashMap<String, String> {
        self.map
            .read()
            .expect("idmap lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }

    /// Restore the map from a checkpoint. Entries with malformed UUIDs are
    /// rejected wholesale: a partially restored map would silently re-mint
    /// ids and break idempotence.
    pub fn restore(serialized: &HashMap<String, String>) -> Result<Self> {
        let mut map = HashMap::with_capacity(serialized.len());
        for (source_id, target_id) in serialized {
            let uuid = Uuid::parse_str(target_id).map_err(|e| {
                MigrateError::Checkpoint(format!(
                    "Corrupt id mapping for {source_id}: {e}"
                ))
            })?;
            map.insert(source_id.clone(), uuid);
        }
        Ok(Self {
            map: RwLock::new(map),
        })
    }
}
