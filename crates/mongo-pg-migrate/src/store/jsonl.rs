//! Source store backed by a mongoexport-style dump directory.
//!
//! One `<collection>.jsonl` file per collection, one JSON document per line.
//! Files are loaded once and cached; line order is the stable scan order.
//! A missing file is an empty collection (a tenant may simply have no
//! documents of that kind), not an error.

use super::SourceStore;
use crate::error::{MigrateError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// JSONL export directory source.
pub struct JsonlSource {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<Vec<Value>>>>,
}

impl JsonlSource {
    /// Open an export directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(MigrateError::Config(format!(
                "Source export directory not found: {}",
                dir.display()
            )));
        }
        Ok(Self {
            dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn load(&self, collection: &str) -> Result<Arc<Vec<Value>>> {
        if let Some(docs) = self.cache.read().expect("jsonl cache poisoned").get(collection) {
            return Ok(docs.clone());
        }

        let path = self.dir.join(format!("{collection}.jsonl"));
        let docs = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| MigrateError::source_fetch(collection, e.to_string()))?;
            let mut docs = Vec::new();
            for (lineno, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let doc: Value = serde_json::from_str(line).map_err(|e| {
                    MigrateError::source_fetch(
                        collection,
                        format!("{}:{}: {e}", path.display(), lineno + 1),
                    )
                })?;
                docs.push(doc);
            }
            debug!("Loaded {} documents from {}", docs.len(), path.display());
            docs
        } else {
            warn!(
                "No export file for collection {collection} ({}), treating as empty",
                path.display()
            );
            Vec::new()
        };

        let docs = Arc::new(docs);
        self.cache
            .write()
            .expect("jsonl cache poisoned")
            .insert(collection.to_string(), docs.clone());
        Ok(docs)
    }
}

#[async_trait]
impl SourceStore for JsonlSource {
    async fn count(&self, collection: &str) -> Result<u64> {
        Ok(self.load(collection)?.len() as u64)
    }

    async fn scan(&self, collection: &str, skip: u64, limit: usize) -> Result<Vec<Value>> {
        let docs = self.load(collection)?;
        Ok(docs
            .iter()
            .skip(skip as usize)
            .take(limit)
            .cloned()
            .collect())
    }
}
