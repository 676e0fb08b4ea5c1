//! Validation report types, serialized to the report file.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-layer verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LayerStatus {
    Pass,
    Fail,
}

/// Only the first few discrepancies per layer carry detail text; the count
/// is always exact.
pub const DETAIL_CAP: usize = 20;

/// Result of one audit layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerReport {
    /// 1-based layer number.
    pub layer: u8,
    pub name: String,
    pub status: LayerStatus,
    /// Units checked: rows, samples, or references depending on the layer.
    pub checked: u64,
    pub discrepancy_count: u64,
    /// Human-readable details, capped at [`DETAIL_CAP`].
    pub discrepancies: Vec<String>,
}

impl LayerReport {
    pub fn new(layer: u8, name: &str) -> Self {
        Self {
            layer,
            name: name.to_string(),
            status: LayerStatus::Pass,
            checked: 0,
            discrepancy_count: 0,
            discrepancies: Vec::new(),
        }
    }

    /// Record one discrepancy; the layer fails from the first one.
    pub fn discrepancy(&mut self, detail: String) {
        self.status = LayerStatus::Fail;
        self.discrepancy_count += 1;
        if self.discrepancies.len() < DETAIL_CAP {
            self.discrepancies.push(detail);
        }
    }
}

/// Full report over all four layers. Overall status is PASS only when every
/// layer passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub timestamp: DateTime<Utc>,
    pub overall: LayerStatus,
    pub layers: Vec<LayerReport>,
}

impl ValidationReport {
    pub fn new(layers: Vec<LayerReport>) -> Self {
        let overall = if layers.iter().all(|l| l.status == LayerStatus::Pass) {
            LayerStatus::Pass
        } else {
            LayerStatus::Fail
        };
        Self {
            timestamp: Utc::now(),
            overall,
            layers,
        }
    }

    pub fn passed(&self) -> bool {
        self.overall == LayerStatus::Pass
    }

    /// Persist the report as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
