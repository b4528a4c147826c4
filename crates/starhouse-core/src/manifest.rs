//! Run manifest for audit of pipeline executions.
//!
//! The runner emits a manifest after each successful sequence of phases; the
//! catalog hash identifies exactly which statements were executed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::Hash256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestId(pub Uuid);

/// Outcome of one phase (drop, create, copy, insert).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: String,
    /// Tables touched, in execution order.
    pub tables: Vec<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub id: ManifestId,

    /// Stable hash of every rendered statement in the catalog.
    pub catalog_hash: Hash256,

    /// SQL dialect the catalog was rendered for.
    pub dialect: String,

    /// Tool version string for provenance.
    pub tool_version: String,

    pub phases: Vec<PhaseReport>,

    /// Optional row counts per target table after the run.
    pub row_counts: Vec<(String, u64)>,

    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

impl RunManifest {
    pub fn new(catalog_hash: Hash256, dialect: impl Into<String>, started_ms: u64) -> Self {
        Self {
            id: ManifestId(Uuid::new_v4()),
            catalog_hash,
            dialect: dialect.into(),
            tool_version: crate::VERSION.to_string(),
            phases: Vec::new(),
            row_counts: Vec::new(),
            started_ms,
            finished_ms: started_ms,
        }
    }

    pub fn record(&mut self, report: PhaseReport) {
        self.phases.push(report);
    }

    pub fn finish(mut self, finished_ms: u64, row_counts: Vec<(String, u64)>) -> Self {
        self.finished_ms = finished_ms;
        self.row_counts = row_counts;
        self
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.finished_ms.saturating_sub(self.started_ms)
    }
}
