//! Run catalog phases against an executor and record a manifest.
//!
//! Each phase runs its statements in catalog order and stops at the first
//! failure; the error names the phase and table. Nothing is retried and no
//! transaction spans statements: each statement is all-or-nothing on its own.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use starhouse_core::manifest::{PhaseReport, RunManifest};
use starhouse_pipeline::{Catalog, Phase};

use crate::error::{ExecError, Result};
use crate::executor::SqlExecutor;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct PipelineRunner<'a, E: SqlExecutor + ?Sized> {
    exec: &'a mut E,
    catalog: &'a Catalog,
    manifest: RunManifest,
    /// Tables filled by copy/insert phases so far, for the final row counts.
    filled: Vec<String>,
}

impl<'a, E: SqlExecutor + ?Sized> PipelineRunner<'a, E> {
    /// Fails if the catalog was rendered for another dialect.
    pub fn new(exec: &'a mut E, catalog: &'a Catalog) -> Result<Self> {
        if exec.dialect() != catalog.dialect {
            return Err(ExecError::DialectMismatch {
                catalog: catalog.dialect,
                executor: exec.dialect(),
            });
        }
        let manifest = RunManifest::new(catalog.hash(), catalog.dialect.as_str(), now_millis());
        Ok(Self {
            exec,
            catalog,
            manifest,
            filled: Vec::new(),
        })
    }

    pub fn run_phase(&mut self, phase: Phase) -> Result<PhaseReport> {
        let catalog = self.catalog;
        let started = Instant::now();
        let mut tables = Vec::new();
        info!(%phase, statements = catalog.phase(phase).len(), "phase started");

        for stmt in catalog.phase(phase) {
            debug!(%phase, table = %stmt.table, sql = %stmt.sql, "executing");
            let outcome = match &stmt.copy {
                Some(spec) => self.exec.bulk_load(spec, &stmt.sql).map(|rows| {
                    if let Some(rows) = rows {
                        info!(table = %stmt.table, rows, "bulk load finished");
                    }
                }),
                None => self.exec.execute(&stmt.sql),
            };
            outcome.map_err(|e| ExecError::at(phase, &stmt.table, e))?;
            tables.push(stmt.table.clone());
        }

        if matches!(phase, Phase::Copy | Phase::Insert) {
            for t in &tables {
                if !self.filled.contains(t) {
                    self.filled.push(t.clone());
                }
            }
        }
        let report = PhaseReport {
            phase: phase.as_str().to_string(),
            tables,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(%phase, elapsed_ms = report.elapsed_ms, "phase finished");
        self.manifest.record(report.clone());
        Ok(report)
    }

    /// Drop all seven tables. Safe to repeat.
    pub fn drop_all(&mut self) -> Result<PhaseReport> {
        self.run_phase(Phase::Drop)
    }

    /// Create all seven tables. Fails on existing staging tables.
    pub fn create_all(&mut self) -> Result<PhaseReport> {
        self.run_phase(Phase::Create)
    }

    /// Bulk-load both staging tables.
    pub fn load_staging(&mut self) -> Result<PhaseReport> {
        self.run_phase(Phase::Copy)
    }

    /// Fill the dimension and fact tables from staging.
    pub fn transform_all(&mut self) -> Result<PhaseReport> {
        self.run_phase(Phase::Insert)
    }

    /// Drop, then create: a fresh schema.
    pub fn create_tables(&mut self) -> Result<()> {
        self.drop_all()?;
        self.create_all()?;
        Ok(())
    }

    /// Load staging, then transform.
    pub fn etl(&mut self) -> Result<()> {
        self.load_staging()?;
        self.transform_all()?;
        Ok(())
    }

    /// Close the run: count rows in every filled table and return the manifest.
    pub fn finish(mut self) -> Result<RunManifest> {
        let mut counts = Vec::with_capacity(self.filled.len());
        for table in &self.filled {
            counts.push((table.clone(), self.exec.count_rows(table)?));
        }
        Ok(self.manifest.finish(now_millis(), counts))
    }

    /// `create_tables` + `etl`, then `finish`.
    pub fn run_all(mut self) -> Result<RunManifest> {
        self.create_tables()?;
        self.etl()?;
        self.finish()
    }
}
