//! The seam between the catalog and a database.

use starhouse_pipeline::{CopySpec, Dialect};

use crate::error::{ExecError, Result};

/// Runs catalog statements, one at a time, in the order given.
pub trait SqlExecutor {
    /// Dialect the catalog must be rendered in for this executor.
    fn dialect(&self) -> Dialect;

    fn execute(&mut self, sql: &str) -> Result<()>;

    /// Perform a bulk load. Engines with a native COPY just run `sql`.
    /// Returns the loaded row count when the engine reports one.
    fn bulk_load(&mut self, spec: &CopySpec, sql: &str) -> Result<Option<u64>> {
        let _ = spec;
        self.execute(sql)?;
        Ok(None)
    }

    fn count_rows(&mut self, table: &str) -> Result<u64>;
}

impl<E: SqlExecutor + ?Sized> SqlExecutor for &mut E {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        (**self).execute(sql)
    }

    fn bulk_load(&mut self, spec: &CopySpec, sql: &str) -> Result<Option<u64>> {
        (**self).bulk_load(spec, sql)
    }

    fn count_rows(&mut self, table: &str) -> Result<u64> {
        (**self).count_rows(table)
    }
}

/// Accept plain `[A-Za-z_][A-Za-z0-9_]*` table names only; they are
/// interpolated into SQL.
pub fn checked_identifier(name: &str) -> Result<&str> {
    let mut chars = name.chars();
    let ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(name)
    } else {
        Err(ExecError::Identifier(name.to_string()))
    }
}
