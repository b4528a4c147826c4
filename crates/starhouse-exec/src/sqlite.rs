//! SQLite executor for local runs and tests.
//!
//! Foreign keys are enforced, so out-of-order inserts fail here the way a
//! key-enforcing warehouse would. COPY statements are performed by reading
//! the JSON sources through a [`SourceStore`] and inserting row by row
//! inside one transaction per table. Every object under the source prefix is
//! read, as COPY would, except the JSONPaths file itself. Empty strings bound
//! for numeric columns load as NULL.

use std::path::Path;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use tracing::{debug, info, warn};

use starhouse_io::{
    build_source_store, read_json_documents, same_object, ColumnMapping, JsonPaths, SourceStore,
    StoreOptions,
};
use starhouse_pipeline::{CopySpec, Dialect, JsonFormat};

use crate::error::Result;
use crate::executor::{checked_identifier, SqlExecutor};

pub struct SqliteExecutor {
    conn: Connection,
    store: Option<Box<dyn SourceStore>>,
    store_options: StoreOptions,
}

impl SqliteExecutor {
    /// Open or create a database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(starhouse_io::Error::from)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn,
            store: None,
            store_options: StoreOptions::default(),
        })
    }

    /// Read every COPY source from `store` instead of resolving it by scheme.
    pub fn with_source_store(mut self, store: Box<dyn SourceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Region/credentials used when a COPY source needs a remote store.
    pub fn with_store_options(mut self, options: StoreOptions) -> Self {
        self.store_options = options;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn resolve_store(&self, uri: &str, region: &str) -> Result<ResolvedStore<'_>> {
        if let Some(store) = &self.store {
            return Ok(ResolvedStore::Borrowed(store.as_ref()));
        }
        let mut opts = self.store_options.clone();
        if opts.region.is_none() {
            opts.region = Some(region.to_string());
        }
        Ok(ResolvedStore::Owned(build_source_store(uri, &opts)?))
    }

    fn column_mapping(&self, spec: &CopySpec) -> Result<ColumnMapping> {
        match &spec.format {
            JsonFormat::Auto => Ok(ColumnMapping::Auto),
            JsonFormat::JsonPaths(path) => {
                let store = self.resolve_store(path, &spec.region)?;
                let bytes = store.get().read(path)?;
                Ok(ColumnMapping::Paths(JsonPaths::parse(&bytes)?))
            }
        }
    }

    /// For each of `columns`, whether its declared type has numeric affinity.
    fn numeric_columns(&self, table: &str, columns: &[String]) -> Result<Vec<bool>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, type FROM pragma_table_info(?1)")?;
        let declared = stmt
            .query_map([table], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns
            .iter()
            .map(|c| {
                declared
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(c))
                    .map(|(_, ty)| has_numeric_affinity(ty))
                    .unwrap_or(false)
            })
            .collect())
    }
}

/// SQLite's affinity rules: anything not TEXT/BLOB-like is numeric.
fn has_numeric_affinity(declared: &str) -> bool {
    let ty = declared.to_ascii_uppercase();
    if ty.contains("INT") {
        return true;
    }
    if ty.is_empty() || ty.contains("CHAR") || ty.contains("CLOB") || ty.contains("TEXT") || ty.contains("BLOB") {
        return false;
    }
    true
}

enum ResolvedStore<'a> {
    Borrowed(&'a dyn SourceStore),
    Owned(Box<dyn SourceStore>),
}

impl ResolvedStore<'_> {
    fn get(&self) -> &dyn SourceStore {
        match self {
            ResolvedStore::Borrowed(s) => *s,
            ResolvedStore::Owned(s) => s.as_ref(),
        }
    }
}

/// JSON scalar → SQLite value. Nested values are stored as JSON text.
fn to_sql_value(v: Value, numeric: bool) -> SqlValue {
    match v {
        Value::String(s) if numeric && s.trim().is_empty() => SqlValue::Null,
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s),
        nested => SqlValue::Text(nested.to_string()),
    }
}

impl SqlExecutor for SqliteExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn bulk_load(&mut self, spec: &CopySpec, _sql: &str) -> Result<Option<u64>> {
        let table = checked_identifier(&spec.table)?;
        for c in &spec.columns {
            checked_identifier(c)?;
        }
        let mapping = self.column_mapping(spec)?;
        let numeric = self.numeric_columns(table, &spec.columns)?;

        let mut rows: Vec<Vec<Value>> = Vec::new();
        let mut objects = 0usize;
        {
            let store = self.resolve_store(&spec.source, &spec.region)?;
            let paths_file = match &spec.format {
                JsonFormat::JsonPaths(p) => Some(p.as_str()),
                JsonFormat::Auto => None,
            };
            for entry in store.get().list(&spec.source)? {
                if paths_file.is_some_and(|p| same_object(p, &entry.path)) {
                    continue;
                }
                objects += 1;
                let bytes = store.get().read(&entry.path)?;
                for doc in read_json_documents(&entry.path, &bytes)? {
                    rows.push(mapping.row(&doc, &spec.columns)?);
                }
            }
        }
        if objects == 0 {
            warn!(table, source = %spec.source, "no objects under source");
        }

        let placeholders: Vec<String> = (1..=spec.columns.len()).map(|i| format!("?{i}")).collect();
        let insert = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            spec.columns.join(", "),
            placeholders.join(", ")
        );
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&insert)?;
            for row in &rows {
                let values = row
                    .iter()
                    .cloned()
                    .zip(numeric.iter())
                    .map(|(v, n)| to_sql_value(v, *n));
                stmt.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;
        info!(table, objects, rows = rows.len(), "loaded staging table");
        Ok(Some(rows.len() as u64))
    }

    fn count_rows(&mut self, table: &str) -> Result<u64> {
        let table = checked_identifier(table)?;
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
        debug!(table, rows = n, "counted rows");
        Ok(u64::try_from(n).unwrap_or(0))
    }
}
