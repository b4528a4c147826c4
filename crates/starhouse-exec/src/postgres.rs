//! Redshift executor over the Postgres wire protocol (feature `redshift`).
//!
//! Blocking façade: owns a tokio runtime, drives the connection task on it,
//! and runs each statement with `batch_execute`. COPY is executed natively.

use tokio::runtime::Runtime;
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tracing::{debug, error};

use starhouse_core::config::DatabaseConfig;
use starhouse_pipeline::Dialect;

use crate::error::{ExecError, Result};
use crate::executor::{checked_identifier, SqlExecutor};

pub struct PostgresExecutor {
    runtime: Runtime,
    client: Client,
}

impl PostgresExecutor {
    /// Connect to `host` with the database settings from the config.
    pub fn connect(db: &DatabaseConfig, host: &str) -> Result<Self> {
        let mut pg = PgConfig::new();
        pg.host(host);
        pg.port(db.port);
        pg.user(&db.user);
        if !db.password.is_empty() {
            pg.password(&db.password);
        }
        pg.dbname(&db.name);

        let runtime = Runtime::new()
            .map_err(|e| ExecError::Connect(format!("failed to initialize async runtime: {e}")))?;
        let (client, connection) = runtime
            .block_on(pg.connect(NoTls))
            .map_err(|e| ExecError::Connect(format!("{}: {e}", db.redacted_url(host))))?;
        runtime.spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "postgres connection error");
            }
        });
        debug!(url = %db.redacted_url(host), "connected");
        Ok(Self { runtime, client })
    }
}

impl SqlExecutor for PostgresExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Redshift
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        self.runtime.block_on(self.client.batch_execute(sql))?;
        Ok(())
    }

    fn count_rows(&mut self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", checked_identifier(table)?);
        let row = self
            .runtime
            .block_on(self.client.query_one(sql.as_str(), &[]))?;
        let n: i64 = row.try_get(0)?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}
