#![forbid(unsafe_code)]
//! starhouse-exec: executes the statement catalog.
//!
//! - `SqlExecutor`: the executor seam (execute, bulk load, row count)
//! - `SqliteExecutor`: local database with foreign keys on; performs COPY by
//!   reading JSON through a `SourceStore`
//! - `PostgresExecutor` (feature `redshift`): a live cluster over tokio-postgres
//! - `PipelineRunner`: phase operations plus the run manifest

pub mod error;
pub mod executor;
pub mod runner;
pub mod sqlite;

#[cfg(feature = "redshift")]
pub mod postgres;

pub use error::{ExecError, Result};
pub use executor::{checked_identifier, SqlExecutor};
pub use runner::PipelineRunner;
pub use sqlite::SqliteExecutor;

#[cfg(feature = "redshift")]
pub use postgres::PostgresExecutor;
