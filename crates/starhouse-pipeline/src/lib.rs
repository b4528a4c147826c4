#![forbid(unsafe_code)]
//! starhouse-pipeline: the star-schema statement catalog.
//!
//! - `schema`: dialect-neutral table definitions (staging, fact, dimensions)
//! - `dialect`: Redshift and SQLite spellings of DDL, COPY and date functions
//! - `catalog`: phases, statements, copy specs
//! - `builder`: settings → `Catalog`, with the phase orderings fixed here
//!
//! Execution lives in `starhouse-exec`.

pub mod builder;
pub mod catalog;
pub mod dialect;
pub mod error;
pub mod schema;

pub use builder::{build_catalog, CatalogSettings, INSERT_ORDER};
pub use catalog::{Catalog, CopySpec, JsonFormat, Phase, Statement};
pub use dialect::{Dialect, TimeField};
pub use error::{Error, Result};
pub use schema::{star_schema, TableDef, TableKind};
