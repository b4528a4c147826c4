#![forbid(unsafe_code)]
//! starhouse-io: object-source access and JSON readers.
//!
//! - `storage`: the `SourceStore` trait plus filesystem and (feature `s3`)
//!   S3 implementations, chosen by URI scheme.
//! - `memory_storage`: in-memory store for tests.
//! - `readers::json`: JSON document parsing and JSONPaths column mapping, the
//!   subset of the warehouse's JSON COPY semantics needed for local loads.

pub mod error;
pub mod memory_storage;
pub mod readers;
pub mod storage;

pub use error::{Error, Result};
pub use memory_storage::MemoryStorage;
pub use readers::json::{read_json_documents, ColumnMapping, JsonPaths};
pub use storage::{
    build_source_store, probe_source, same_object, FsStorage, ObjectEntry, RetryConfig, SourceStats,
    SourceStore, StoreOptions,
};
