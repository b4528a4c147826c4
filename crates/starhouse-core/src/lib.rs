#![forbid(unsafe_code)]
//! starhouse-core: configuration, typed resource names, hashing, manifests.
//!
//! Everything here is pure data plus config-file parsing. Cloud calls live in
//! `starhouse-cloud`, SQL in `starhouse-pipeline` / `starhouse-exec`.

pub mod config;
pub mod error;
pub mod hash;
pub mod id;
pub mod manifest;
pub mod prelude;

pub use config::{load_cluster_config, load_pipeline_config};
pub use error::{Error, Result};

/// Version string recorded in manifests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
