//! Source stores implementing [`SourceStore`].
//!
//! - `fs`: Local filesystem (bare paths and `file://` URIs, default).
//! - `cloud`: S3 buckets built on top of `object_store` (feature `s3`).
//!
//! Also exposes `RetryConfig` and a builder that chooses the appropriate
//! store based on the source URI (e.g. `file:///data/log_data`, `s3://bucket/log_data`).

mod fs;
pub use fs::FsStorage;

#[cfg(feature = "s3")]
mod cloud;
#[cfg(feature = "s3")]
pub use cloud::{CloudStorageBuilderError, S3Storage};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use starhouse_core::config::Credentials;

use crate::error::{Error, Result};

/// One object under a listed prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    /// Full path or URI, usable with [`SourceStore::read`].
    pub path: String,
    pub size: u64,
}

/// Read-only access to the objects a COPY statement would ingest.
///
/// Listing follows object-store prefix semantics: `data/log` matches both
/// `data/log/2018-11-01.json` and `data/log_old.json`.
pub trait SourceStore: Send + Sync {
    /// All objects under `prefix`, sorted by path.
    fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>>;

    /// Whole-object read.
    fn read(&self, path: &str) -> Result<Vec<u8>>;
}

/// Retry/backoff configuration for cloud stores.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Connection hints for stores that need them.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub region: Option<String>,
    pub credentials: Option<Credentials>,
    pub retry: RetryConfig,
}

/// Scheme of a source URI, if it has one (`s3://b/k` → `s3`, `/tmp/x` → None).
pub fn scheme_of(uri: &str) -> Option<&str> {
    uri.split_once("://")
        .map(|(s, _)| s.trim())
        .filter(|s| !s.is_empty())
}

/// Whether two source locations name the same object. `file://` URIs and
/// bare paths compare by filesystem path; other schemes compare verbatim.
pub fn same_object(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let local = |uri: &str| match scheme_of(uri) {
        Some("file") | None => fs::local_path(uri).ok(),
        Some(_) => None,
    };
    match (local(a), local(b)) {
        (Some(pa), Some(pb)) => pa == pb,
        _ => false,
    }
}

/// Build the correct store for `uri`.
pub fn build_source_store(uri: &str, opts: &StoreOptions) -> Result<Box<dyn SourceStore>> {
    match scheme_of(uri) {
        Some("s3") => {
            #[cfg(feature = "s3")]
            {
                let store = S3Storage::new(uri, opts)?;
                Ok(Box::new(store))
            }

            #[cfg(not(feature = "s3"))]
            {
                let _ = opts;
                Err(Error::Config(
                    "starhouse was built without the `s3` feature; rebuild with `--features starhouse-io/s3`"
                        .into(),
                ))
            }
        }
        Some("file") | None => Ok(Box::new(FsStorage::new())),
        Some(other) => Err(Error::Config(format!("unsupported source scheme '{other}'"))),
    }
}

/// Object count and total size under a prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub objects: usize,
    pub bytes: u64,
}

impl SourceStats {
    pub fn is_empty(&self) -> bool {
        self.objects == 0
    }
}

/// Summarize what a COPY from `prefix` would see.
pub fn probe_source(store: &dyn SourceStore, prefix: &str) -> Result<SourceStats> {
    let entries = store.list(prefix)?;
    let stats = SourceStats {
        objects: entries.len(),
        bytes: entries.iter().map(|e| e.size).sum(),
    };
    tracing::debug!(prefix, objects = stats.objects, bytes = stats.bytes, "probed source");
    Ok(stats)
}
