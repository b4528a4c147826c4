use std::future::Future;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use futures::TryStreamExt;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::client::backoff::BackoffConfig;
use object_store::path::Path as ObjectPath;
use object_store::{Error as ObjectStoreError, ObjectStore};
use tokio::runtime::Runtime;
use url::Url;

use super::{ObjectEntry, RetryConfig, SourceStore, StoreOptions};
use crate::error::{Error, Result};

#[derive(Debug, thiserror::Error)]
pub enum CloudStorageBuilderError {
    #[error("unsupported or malformed URI '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("URI '{uri}' is not an s3:// URI")]
    WrongScheme { uri: String },

    #[error("URI '{uri}' missing bucket component")]
    MissingBucket { uri: String },

    #[error("failed to initialize async runtime: {0}")]
    Runtime(String),

    #[error("object_store builder error: {0}")]
    Builder(String),
}

impl From<CloudStorageBuilderError> for Error {
    fn from(err: CloudStorageBuilderError) -> Self {
        Error::Config(err.to_string())
    }
}

/// Bucket + key prefix parsed out of an `s3://bucket/prefix` URI.
#[derive(Debug, Clone)]
struct BucketIdentity {
    bucket: String,
}

impl BucketIdentity {
    fn parse(uri: &str) -> std::result::Result<Self, CloudStorageBuilderError> {
        let parsed = Url::parse(uri).map_err(|source| CloudStorageBuilderError::InvalidUri {
            uri: uri.to_string(),
            source,
        })?;
        if parsed.scheme() != "s3" {
            return Err(CloudStorageBuilderError::WrongScheme {
                uri: uri.to_string(),
            });
        }
        let bucket = parsed
            .host_str()
            .ok_or_else(|| CloudStorageBuilderError::MissingBucket {
                uri: uri.to_string(),
            })?
            .to_string();
        Ok(Self { bucket })
    }

    fn uri_for_key(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key.trim_start_matches('/'))
    }

    /// Key part of a URI inside this bucket.
    fn key_of<'a>(&self, uri: &'a str) -> Result<&'a str> {
        let root = format!("s3://{}", self.bucket);
        match uri.strip_prefix(&root) {
            Some(rest) => Ok(rest.trim_start_matches('/')),
            None => Err(Error::Storage(format!(
                "path '{uri}' outside configured bucket '{}'",
                self.bucket
            ))),
        }
    }
}

/// `run_with_retry` is the only retry layer; the client itself tries once.
fn single_attempt() -> object_store::RetryConfig {
    object_store::RetryConfig {
        max_retries: 0,
        retry_timeout: Duration::ZERO,
        backoff: BackoffConfig::default(),
    }
}

fn is_retryable(err: &ObjectStoreError) -> bool {
    !matches!(
        err,
        ObjectStoreError::NotFound { .. } | ObjectStoreError::AlreadyExists { .. }
    )
}

/// S3 source store. Blocking façade over `object_store` with its own runtime.
pub struct S3Storage {
    runtime: Runtime,
    store: Arc<dyn ObjectStore>,
    identity: BucketIdentity,
    retry: RetryConfig,
}

impl S3Storage {
    pub fn new(uri: &str, opts: &StoreOptions) -> std::result::Result<Self, CloudStorageBuilderError> {
        let identity = BucketIdentity::parse(uri)?;
        let mut builder = AmazonS3Builder::new().with_bucket_name(identity.bucket.clone());
        if let Some(region) = &opts.region {
            builder = builder.with_region(region.clone());
        }
        if let Some(creds) = &opts.credentials {
            builder = builder
                .with_access_key_id(creds.access_key_id.clone())
                .with_secret_access_key(creds.secret_access_key.clone());
        }
        builder = builder.with_retry(single_attempt());
        let store: AmazonS3 = builder
            .build()
            .map_err(|e| CloudStorageBuilderError::Builder(e.to_string()))?;
        let runtime =
            Runtime::new().map_err(|e| CloudStorageBuilderError::Runtime(e.to_string()))?;
        Ok(Self {
            runtime,
            store: Arc::new(store),
            identity,
            retry: opts.retry.clone(),
        })
    }

    fn run_with_retry<F, Fut, T>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = object_store::Result<T>>,
    {
        let mut attempt = 0usize;
        let mut backoff = self.retry.initial_backoff;

        loop {
            match self.runtime.block_on(op()) {
                Ok(value) => return Ok(value),
                Err(ObjectStoreError::NotFound { path, .. }) => {
                    return Err(Error::NotFound(path));
                }
                Err(err) => {
                    if attempt >= self.retry.max_retries || !is_retryable(&err) {
                        return Err(Error::Storage(format!("{err}")));
                    }
                    attempt += 1;
                    tracing::debug!(attempt, error = %err, "retrying s3 request");
                    thread::sleep(backoff);
                    backoff = std::cmp::min(backoff * 2, self.retry.max_backoff);
                }
            }
        }
    }
}

impl SourceStore for S3Storage {
    fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        let key = self.identity.key_of(prefix)?;
        let prefix_path = if key.is_empty() {
            None
        } else {
            Some(ObjectPath::from(key))
        };
        let metas = self.run_with_retry(|| {
            let store = Arc::clone(&self.store);
            let prefix_path = prefix_path.clone();
            async move { store.list(prefix_path.as_ref()).try_collect::<Vec<_>>().await }
        })?;
        let mut out: Vec<ObjectEntry> = metas
            .into_iter()
            .map(|meta| ObjectEntry {
                path: self.identity.uri_for_key(meta.location.as_ref()),
                size: meta.size as u64,
            })
            .collect();
        // object_store lists whole path segments; keep S3's raw prefix semantics.
        out.retain(|e| e.path.starts_with(prefix.trim_end_matches('/')));
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let obj_path = ObjectPath::from(self.identity.key_of(path)?);
        self.run_with_retry(|| {
            let store = Arc::clone(&self.store);
            let obj_path = obj_path.clone();
            async move { store.get(&obj_path).await?.bytes().await }
        })
        .map(|bytes| bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_identity_round_trips_keys() {
        let id = BucketIdentity::parse("s3://udacity-dend/log_data").unwrap();
        assert_eq!(id.bucket, "udacity-dend");
        assert_eq!(id.key_of("s3://udacity-dend/log_data").unwrap(), "log_data");
        assert_eq!(
            id.uri_for_key("song_data/A/A/A/x.json"),
            "s3://udacity-dend/song_data/A/A/A/x.json"
        );
        assert!(id.key_of("s3://elsewhere/x").is_err());
    }

    #[test]
    fn builder_initializes_with_dummy_credentials() {
        let opts = StoreOptions {
            region: Some("us-west-2".into()),
            credentials: Some(starhouse_core::config::Credentials::new("AKIA", "SECRET")),
            ..Default::default()
        };
        S3Storage::new("s3://dummy-bucket/tests", &opts).expect("s3 storage builds");
    }

    #[test]
    fn client_does_not_retry_on_its_own() {
        let cfg = single_attempt();
        assert_eq!(cfg.max_retries, 0);
        assert_eq!(cfg.retry_timeout, Duration::ZERO);
    }
}
