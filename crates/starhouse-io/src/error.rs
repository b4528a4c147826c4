use thiserror::Error;

/// Result type local to starhouse-io.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("source configuration error: {0}")]
    Config(String),

    #[error("source storage error: {0}")]
    Storage(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid JSONPaths: {0}")]
    JsonPaths(String),
}

impl Error {
    pub(crate) fn json(path: impl Into<String>, source: serde_json::Error) -> Self {
        Error::Json {
            path: path.into(),
            source,
        }
    }
}
