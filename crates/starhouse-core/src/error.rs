use thiserror::Error;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A key every record of this kind needs is absent (dotted `section.key`).
    #[error("Missing configuration key '{key}'")]
    MissingKey { key: String },

    #[error("Invalid value for '{key}' ({value}): {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Hashing error: {0}")]
    Hash(String),
}

impl Error {
    pub fn missing(key: impl Into<String>) -> Self {
        Error::MissingKey { key: key.into() }
    }

    pub fn invalid(key: impl Into<String>, value: impl ToString, reason: impl Into<String>) -> Self {
        Error::InvalidValue {
            key: key.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// True for the failures a caller should surface as a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::MissingKey { .. } | Error::InvalidValue { .. } | Error::Yaml(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Hash(e.to_string())
    }
}
