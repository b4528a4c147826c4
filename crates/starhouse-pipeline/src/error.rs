use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown SQL dialect '{0}' (expected 'redshift' or 'sqlite')")]
    UnknownDialect(String),

    #[error("unknown pipeline phase '{0}'")]
    UnknownPhase(String),

    #[error("invalid pipeline settings: {0}")]
    Settings(String),
}
