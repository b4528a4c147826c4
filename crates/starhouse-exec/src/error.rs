use thiserror::Error;

use starhouse_pipeline::{Dialect, Phase};

pub type Result<T> = std::result::Result<T, ExecError>;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "redshift")]
    #[error("postgres: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("source: {0}")]
    Source(#[from] starhouse_io::Error),

    #[error(transparent)]
    Pipeline(#[from] starhouse_pipeline::Error),

    #[error("catalog rendered for {catalog} but executor speaks {executor}")]
    DialectMismatch { catalog: Dialect, executor: Dialect },

    #[error("invalid identifier '{0}'")]
    Identifier(String),

    #[error("{phase} phase failed on table '{table}': {source}")]
    Statement {
        phase: Phase,
        table: String,
        #[source]
        source: Box<ExecError>,
    },
}

impl ExecError {
    pub(crate) fn at(phase: Phase, table: &str, source: ExecError) -> Self {
        ExecError::Statement {
            phase,
            table: table.to_string(),
            source: Box::new(source),
        }
    }

    /// The innermost error, past any phase/table wrapping.
    pub fn root(&self) -> &ExecError {
        match self {
            ExecError::Statement { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_errors_name_phase_and_table() {
        let err = ExecError::at(Phase::Insert, "songplays", ExecError::Identifier("x y".into()));
        assert_eq!(
            err.to_string(),
            "insert phase failed on table 'songplays': invalid identifier 'x y'"
        );
        assert!(matches!(err.root(), ExecError::Identifier(_)));
    }
}
