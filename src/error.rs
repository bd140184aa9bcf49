use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImportError>;

/// Longest SQL excerpt carried by a statement error.
const SQL_EXCERPT_LEN: usize = 240;

/// Engine features that may be unavailable on the connected server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Upsert,
    Ignore,
    Returning,
    RecursiveImport,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Upsert => "on_duplicate_key_update",
            Capability::Ignore => "on_duplicate_key_ignore",
            Capability::Returning => "returning",
            Capability::RecursiveImport => "recursive import",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("missing column for value <{name}> at index {index}")]
    MissingColumn { name: String, index: usize },
    #[error("row {row} has {actual} values but {expected} columns were given")]
    ArityMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("record {row} does not carry the same columns as the first record (column {column})")]
    InconsistentRecord { row: usize, column: String },
    #[error("no conflict target for table {table}: it has no primary key and none was given")]
    MissingConflictTarget { table: String },
    #[error("on_duplicate_key_update for table {table} names no columns")]
    EmptyUpdateColumns { table: String },
    #[error("invalid value for column {column}: {reason}")]
    InvalidValue { column: String, reason: String },
    #[error("{capability} is not supported by {engine} {version}")]
    Unsupported {
        capability: Capability,
        engine: &'static str,
        version: String,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("statement rejected: {source} (sql: {sql})")]
    Statement {
        sql: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("unexpected result: {0}")]
    UnexpectedResult(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ImportError {
    /// Wrap an engine error together with an excerpt of the statement that caused it.
    pub fn statement(sql: &str, source: sqlx::Error) -> Self {
        ImportError::Statement {
            sql: sql_excerpt(sql),
            source,
        }
    }

    pub fn invalid_value(column: &str, reason: impl Into<String>) -> Self {
        ImportError::InvalidValue {
            column: column.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors raised before any statement reached the database.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ImportError::MissingColumn { .. }
                | ImportError::ArityMismatch { .. }
                | ImportError::InconsistentRecord { .. }
                | ImportError::MissingConflictTarget { .. }
                | ImportError::EmptyUpdateColumns { .. }
                | ImportError::InvalidValue { .. }
                | ImportError::Config(_)
        )
    }
}

fn sql_excerpt(sql: &str) -> String {
    if sql.len() <= SQL_EXCERPT_LEN {
        return sql.to_string();
    }
    let mut end = SQL_EXCERPT_LEN;
    while !sql.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &sql[..end])
}
