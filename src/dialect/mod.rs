//! Per-engine SQL generation and batching capabilities.
//!
//! Each supported engine is one type implementing [`Dialect`]. A dialect
//! never talks to the database itself: it describes literal syntax, the
//! conflict clauses it understands and which [`BatchStrategy`] governs its
//! statements. [`execute::insert_many`] runs a batch against a
//! [`Session`](crate::session::Session) following that strategy.
//!
//! | engine     | batching              | ids                  |
//! |------------|-----------------------|----------------------|
//! | MySQL      | `max_allowed_packet`  | none                 |
//! | PostgreSQL | one statement / batch | `RETURNING`          |
//! | SQLite     | compound-select limit | contiguous rowids    |
//! | SQL Server | 1000 rows, identity split | none             |

pub mod execute;
pub mod literal;
pub mod mysql;
pub mod postgres;
pub mod sqlite;
pub mod sqlserver;
pub mod upsert;

use crate::config::ImportConfig;
use crate::error::Result;
use crate::schema::ColumnSpec;
use crate::value::Value;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
pub use sqlserver::SqlServerDialect;
pub use upsert::{ConflictTarget, DuplicateKeyIgnore, OnDuplicateKeyUpdate, UpdateColumns};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    MySql,
    Postgres,
    Sqlite,
    SqlServer,
}

impl Engine {
    /// Build the dialect for this engine, honouring the configured limits.
    pub fn dialect(self, config: &ImportConfig) -> Box<dyn Dialect> {
        match self {
            Engine::MySql => Box::new(MySqlDialect::new(config.mysql_query_overhead)),
            Engine::Postgres => Box::new(PostgresDialect),
            Engine::Sqlite => Box::new(SqliteDialect::new(config.sqlite_max_rows)),
            Engine::SqlServer => Box::new(SqlServerDialect::new(config.sqlserver_max_rows)),
        }
    }
}

/// Server version as reported by the engine, reduced to `major.minor.patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EngineVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl EngineVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the first dotted version number found in `raw`, e.g.
    /// `"8.0.36-0ubuntu0.22.04.1"` or `"16.2 (Debian 16.2-1.pgdg120+2)"`.
    pub fn parse(raw: &str) -> Option<Self> {
        static VERSION_RE: OnceLock<Regex> = OnceLock::new();
        let re = VERSION_RE.get_or_init(|| {
            Regex::new(r"(\d+)(?:\.(\d+))?(?:\.(\d+))?").expect("static version pattern")
        });

        let caps = re.captures(raw)?;
        let part = |i: usize| {
            caps.get(i)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .unwrap_or(0)
        };
        Some(Self::new(part(1), part(2), part(3)))
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Constraint that decides how rows are split across statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStrategy {
    /// Statement size is bounded by the server's `max_allowed_packet`.
    ByteBudget { query_overhead: usize },
    /// Fixed maximum number of rows per statement.
    RowCount { max_rows: usize },
    /// No engine limit; ids come back through `RETURNING`.
    Returning,
    /// Fixed maximum rows per statement, and rows with a null identity value
    /// are sent without the identity column.
    Capped { max_rows: usize },
}

/// How generated primary keys are recovered after an INSERT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdRetrieval {
    None,
    Returning,
    /// Derived from the last inserted id and the affected row count.
    ContiguousRange,
}

/// The pieces of an `INSERT ... VALUES` statement surrounding the value tuples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    /// `INSERT INTO t (a,b) VALUES `
    pub prologue: String,
    /// Prologue with the identity column left out, for engines that reject a
    /// NULL identity literal.
    pub prologue_without_identity: Option<String>,
    /// Conflict clause and `RETURNING` clause, possibly empty.
    pub epilogue: String,
}

impl InsertStatement {
    pub fn sql<T: AsRef<str>>(&self, rows: &[T]) -> String {
        Self::assemble(&self.prologue, rows, &self.epilogue)
    }

    pub(crate) fn assemble<T: AsRef<str>>(prologue: &str, rows: &[T], epilogue: &str) -> String {
        let values_len: usize = rows.iter().map(|r| r.as_ref().len() + 1).sum();
        let mut sql = String::with_capacity(prologue.len() + values_len + epilogue.len());
        sql.push_str(prologue);
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                sql.push(',');
            }
            sql.push_str(row.as_ref());
        }
        sql.push_str(epilogue);
        sql
    }
}

pub trait Dialect: Send + Sync + fmt::Debug {
    fn engine(&self) -> Engine;

    fn name(&self) -> &'static str;

    fn quote_ident(&self, name: &str) -> String;

    /// Quote a possibly schema-qualified table name.
    fn quote_table(&self, name: &str) -> String {
        name.split('.')
            .map(|part| self.quote_ident(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Render an already type-cast value as a literal for `column`.
    fn quote_value(&self, value: &Value, column: &ColumnSpec) -> Result<String>;

    /// Expression drawing the next value of `sequence`, if the engine has sequences.
    fn next_sequence_value(&self, sequence: &str) -> Option<String>;

    /// Leading keyword, e.g. `INSERT IGNORE INTO` when ignore is expressed there.
    fn insert_keyword(&self, _ignore: bool) -> &'static str {
        "INSERT INTO"
    }

    /// True when duplicate rows are skipped through [`Dialect::insert_keyword`]
    /// rather than a trailing clause.
    fn ignore_via_keyword(&self) -> bool {
        false
    }

    /// Whether the update form of the conflict clause must name a target.
    fn requires_update_target(&self) -> bool {
        false
    }

    fn on_conflict_update(
        &self,
        quoted_table: &str,
        target: Option<&ConflictTarget>,
        columns: &UpdateColumns,
    ) -> Result<String>;

    fn on_conflict_ignore(&self, _target: Option<&ConflictTarget>) -> Option<String> {
        None
    }

    fn returning_clause(&self, _columns: &[String]) -> Option<String> {
        None
    }

    fn batch_strategy(&self, version: &EngineVersion) -> BatchStrategy;

    fn id_retrieval(&self) -> IdRetrieval;

    fn supports_upsert(&self, version: &EngineVersion) -> bool;

    fn supports_ignore(&self, version: &EngineVersion) -> bool;

    /// Wrap multi-statement imports in a savepoint.
    fn wraps_in_savepoint(&self) -> bool {
        false
    }

    /// Query returning one row whose first column is the server version.
    fn version_query(&self) -> &'static str;

    /// Query returning one row whose first column is the packet size limit.
    fn max_packet_query(&self) -> Option<&'static str> {
        None
    }

    /// Query reserving `count` consecutive sequence values; its first column
    /// is the first reserved value.
    fn sequence_reservation_sql(&self, _sequence: &str, _count: u32) -> Option<String> {
        None
    }
}
