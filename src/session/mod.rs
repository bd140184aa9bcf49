//! The connection seam.
//!
//! The importer only ever needs to run a statement and read rows back, so a
//! [`Session`] is that and nothing more. Adapters over sqlx connections are
//! provided for the engines sqlx supports; anything else (SQL Server through
//! tiberius, a recording mock in tests) implements the trait directly.

mod mysql;
mod postgres;
mod sqlite;

use crate::error::Result;
use crate::value::Record;

pub use mysql::MySqlSession;
pub use postgres::PgSession;
pub use sqlite::SqliteSession;

/// What the engine reported for an executed statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Identity generated by the statement, when the engine reports one.
    /// For multi-row INSERTs this is the last row's id on SQLite and the
    /// first row's on MySQL.
    pub last_insert_id: Option<i64>,
}

#[allow(async_fn_in_trait)]
pub trait Session {
    async fn execute(&mut self, sql: &str) -> Result<ExecOutcome>;

    async fn query(&mut self, sql: &str) -> Result<Vec<Record>>;
}
