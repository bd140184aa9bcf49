//! Multi-row INSERT bulk imports for PostgreSQL, MySQL, SQLite and SQL Server.
//!
//! An [`Importer`] takes rows as positional values, column-keyed records or
//! [`Model`]s, validates them, renders them as SQL literals and sends them
//! in as few statements as the engine allows. Conflict handling, generated
//! id retrieval, synchronization and recursive child imports are layered on
//! top through [`ImportOptions`].

pub mod config;
pub mod dialect;
pub mod error;
pub mod import;
pub mod model;
pub mod partition;
pub mod render;
pub mod schema;
pub mod session;
pub mod value;

pub use config::{CapabilityPolicy, ImportConfig, TimestampZone};
pub use dialect::{
    ConflictTarget, Dialect, DuplicateKeyIgnore, Engine, EngineVersion, OnDuplicateKeyUpdate,
    UpdateColumns,
};
pub use error::{Capability, ImportError, Result};
pub use import::{
    ChildImport, EngineLimits, FailedRecord, ImportOptions, ImportRequest, ImportResult, Importer,
    Rows, Synchronize, ValidationRule, model_refs,
};
pub use model::{AssociatedRecords, Association, DynamicModel, Model};
pub use schema::{ColumnSpec, JsonCoder, KeyStrategy, SqlType, TableSchema};
pub use session::{ExecOutcome, MySqlSession, PgSession, Session, SqliteSession};
pub use value::{Record, Value};

use env_logger::Env;
use std::sync::Once;

static LOGGER: Once = Once::new();

/// Install an `env_logger` honouring `RUST_LOG`, defaulting to `info`.
///
/// Safe to call repeatedly; does nothing when another logger is installed.
pub fn init_logger() {
    LOGGER.call_once(|| {
        let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info"))
            .is_test(cfg!(test))
            .try_init();
    });
}

pub mod test_support {
    use crate::error::{ImportError, Result};
    use crate::session::{ExecOutcome, Session};
    use crate::value::{Record, Value};

    pub use database::{TestDatabase, TestDatabaseError};

    /// A [`Session`] that records statements instead of running them.
    ///
    /// INSERTs report one affected row per value tuple and SQLite-style
    /// `last_insert_id`s; INSERTs issued through `query` answer their
    /// `RETURNING` clause with sequential ids. Version and packet-size
    /// lookups are answered from the configured values.
    #[derive(Debug, Clone)]
    pub struct RecordingSession {
        pub statements: Vec<String>,
        pub version: String,
        pub max_allowed_packet: u64,
        pub select_rows: Vec<Record>,
        fail_on: Option<String>,
        next_id: i64,
    }

    impl RecordingSession {
        pub fn new(version: &str) -> Self {
            Self {
                statements: Vec::new(),
                version: version.to_string(),
                max_allowed_packet: 0,
                select_rows: Vec::new(),
                fail_on: None,
                next_id: 1,
            }
        }

        pub fn with_max_allowed_packet(mut self, bytes: u64) -> Self {
            self.max_allowed_packet = bytes;
            self
        }

        /// Rows answered to SELECT statements.
        pub fn with_select_rows(mut self, rows: Vec<Record>) -> Self {
            self.select_rows = rows;
            self
        }

        /// Fail any statement containing `needle`.
        pub fn failing_on(mut self, needle: &str) -> Self {
            self.fail_on = Some(needle.to_string());
            self
        }

        pub fn inserts(&self) -> Vec<&str> {
            self.statements
                .iter()
                .map(String::as_str)
                .filter(|sql| sql.starts_with("INSERT"))
                .collect()
        }

        fn record(&mut self, sql: &str) -> Result<()> {
            self.statements.push(sql.to_string());
            match &self.fail_on {
                Some(needle) if sql.contains(needle.as_str()) => Err(ImportError::statement(
                    sql,
                    sqlx::Error::Protocol(format!("duplicate entry matching {}", needle)),
                )),
                _ => Ok(()),
            }
        }

        fn allocate_ids(&mut self, count: usize) -> std::ops::RangeInclusive<i64> {
            let first = self.next_id;
            self.next_id += count as i64;
            first..=(self.next_id - 1)
        }
    }

    /// Number of `( ... )` tuples after the first ` VALUES `, ignoring
    /// parentheses inside quoted literals.
    pub fn count_value_tuples(sql: &str) -> usize {
        let Some(start) = sql.find(" VALUES ") else {
            return 0;
        };
        let mut tuples = 0;
        let mut depth = 0usize;
        let mut in_quote = false;
        for ch in sql[start + " VALUES ".len()..].chars() {
            match ch {
                '\'' => in_quote = !in_quote,
                _ if in_quote => {}
                '(' => {
                    if depth == 0 {
                        tuples += 1;
                    }
                    depth += 1;
                }
                ')' => depth = depth.saturating_sub(1),
                c if depth == 0 && c.is_ascii_alphabetic() => break,
                _ => {}
            }
        }
        tuples
    }

    fn returning_columns(sql: &str) -> Vec<String> {
        match sql.rfind(" RETURNING ") {
            Some(at) => sql[at + " RETURNING ".len()..]
                .split(',')
                .map(|c| c.trim().trim_matches('"').to_string())
                .collect(),
            None => Vec::new(),
        }
    }

    impl Session for RecordingSession {
        async fn execute(&mut self, sql: &str) -> Result<ExecOutcome> {
            self.record(sql)?;
            if !sql.starts_with("INSERT") {
                return Ok(ExecOutcome::default());
            }
            let rows = count_value_tuples(sql);
            let ids = self.allocate_ids(rows);
            Ok(ExecOutcome {
                rows_affected: rows as u64,
                last_insert_id: (rows > 0).then(|| *ids.end()),
            })
        }

        async fn query(&mut self, sql: &str) -> Result<Vec<Record>> {
            self.record(sql)?;
            let lower = sql.to_ascii_lowercase();
            if sql.starts_with("INSERT") {
                let columns = returning_columns(sql);
                let ids = self.allocate_ids(count_value_tuples(sql));
                return Ok(ids
                    .map(|id| {
                        columns
                            .iter()
                            .map(|column| {
                                let value = if column == "id" {
                                    Value::Int(id)
                                } else {
                                    Value::Text(format!("{}-{}", column, id))
                                };
                                (column.clone(), value)
                            })
                            .collect()
                    })
                    .collect());
            }
            if lower.contains("max_allowed_packet") {
                let limit = i64::try_from(self.max_allowed_packet).unwrap_or(i64::MAX);
                return Ok(vec![Record::new().with("max_allowed_packet", limit)]);
            }
            if lower.contains("version") {
                return Ok(vec![Record::new().with("version", self.version.as_str())]);
            }
            Ok(self.select_rows.clone())
        }
    }

    pub mod database {
        use log::LevelFilter;
        use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
        use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use sqlx::{ConnectOptions, MySqlPool, PgPool};
        use testcontainers_modules::mysql::Mysql;
        use testcontainers_modules::postgres::Postgres;
        use testcontainers::{
            ContainerAsync, Image, core::error::TestcontainersError, runners::AsyncRunner,
        };
        use thiserror::Error;

        static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

        /// Set to run tests against disposable database containers.
        pub const CONTAINER_TESTS_ENV: &str = "BULK_IMPORT_CONTAINER_TESTS";

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("BULK_IMPORT_CONTAINER_TESTS not set")]
            Disabled,
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        fn containers_enabled() -> bool {
            std::env::var(CONTAINER_TESTS_ENV)
                .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false)
        }

        /// A disposable database server with a connected pool.
        pub struct TestDatabase<P, I: Image> {
            pool: P,
            _container: ContainerAsync<I>,
        }

        impl<P, I: Image> TestDatabase<P, I> {
            pub fn pool(&self) -> &P {
                &self.pool
            }
        }

        impl TestDatabase<PgPool, Postgres> {
            /// Start PostgreSQL and apply the fixture migrations.
            pub async fn postgres() -> Result<Self, TestDatabaseError> {
                if !containers_enabled() {
                    return Err(TestDatabaseError::Disabled);
                }
                let container = Postgres::default().start().await?;
                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

                let options: PgConnectOptions = url.parse()?;
                let pool = PgPoolOptions::new()
                    .max_connections(2)
                    .connect_with(options.log_statements(LevelFilter::Off))
                    .await?;
                MIGRATOR.run(&pool).await?;

                Ok(Self {
                    pool,
                    _container: container,
                })
            }
        }

        impl TestDatabase<MySqlPool, Mysql> {
            /// Start MySQL with an empty `test` database.
            pub async fn mysql() -> Result<Self, TestDatabaseError> {
                if !containers_enabled() {
                    return Err(TestDatabaseError::Disabled);
                }
                let container = Mysql::default().start().await?;
                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(3306).await?;
                let url = format!("mysql://root@{}:{}/test", host, port);

                let options: MySqlConnectOptions = url.parse()?;
                let pool = MySqlPoolOptions::new()
                    .max_connections(2)
                    .connect_with(options.log_statements(LevelFilter::Off))
                    .await?;

                Ok(Self {
                    pool,
                    _container: container,
                })
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_count_value_tuples_ignores_quoted_parens() {
            let sql = "INSERT INTO t (a,b) VALUES (1,'(x)'),(nextval('s'),'it''s (') \
                       ON CONFLICT (a) DO NOTHING";
            assert_eq!(count_value_tuples(sql), 2);
            assert_eq!(count_value_tuples("SELECT 1"), 0);
        }

        #[test]
        fn test_returning_columns_parsed() {
            assert_eq!(
                returning_columns(r#"INSERT INTO t (a) VALUES (1) RETURNING "id","title""#),
                vec!["id", "title"]
            );
        }
    }
}
