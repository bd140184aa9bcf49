use crate::dialect::literal::{self, BytesStyle, LiteralStyle};
use crate::dialect::upsert::quoted_column_list;
use crate::dialect::{
    BatchStrategy, ConflictTarget, Dialect, Engine, EngineVersion, IdRetrieval, UpdateColumns,
};
use crate::error::{ImportError, Result};
use crate::schema::ColumnSpec;
use crate::value::Value;

const STYLE: LiteralStyle = LiteralStyle {
    true_literal: "1",
    false_literal: "0",
    backslash_escapes: false,
    national_strings: false,
    bytes: BytesStyle::HexString,
};

pub const DEFAULT_MAX_ROWS: usize = 500;

/// Multi-row VALUES lists arrived in 3.7.11.
const MULTI_ROW_SINCE: EngineVersion = EngineVersion::new(3, 7, 11);
/// `ON CONFLICT ... DO UPDATE` arrived in 3.24.0.
const UPSERT_SINCE: EngineVersion = EngineVersion::new(3, 24, 0);

#[derive(Debug, Clone, Copy)]
pub struct SqliteDialect {
    max_rows: usize,
}

impl SqliteDialect {
    pub fn new(max_rows: usize) -> Self {
        Self { max_rows }
    }
}

impl Default for SqliteDialect {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROWS)
    }
}

impl Dialect for SqliteDialect {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn name(&self) -> &'static str {
        "SQLite"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn quote_value(&self, value: &Value, column: &ColumnSpec) -> Result<String> {
        literal::render(value, column, &STYLE)
    }

    fn next_sequence_value(&self, _sequence: &str) -> Option<String> {
        None
    }

    fn insert_keyword(&self, ignore: bool) -> &'static str {
        if ignore {
            "INSERT OR IGNORE INTO"
        } else {
            "INSERT INTO"
        }
    }

    fn ignore_via_keyword(&self) -> bool {
        true
    }

    fn requires_update_target(&self) -> bool {
        true
    }

    fn on_conflict_update(
        &self,
        _quoted_table: &str,
        target: Option<&ConflictTarget>,
        columns: &UpdateColumns,
    ) -> Result<String> {
        let target = match target {
            Some(ConflictTarget::Columns(columns)) => quoted_column_list(self, columns),
            Some(ConflictTarget::Constraint(name)) => {
                return Err(ImportError::Config(format!(
                    "SQLite cannot target constraint {} by name, list its columns instead",
                    name
                )));
            }
            None => {
                return Err(ImportError::Config(
                    "SQLite upserts need a conflict target".to_string(),
                ));
            }
        };
        let assignments = columns
            .pairs()
            .into_iter()
            .map(|(target, source)| {
                format!(
                    "{}=excluded.{}",
                    self.quote_ident(target),
                    self.quote_ident(source)
                )
            })
            .collect::<Vec<_>>()
            .join(",");
        Ok(format!(
            " ON CONFLICT({}) DO UPDATE SET {}",
            target, assignments
        ))
    }

    fn batch_strategy(&self, version: &EngineVersion) -> BatchStrategy {
        let max_rows = if *version < MULTI_ROW_SINCE {
            1
        } else {
            self.max_rows
        };
        BatchStrategy::RowCount { max_rows }
    }

    fn id_retrieval(&self) -> IdRetrieval {
        IdRetrieval::ContiguousRange
    }

    fn supports_upsert(&self, version: &EngineVersion) -> bool {
        *version >= UPSERT_SINCE
    }

    fn supports_ignore(&self, _version: &EngineVersion) -> bool {
        true
    }

    fn wraps_in_savepoint(&self) -> bool {
        true
    }

    fn version_query(&self) -> &'static str {
        "SELECT sqlite_version() AS version"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_limit_depends_on_version() {
        let dialect = SqliteDialect::default();
        assert_eq!(
            dialect.batch_strategy(&EngineVersion::new(3, 7, 10)),
            BatchStrategy::RowCount { max_rows: 1 }
        );
        assert_eq!(
            dialect.batch_strategy(&EngineVersion::new(3, 45, 0)),
            BatchStrategy::RowCount { max_rows: 500 }
        );
    }

    #[test]
    fn test_upsert_clause() {
        let dialect = SqliteDialect::default();
        let clause = dialect
            .on_conflict_update(
                "\"topics\"",
                Some(&ConflictTarget::columns(["id"])),
                &UpdateColumns::List(vec!["title".into(), "updated_at".into()]),
            )
            .unwrap();
        assert_eq!(
            clause,
            r#" ON CONFLICT("id") DO UPDATE SET "title"=excluded."title","updated_at"=excluded."updated_at""#
        );
        assert!(dialect
            .on_conflict_update(
                "\"topics\"",
                Some(&ConflictTarget::constraint("topics_pkey")),
                &UpdateColumns::List(vec!["title".into()]),
            )
            .is_err());
    }
}
