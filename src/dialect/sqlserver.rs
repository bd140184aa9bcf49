use crate::dialect::literal::{self, BytesStyle, LiteralStyle};
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
    national_strings: true,
    bytes: BytesStyle::HexLiteral,
};

/// SQL Server rejects a table value constructor with more rows than this.
pub const DEFAULT_MAX_ROWS: usize = 1000;

/// SQL Server. No sqlx driver ships for it, so statements are produced for
/// a caller-supplied [`Session`](crate::session::Session).
#[derive(Debug, Clone, Copy)]
pub struct SqlServerDialect {
    max_rows: usize,
}

impl SqlServerDialect {
    pub fn new(max_rows: usize) -> Self {
        Self {
            max_rows: max_rows.clamp(1, DEFAULT_MAX_ROWS),
        }
    }
}

impl Default for SqlServerDialect {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROWS)
    }
}

impl Dialect for SqlServerDialect {
    fn engine(&self) -> Engine {
        Engine::SqlServer
    }

    fn name(&self) -> &'static str {
        "SQL Server"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn quote_value(&self, value: &Value, column: &ColumnSpec) -> Result<String> {
        literal::render(value, column, &STYLE)
    }

    fn next_sequence_value(&self, sequence: &str) -> Option<String> {
        Some(format!("NEXT VALUE FOR {}", self.quote_table(sequence)))
    }

    fn on_conflict_update(
        &self,
        _quoted_table: &str,
        _target: Option<&ConflictTarget>,
        _columns: &UpdateColumns,
    ) -> Result<String> {
        Err(ImportError::Config(
            "SQL Server has no conflict clause for INSERT".to_string(),
        ))
    }

    fn batch_strategy(&self, _version: &EngineVersion) -> BatchStrategy {
        BatchStrategy::Capped {
            max_rows: self.max_rows,
        }
    }

    fn id_retrieval(&self) -> IdRetrieval {
        IdRetrieval::None
    }

    fn supports_upsert(&self, _version: &EngineVersion) -> bool {
        false
    }

    fn supports_ignore(&self, _version: &EngineVersion) -> bool {
        false
    }

    fn version_query(&self) -> &'static str {
        "SELECT CAST(SERVERPROPERTY('ProductVersion') AS nvarchar(128)) AS version"
    }
}
