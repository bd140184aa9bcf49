use crate::dialect::literal::{self, BytesStyle, LiteralStyle};
use crate::dialect::{
    BatchStrategy, ConflictTarget, Dialect, Engine, EngineVersion, IdRetrieval, UpdateColumns,
};
use crate::error::Result;
use crate::schema::ColumnSpec;
use crate::value::Value;

const STYLE: LiteralStyle = LiteralStyle {
    true_literal: "1",
    false_literal: "0",
    backslash_escapes: true,
    national_strings: false,
    bytes: BytesStyle::HexString,
};

pub const DEFAULT_QUERY_OVERHEAD: usize = 8;

/// MySQL and MariaDB.
#[derive(Debug, Clone, Copy)]
pub struct MySqlDialect {
    query_overhead: usize,
}

impl MySqlDialect {
    pub fn new(query_overhead: usize) -> Self {
        Self { query_overhead }
    }
}

impl Default for MySqlDialect {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_OVERHEAD)
    }
}

impl Dialect for MySqlDialect {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn quote_value(&self, value: &Value, column: &ColumnSpec) -> Result<String> {
        literal::render(value, column, &STYLE)
    }

    fn next_sequence_value(&self, _sequence: &str) -> Option<String> {
        None
    }

    fn insert_keyword(&self, ignore: bool) -> &'static str {
        if ignore {
            "INSERT IGNORE INTO"
        } else {
            "INSERT INTO"
        }
    }

    fn ignore_via_keyword(&self) -> bool {
        true
    }

    fn on_conflict_update(
        &self,
        quoted_table: &str,
        _target: Option<&ConflictTarget>,
        columns: &UpdateColumns,
    ) -> Result<String> {
        let assignments = columns
            .pairs()
            .into_iter()
            .map(|(target, source)| {
                format!(
                    "{}.{}=VALUES({})",
                    quoted_table,
                    self.quote_ident(target),
                    self.quote_ident(source)
                )
            })
            .collect::<Vec<_>>()
            .join(",");
        Ok(format!(" ON DUPLICATE KEY UPDATE {}", assignments))
    }

    fn batch_strategy(&self, _version: &EngineVersion) -> BatchStrategy {
        BatchStrategy::ByteBudget {
            query_overhead: self.query_overhead,
        }
    }

    fn id_retrieval(&self) -> IdRetrieval {
        IdRetrieval::None
    }

    fn supports_upsert(&self, _version: &EngineVersion) -> bool {
        true
    }

    fn supports_ignore(&self, _version: &EngineVersion) -> bool {
        true
    }

    fn version_query(&self) -> &'static str {
        "SELECT VERSION() AS version"
    }

    fn max_packet_query(&self) -> Option<&'static str> {
        Some("SELECT @@max_allowed_packet AS max_allowed_packet")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SqlType;

    #[test]
    fn test_literals() {
        let dialect = MySqlDialect::default();
        let text = ColumnSpec::new("title", SqlType::String);
        assert_eq!(
            dialect.quote_value(&Value::Text(r"it's a\b".into()), &text).unwrap(),
            r"'it''s a\\b'"
        );
        assert_eq!(dialect.quote_value(&Value::Bool(true), &text).unwrap(), "1");
        assert_eq!(dialect.quote_ident("order"), "`order`");
        assert_eq!(dialect.quote_table("shop.orders"), "`shop`.`orders`");
    }

    #[test]
    fn test_duplicate_key_update_clause() {
        let dialect = MySqlDialect::default();
        let clause = dialect
            .on_conflict_update(
                "`topics`",
                None,
                &UpdateColumns::Map(vec![("title".into(), "author_name".into())]),
            )
            .unwrap();
        assert_eq!(
            clause,
            " ON DUPLICATE KEY UPDATE `topics`.`title`=VALUES(`author_name`)"
        );
    }
}
