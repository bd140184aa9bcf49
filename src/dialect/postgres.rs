use crate::dialect::literal::{self, BytesStyle, LiteralStyle};
use crate::dialect::upsert::quoted_column_list;
use crate::dialect::{
    BatchStrategy, ConflictTarget, Dialect, Engine, EngineVersion, IdRetrieval, UpdateColumns,
};
use crate::error::Result;
use crate::schema::{ColumnSpec, SqlType};
use crate::value::Value;

const STYLE: LiteralStyle = LiteralStyle {
    true_literal: "TRUE",
    false_literal: "FALSE",
    backslash_escapes: false,
    national_strings: false,
    bytes: BytesStyle::ByteaEscape,
};

/// First release with `INSERT ... ON CONFLICT`.
const ON_CONFLICT_SINCE: EngineVersion = EngineVersion::new(9, 5, 0);

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    fn conflict_target_sql(&self, target: Option<&ConflictTarget>) -> String {
        match target {
            None => String::new(),
            Some(ConflictTarget::Columns(columns)) => {
                format!(" ({})", quoted_column_list(self, columns))
            }
            Some(ConflictTarget::Constraint(name)) => {
                format!(" ON CONSTRAINT {}", self.quote_ident(name))
            }
        }
    }
}

impl Dialect for PostgresDialect {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn quote_value(&self, value: &Value, column: &ColumnSpec) -> Result<String> {
        match value {
            Value::Float(v) if v.is_nan() => Ok("'NaN'".to_string()),
            Value::Float(v) if v.is_infinite() && *v > 0.0 => Ok("'Infinity'".to_string()),
            Value::Float(v) if v.is_infinite() => Ok("'-Infinity'".to_string()),
            Value::Json(json) => {
                let quoted = literal::quote_string(&json.to_string(), &STYLE);
                Ok(match column.sql_type {
                    SqlType::Json => format!("{}::json", quoted),
                    SqlType::Jsonb => format!("{}::jsonb", quoted),
                    _ => quoted,
                })
            }
            other => literal::render(other, column, &STYLE),
        }
    }

    fn next_sequence_value(&self, sequence: &str) -> Option<String> {
        Some(format!("nextval('{}')", sequence.replace('\'', "''")))
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
        let assignments = columns
            .pairs()
            .into_iter()
            .map(|(target, source)| {
                format!(
                    "{}=EXCLUDED.{}",
                    self.quote_ident(target),
                    self.quote_ident(source)
                )
            })
            .collect::<Vec<_>>()
            .join(",");
        Ok(format!(
            " ON CONFLICT{} DO UPDATE SET {}",
            self.conflict_target_sql(target),
            assignments
        ))
    }

    fn on_conflict_ignore(&self, target: Option<&ConflictTarget>) -> Option<String> {
        Some(format!(
            " ON CONFLICT{} DO NOTHING",
            self.conflict_target_sql(target)
        ))
    }

    fn returning_clause(&self, columns: &[String]) -> Option<String> {
        if columns.is_empty() {
            return None;
        }
        Some(format!(" RETURNING {}", quoted_column_list(self, columns)))
    }

    fn batch_strategy(&self, _version: &EngineVersion) -> BatchStrategy {
        BatchStrategy::Returning
    }

    fn id_retrieval(&self) -> IdRetrieval {
        IdRetrieval::Returning
    }

    fn supports_upsert(&self, version: &EngineVersion) -> bool {
        *version >= ON_CONFLICT_SINCE
    }

    fn supports_ignore(&self, version: &EngineVersion) -> bool {
        *version >= ON_CONFLICT_SINCE
    }

    fn version_query(&self) -> &'static str {
        "SHOW server_version"
    }

    fn sequence_reservation_sql(&self, sequence: &str, count: u32) -> Option<String> {
        let name = sequence.replace('\'', "''");
        Some(format!(
            "SELECT nextval('{name}') AS first_id, setval('{name}', currval('{name}') + {}) AS last_id",
            count.saturating_sub(1)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literals() {
        let dialect = PostgresDialect;
        let data = ColumnSpec::new("data", SqlType::Jsonb);
        assert_eq!(
            dialect
                .quote_value(&Value::Json(json!({"a": "it's"})), &data)
                .unwrap(),
            r#"'{"a":"it''s"}'::jsonb"#
        );
        let bytes = ColumnSpec::new("blob", SqlType::Binary);
        assert_eq!(
            dialect.quote_value(&Value::Bytes(vec![1, 2]), &bytes).unwrap(),
            r"'\x0102'::bytea"
        );
        let ratio = ColumnSpec::new("ratio", SqlType::Float);
        assert_eq!(
            dialect.quote_value(&Value::Float(f64::NAN), &ratio).unwrap(),
            "'NaN'"
        );
        assert_eq!(
            dialect.next_sequence_value("widgets_id_seq").as_deref(),
            Some("nextval('widgets_id_seq')")
        );
    }

    #[test]
    fn test_conflict_clauses() {
        let dialect = PostgresDialect;
        let update = dialect
            .on_conflict_update(
                "\"books\"",
                Some(&ConflictTarget::constraint("books_isbn_key")),
                &UpdateColumns::List(vec!["title".into()]),
            )
            .unwrap();
        assert_eq!(
            update,
            r#" ON CONFLICT ON CONSTRAINT "books_isbn_key" DO UPDATE SET "title"=EXCLUDED."title""#
        );
        assert_eq!(
            dialect.on_conflict_ignore(None).as_deref(),
            Some(" ON CONFLICT DO NOTHING")
        );
        assert_eq!(
            dialect
                .returning_clause(&["id".to_string(), "title".to_string()])
                .as_deref(),
            Some(r#" RETURNING "id","title""#)
        );
    }

    #[test]
    fn test_version_gate() {
        let dialect = PostgresDialect;
        assert!(!dialect.supports_upsert(&EngineVersion::new(9, 4, 26)));
        assert!(dialect.supports_upsert(&EngineVersion::new(9, 5, 0)));
    }
}
