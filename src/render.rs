//! Turning normalized rows into SQL value tuples.
//!
//! Before rendering, the importer widens the column list with injected
//! columns (primary key drawn from a sequence, timestamps, scope). Each
//! injection appends to the column list and to every row in lockstep, so a
//! row and its column list never drift apart.

use crate::dialect::{Dialect, UpdateColumns};
use crate::error::{ImportError, Result};
use crate::schema::{
    CREATE_TIMESTAMP_COLUMNS, ColumnSpec, KeyStrategy, TableSchema, UPDATE_TIMESTAMP_COLUMNS,
};
use crate::value::Value;

/// One rendered `( ... )` tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRow {
    pub sql: String,
    /// The same tuple without the identity column, present only when the
    /// identity value is null and the dialect needs the column omitted.
    pub without_identity: Option<String>,
}

impl AsRef<str> for RenderedRow {
    fn as_ref(&self) -> &str {
        &self.sql
    }
}

pub struct RowRenderer<'a> {
    dialect: &'a dyn Dialect,
    columns: Vec<&'a ColumnSpec>,
    primary_key: &'a [String],
    sequence: Option<&'a str>,
    identity_index: Option<usize>,
}

impl<'a> RowRenderer<'a> {
    /// Resolve `column_names` against `schema`.
    ///
    /// With `split_identity`, rows whose auto-increment key is null also get
    /// a rendering without that column.
    pub fn new(
        dialect: &'a dyn Dialect,
        schema: &'a TableSchema,
        column_names: &[String],
        primary_key: &'a [String],
        split_identity: bool,
    ) -> Result<Self> {
        let columns = column_names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                schema
                    .find_column(name)
                    .ok_or_else(|| ImportError::MissingColumn {
                        name: name.clone(),
                        index,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let identity_index = match (&schema.key_strategy, primary_key) {
            (KeyStrategy::AutoIncrement, [pk]) if split_identity => {
                column_names.iter().position(|name| name == pk)
            }
            _ => None,
        };

        Ok(Self {
            dialect,
            columns,
            primary_key,
            sequence: schema.sequence_name(),
            identity_index,
        })
    }

    pub fn columns(&self) -> &[&'a ColumnSpec] {
        &self.columns
    }

    /// Position of the identity column when rows may be split around it.
    pub fn identity_index(&self) -> Option<usize> {
        self.identity_index
    }

    pub fn render(&self, row: &[Value]) -> Result<RenderedRow> {
        debug_assert_eq!(row.len(), self.columns.len());
        let literals = self
            .columns
            .iter()
            .zip(row)
            .map(|(column, value)| self.render_value(column, value))
            .collect::<Result<Vec<_>>>()?;

        let without_identity = self
            .identity_index
            .filter(|&index| row[index].is_null())
            .map(|index| {
                let rest: Vec<&str> = literals
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != index)
                    .map(|(_, literal)| literal.as_str())
                    .collect();
                format!("({})", rest.join(","))
            });

        Ok(RenderedRow {
            sql: format!("({})", literals.join(",")),
            without_identity,
        })
    }

    fn render_value(&self, column: &ColumnSpec, value: &Value) -> Result<String> {
        if value.is_null() && self.primary_key.contains(&column.name) {
            if let Some(sequence) = self.sequence {
                return self.dialect.next_sequence_value(sequence).ok_or_else(|| {
                    ImportError::Config(format!(
                        "{} has no sequences, cannot draw {} from {}",
                        self.dialect.name(),
                        column.name,
                        sequence
                    ))
                });
            }
        }
        let value = match &column.coder {
            Some(coder) => coder.dump(value)?,
            None => column.cast(value)?,
        };
        self.dialect.quote_value(&value, column)
    }
}

/// Add the primary key column when the table draws it from a sequence and
/// the caller did not list it. Rows get NULL, which renders as the
/// sequence expression.
pub fn inject_primary_key(
    schema: &TableSchema,
    primary_key: &[String],
    columns: &mut Vec<String>,
    rows: &mut [Vec<Value>],
) {
    if schema.sequence_name().is_none() {
        return;
    }
    for pk in primary_key {
        if !columns.contains(pk) {
            columns.push(pk.clone());
            for row in rows.iter_mut() {
                row.push(Value::Null);
            }
        }
    }
}

/// Stamp create and update timestamp columns the schema defines.
///
/// Null values are filled and missing columns appended; caller-supplied
/// values are kept. Update timestamps join an active update column list.
pub fn inject_timestamps(
    schema: &TableSchema,
    columns: &mut Vec<String>,
    rows: &mut [Vec<Value>],
    now: &Value,
    update: Option<&mut UpdateColumns>,
) {
    let stamped: Vec<&str> = CREATE_TIMESTAMP_COLUMNS
        .iter()
        .chain(UPDATE_TIMESTAMP_COLUMNS.iter())
        .copied()
        .filter(|name| schema.has_column(name))
        .collect();

    for name in &stamped {
        match columns.iter().position(|c| c == name) {
            Some(index) => {
                for row in rows.iter_mut() {
                    if row[index].is_null() {
                        row[index] = now.clone();
                    }
                }
            }
            None => {
                columns.push(name.to_string());
                for row in rows.iter_mut() {
                    row.push(now.clone());
                }
            }
        }
    }

    if let Some(update) = update {
        for name in stamped
            .iter()
            .filter(|name| UPDATE_TIMESTAMP_COLUMNS.contains(name))
        {
            update.add(name);
        }
    }
}

/// Append scope columns with their scoped values. Columns the caller
/// already supplies keep the caller's values.
pub fn inject_scope(scope: &[(String, Value)], columns: &mut Vec<String>, rows: &mut [Vec<Value>]) {
    for (name, value) in scope {
        if columns.contains(name) {
            continue;
        }
        columns.push(name.clone());
        for row in rows.iter_mut() {
            row.push(value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqlServerDialect};
    use crate::schema::{JsonCoder, SqlType};
    use serde_json::json;

    fn topics() -> TableSchema {
        TableSchema::new("topics")
            .column(ColumnSpec::new("id", SqlType::Integer))
            .column(ColumnSpec::new("title", SqlType::String))
            .column(ColumnSpec::new("settings", SqlType::Text).serialized(JsonCoder))
            .column(ColumnSpec::new("created_at", SqlType::DateTime))
            .column(ColumnSpec::new("updated_at", SqlType::DateTime))
    }

    fn names(columns: &[&str]) -> Vec<String> {
        columns.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_unknown_column_is_reported_with_position() {
        let schema = topics();
        let pk = names(&["id"]);
        let err = RowRenderer::new(
            &PostgresDialect,
            &schema,
            &names(&["title", "bogus"]),
            &pk,
            false,
        )
        .err()
        .unwrap();
        assert_eq!(err.to_string(), "missing column for value <bogus> at index 1");
    }

    #[test]
    fn test_render_applies_coder_and_quoting() {
        let schema = topics();
        let pk = names(&["id"]);
        let columns = names(&["title", "settings"]);
        let renderer = RowRenderer::new(&PostgresDialect, &schema, &columns, &pk, false).unwrap();
        let row = renderer
            .render(&[Value::from("It's"), Value::Json(json!({"a": 1}))])
            .unwrap();
        assert_eq!(row.sql, r#"('It''s','{"a":1}')"#);
        assert!(row.without_identity.is_none());
    }

    #[test]
    fn test_sequence_expression_for_null_key() {
        let schema = TableSchema::new("widgets")
            .sequence("widget_seq")
            .column(ColumnSpec::new("id", SqlType::Integer))
            .column(ColumnSpec::new("w_id", SqlType::Integer));
        let pk = names(&["id"]);
        let mut columns = names(&["w_id"]);
        let mut rows = vec![vec![Value::Int(1)]];
        inject_primary_key(&schema, &pk, &mut columns, &mut rows);
        assert_eq!(columns, names(&["w_id", "id"]));

        let renderer = RowRenderer::new(&PostgresDialect, &schema, &columns, &pk, false).unwrap();
        assert_eq!(
            renderer.render(&rows[0]).unwrap().sql,
            "(1,nextval('widget_seq'))"
        );
    }

    #[test]
    fn test_identity_split_for_null_keys() {
        let schema = topics();
        let pk = names(&["id"]);
        let columns = names(&["id", "title"]);
        let dialect = SqlServerDialect::default();
        let renderer = RowRenderer::new(&dialect, &schema, &columns, &pk, true).unwrap();

        let generated = renderer.render(&[Value::Null, "a".into()]).unwrap();
        assert_eq!(generated.sql, "(NULL,N'a')");
        assert_eq!(generated.without_identity.as_deref(), Some("(N'a')"));

        let supplied = renderer.render(&[Value::Int(7), "b".into()]).unwrap();
        assert!(supplied.without_identity.is_none());
    }

    #[test]
    fn test_timestamps_fill_without_overwriting() {
        let schema = topics();
        let mut columns = names(&["title", "created_at"]);
        let kept = Value::from("2001-01-01 00:00:00");
        let mut rows = vec![
            vec![Value::from("a"), kept.clone()],
            vec![Value::from("b"), Value::Null],
        ];
        let now = Value::from("2024-05-01 12:00:00");
        let mut update = UpdateColumns::List(names(&["title"]));

        inject_timestamps(&schema, &mut columns, &mut rows, &now, Some(&mut update));

        assert_eq!(columns, names(&["title", "created_at", "updated_at"]));
        assert_eq!(rows[0][1], kept);
        assert_eq!(rows[1][1], now);
        assert_eq!(rows[0][2], now);
        assert!(update.contains("updated_at"));
        assert!(!update.contains("created_at"));
    }

    #[test]
    fn test_scope_appends_and_keeps_supplied_columns() {
        let mut columns = names(&["title", "group_id"]);
        let mut rows = vec![vec![Value::from("a"), Value::Int(1)]];
        let scope = vec![
            ("group_id".to_string(), Value::Int(9)),
            ("tenant".to_string(), Value::from("acme")),
        ];
        inject_scope(&scope, &mut columns, &mut rows);
        assert_eq!(columns, names(&["title", "group_id", "tenant"]));
        assert_eq!(rows[0], vec![Value::from("a"), Value::Int(1), Value::from("acme")]);
    }
}
