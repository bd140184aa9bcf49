//! Reducing every input shape to a column list plus aligned value rows.

use crate::error::{ImportError, Result};
use crate::import::request::Rows;
use crate::model::Model;
use crate::schema::{KeyStrategy, TableSchema};
use crate::value::Value;

pub(crate) struct Normalized<'a> {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// The input models, index-aligned with `rows`, for model input.
    pub models: Option<Vec<&'a mut dyn Model>>,
}

pub(crate) fn normalize<'a>(
    schema: &TableSchema,
    columns: Option<Vec<String>>,
    rows: Rows<'a>,
    primary_key: &[String],
) -> Result<Normalized<'a>> {
    match rows {
        Rows::Values(rows) => {
            let columns = columns.ok_or_else(|| {
                ImportError::Config(format!(
                    "importing value rows into {} requires column names",
                    schema.table_name
                ))
            })?;
            for (row, values) in rows.iter().enumerate() {
                if values.len() != columns.len() {
                    return Err(ImportError::ArityMismatch {
                        row,
                        expected: columns.len(),
                        actual: values.len(),
                    });
                }
            }
            Ok(Normalized {
                columns,
                rows,
                models: None,
            })
        }
        Rows::Records(records) => {
            let columns = match columns {
                Some(columns) => columns,
                None => records
                    .first()
                    .map(|record| record.columns().to_vec())
                    .unwrap_or_default(),
            };
            let mut rows = Vec::with_capacity(records.len());
            for (row, record) in records.iter().enumerate() {
                if let Some(extra) = record.columns().iter().find(|c| !columns.contains(c)) {
                    return Err(ImportError::InconsistentRecord {
                        row,
                        column: extra.clone(),
                    });
                }
                let values = columns
                    .iter()
                    .map(|column| {
                        record
                            .get(column)
                            .cloned()
                            .ok_or_else(|| ImportError::InconsistentRecord {
                                row,
                                column: column.clone(),
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;
                rows.push(values);
            }
            Ok(Normalized {
                columns,
                rows,
                models: None,
            })
        }
        Rows::Models(models) => {
            let columns =
                columns.unwrap_or_else(|| default_model_columns(schema, &models, primary_key));
            let rows = models
                .iter()
                .map(|model| columns.iter().map(|c| model.read_attribute(c)).collect())
                .collect();
            Ok(Normalized {
                columns,
                rows,
                models: Some(models),
            })
        }
    }
}

/// Every schema column, minus an engine-assigned key no model has set.
fn default_model_columns(
    schema: &TableSchema,
    models: &[&mut dyn Model],
    primary_key: &[String],
) -> Vec<String> {
    let auto_key = schema.key_strategy == KeyStrategy::AutoIncrement;
    schema
        .column_names()
        .into_iter()
        .filter(|column| {
            !(auto_key
                && primary_key.contains(column)
                && models.iter().all(|m| m.read_attribute(column).is_null()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DynamicModel;
    use crate::schema::{ColumnSpec, SqlType};
    use crate::value::Record;
    use std::sync::Arc;

    fn schema() -> TableSchema {
        TableSchema::new("topics")
            .column(ColumnSpec::new("id", SqlType::Integer))
            .column(ColumnSpec::new("title", SqlType::String))
            .column(ColumnSpec::new("author_name", SqlType::String))
    }

    fn pk() -> Vec<String> {
        vec!["id".to_string()]
    }

    #[test]
    fn test_value_rows_need_columns_and_matching_arity() {
        let schema = schema();
        let err = normalize(&schema, None, Rows::Values(vec![vec![1.into()]]), &pk())
            .err()
            .unwrap();
        assert!(matches!(err, ImportError::Config(_)));

        let err = normalize(
            &schema,
            Some(vec!["title".into(), "author_name".into()]),
            Rows::Values(vec![vec!["a".into(), "b".into()], vec!["c".into()]]),
            &pk(),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            ImportError::ArityMismatch {
                row: 1,
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_records_must_share_columns() {
        let schema = schema();
        let records = vec![
            Record::new().with("title", "a").with("author_name", "x"),
            Record::new().with("author_name", "y").with("title", "b"),
        ];
        let normalized = normalize(&schema, None, Rows::Records(records), &pk()).unwrap();
        assert_eq!(normalized.columns, vec!["title", "author_name"]);
        assert_eq!(normalized.rows[1], vec![Value::from("b"), Value::from("y")]);

        let records = vec![
            Record::new().with("title", "a"),
            Record::new().with("title", "b").with("author_name", "y"),
        ];
        let err = normalize(&schema, None, Rows::Records(records), &pk())
            .err()
            .unwrap();
        assert!(matches!(err, ImportError::InconsistentRecord { row: 1, .. }));
    }

    #[test]
    fn test_model_columns_skip_unset_auto_key() {
        let schema = Arc::new(schema());
        let mut models = vec![
            DynamicModel::new(schema.clone()).with("title", "a"),
            DynamicModel::new(schema.clone()).with("title", "b"),
        ];
        let refs: Vec<&mut dyn Model> = models.iter_mut().map(|m| m as &mut dyn Model).collect();
        let normalized = normalize(&schema, None, Rows::Models(refs), &pk()).unwrap();
        assert_eq!(normalized.columns, vec!["title", "author_name"]);
        assert_eq!(normalized.rows[0], vec![Value::from("a"), Value::Null]);
        assert_eq!(normalized.models.map(|m| m.len()), Some(2));
    }
}
