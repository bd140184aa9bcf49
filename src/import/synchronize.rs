//! Refreshing model instances from the rows the import just wrote.

use crate::dialect::Dialect;
use crate::error::{ImportError, Result};
use crate::model::Model;
use crate::partition::partition_by_count;
use crate::schema::TableSchema;
use crate::session::Session;
use crate::value::Record;
use std::collections::{HashMap, HashSet};

/// Key tuples per SELECT.
const KEYS_PER_QUERY: usize = 500;

/// Reload `targets` by matching `keys`, overwriting their attributes with
/// the stored values and marking them persisted. Targets whose keys are
/// null or not found are left alone. Returns the number refreshed.
pub(crate) async fn synchronize<S: Session>(
    session: &mut S,
    dialect: &dyn Dialect,
    schema: &TableSchema,
    keys: &[String],
    targets: &mut [&mut dyn Model],
) -> Result<usize> {
    if targets.is_empty() || keys.is_empty() {
        return Ok(0);
    }

    let key_columns = keys
        .iter()
        .enumerate()
        .map(|(index, key)| {
            schema
                .find_column(key)
                .ok_or_else(|| ImportError::MissingColumn {
                    name: key.clone(),
                    index,
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut conditions = Vec::new();
    let mut seen = HashSet::new();
    for target in targets.iter() {
        let values: Vec<_> = keys.iter().map(|k| target.read_attribute(k)).collect();
        if values.iter().any(|v| v.is_null()) {
            continue;
        }
        let mut literals = Vec::with_capacity(values.len());
        for (column, value) in key_columns.iter().zip(&values) {
            literals.push(dialect.quote_value(&column.cast(value)?, column)?);
        }
        if seen.insert(literals.clone()) {
            conditions.push(literals);
        }
    }
    if conditions.is_empty() {
        return Ok(0);
    }

    let table = dialect.quote_table(&schema.table_name);
    let mut fresh: HashMap<Vec<String>, Record> = HashMap::new();
    for chunk in partition_by_count(&conditions, KEYS_PER_QUERY) {
        let sql = format!(
            "SELECT * FROM {} WHERE {}",
            table,
            where_clause(dialect, keys, chunk)
        );
        for record in session.query(&sql).await? {
            let key = keys
                .iter()
                .map(|k| record.get(k).map(|v| v.match_key()).unwrap_or_default())
                .collect();
            fresh.insert(key, record);
        }
    }

    let mut synced = 0;
    for target in targets.iter_mut() {
        let key: Vec<String> = keys
            .iter()
            .map(|k| target.read_attribute(k).match_key())
            .collect();
        if let Some(record) = fresh.get(&key) {
            for (column, value) in record.iter() {
                target.write_attribute(column, value.clone());
            }
            target.mark_persisted();
            synced += 1;
        }
    }
    log::debug!(
        "synchronized {} of {} models from {}",
        synced,
        targets.len(),
        schema.table_name
    );
    Ok(synced)
}

fn where_clause(dialect: &dyn Dialect, keys: &[String], tuples: &[Vec<String>]) -> String {
    if let [key] = keys {
        let list = tuples
            .iter()
            .map(|t| t[0].as_str())
            .collect::<Vec<_>>()
            .join(",");
        return format!("{} IN ({})", dialect.quote_ident(key), list);
    }
    tuples
        .iter()
        .map(|tuple| {
            let parts = keys
                .iter()
                .zip(tuple)
                .map(|(key, literal)| format!("{}={}", dialect.quote_ident(key), literal))
                .collect::<Vec<_>>()
                .join(" AND ");
            format!("({})", parts)
        })
        .collect::<Vec<_>>()
        .join(" OR ")
}
