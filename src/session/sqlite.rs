use crate::error::{ImportError, Result};
use crate::session::{ExecOutcome, Session};
use crate::value::{Record, Value};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// [`Session`] over a SQLite connection.
pub struct SqliteSession<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SqliteSession<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }
}

impl Session for SqliteSession<'_> {
    async fn execute(&mut self, sql: &str) -> Result<ExecOutcome> {
        let result = sqlx::query(sql)
            .persistent(false)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| ImportError::statement(sql, e))?;
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()),
        })
    }

    async fn query(&mut self, sql: &str) -> Result<Vec<Record>> {
        let rows = sqlx::query(sql)
            .persistent(false)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|e| ImportError::statement(sql, e))?;
        rows.iter().map(decode_row).collect()
    }
}

fn decode_row(row: &SqliteRow) -> Result<Record> {
    let mut record = Record::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = decode_value(row, index, column.type_info().name())?;
        record.insert(column.name(), value);
    }
    Ok(record)
}

/// SQLite columns are dynamically typed, so the declared type is only a
/// hint; anything unrecognised is tried as integer, real, text, then blob.
fn decode_value(row: &SqliteRow, index: usize, type_name: &str) -> Result<Value> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }
    let value = match type_name {
        "BOOLEAN" => Value::Bool(row.try_get(index)?),
        "INTEGER" | "INT8" => Value::Int(row.try_get(index)?),
        "REAL" => Value::Float(row.try_get(index)?),
        "TEXT" | "DATE" | "TIME" | "DATETIME" => Value::Text(row.try_get(index)?),
        "BLOB" => Value::Bytes(row.try_get(index)?),
        _ => {
            if let Ok(v) = row.try_get::<i64, _>(index) {
                Value::Int(v)
            } else if let Ok(v) = row.try_get::<f64, _>(index) {
                Value::Float(v)
            } else if let Ok(v) = row.try_get::<String, _>(index) {
                Value::Text(v)
            } else {
                Value::Bytes(row.try_get(index)?)
            }
        }
    };
    Ok(value)
}
