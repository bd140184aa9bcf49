use crate::error::{ImportError, Result};
use crate::session::{ExecOutcome, Session};
use crate::value::{Record, Value};
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// [`Session`] over a MySQL connection or transaction.
pub struct MySqlSession<'c> {
    conn: &'c mut MySqlConnection,
}

impl<'c> MySqlSession<'c> {
    pub fn new(conn: &'c mut MySqlConnection) -> Self {
        Self { conn }
    }
}

impl Session for MySqlSession<'_> {
    async fn execute(&mut self, sql: &str) -> Result<ExecOutcome> {
        let result = sqlx::query(sql)
            .persistent(false)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| ImportError::statement(sql, e))?;
        let last_insert_id = match result.last_insert_id() {
            0 => None,
            id => i64::try_from(id).ok(),
        };
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id,
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

fn decode_row(row: &MySqlRow) -> Result<Record> {
    let mut record = Record::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = decode_value(row, index, column.type_info().name())?;
        record.insert(column.name(), value);
    }
    Ok(record)
}

fn decode_value(row: &MySqlRow, index: usize, type_name: &str) -> Result<Value> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }
    let value = match type_name {
        "BOOLEAN" => Value::Bool(row.try_get(index)?),
        name if name.contains("INT") && name.ends_with("UNSIGNED") => {
            let raw: u64 = row.try_get(index)?;
            match i64::try_from(raw) {
                Ok(v) => Value::Int(v),
                Err(_) => Value::Text(raw.to_string()),
            }
        }
        name if name.contains("INT") => Value::Int(row.try_get(index)?),
        "FLOAT" => Value::Float(row.try_get::<f32, _>(index)?.into()),
        "DOUBLE" => Value::Float(row.try_get(index)?),
        "DATETIME" => Value::Timestamp(row.try_get(index)?),
        "TIMESTAMP" => Value::TimestampTz(row.try_get(index)?),
        "DATE" => Value::Date(row.try_get(index)?),
        "TIME" => Value::Time(row.try_get(index)?),
        "JSON" => Value::Json(row.try_get(index)?),
        name if name.contains("CHAR") || name.contains("TEXT") || name == "ENUM" => {
            Value::Text(row.try_get(index)?)
        }
        name if name.contains("BLOB") || name.contains("BINARY") => {
            Value::Bytes(row.try_get(index)?)
        }
        other => {
            log::warn!("cannot decode mysql type {} at column {}, reading NULL", other, index);
            Value::Null
        }
    };
    Ok(value)
}
