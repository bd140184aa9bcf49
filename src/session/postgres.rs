use crate::error::{ImportError, Result};
use crate::session::{ExecOutcome, Session};
use crate::value::{Record, Value};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// [`Session`] over a PostgreSQL connection or transaction.
pub struct PgSession<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> PgSession<'c> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }
}

impl Session for PgSession<'_> {
    async fn execute(&mut self, sql: &str) -> Result<ExecOutcome> {
        let result = sqlx::query(sql)
            .persistent(false)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| ImportError::statement(sql, e))?;
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
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

fn decode_row(row: &PgRow) -> Result<Record> {
    let mut record = Record::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = decode_value(row, index, column.type_info().name())?;
        record.insert(column.name(), value);
    }
    Ok(record)
}

fn decode_value(row: &PgRow, index: usize, type_name: &str) -> Result<Value> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }
    let value = match type_name {
        "BOOL" => Value::Bool(row.try_get(index)?),
        "INT2" => Value::Int(row.try_get::<i16, _>(index)?.into()),
        "INT4" => Value::Int(row.try_get::<i32, _>(index)?.into()),
        "INT8" => Value::Int(row.try_get(index)?),
        "FLOAT4" => Value::Float(row.try_get::<f32, _>(index)?.into()),
        "FLOAT8" => Value::Float(row.try_get(index)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => Value::Text(row.try_get(index)?),
        "DATE" => Value::Date(row.try_get(index)?),
        "TIME" => Value::Time(row.try_get(index)?),
        "TIMESTAMP" => Value::Timestamp(row.try_get(index)?),
        "TIMESTAMPTZ" => Value::TimestampTz(row.try_get(index)?),
        "UUID" => Value::Uuid(row.try_get(index)?),
        "JSON" | "JSONB" => Value::Json(row.try_get(index)?),
        "BYTEA" => Value::Bytes(row.try_get(index)?),
        other => {
            log::warn!("cannot decode postgres type {} at column {}, reading NULL", other, index);
            Value::Null
        }
    };
    Ok(value)
}
