//! Table and column descriptions used to render and validate rows.
//!
//! The importer never introspects the database: callers describe the target
//! table once with a [`TableSchema`] and reuse it across imports.

use crate::error::{ImportError, Result};
use crate::import::validation::ValidationRule;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Columns stamped with the creation time of a row.
pub const CREATE_TIMESTAMP_COLUMNS: [&str; 2] = ["created_at", "created_on"];
/// Columns stamped with the modification time of a row.
pub const UPDATE_TIMESTAMP_COLUMNS: [&str; 2] = ["updated_at", "updated_on"];

/// Declared SQL type of a column; drives input coercion and literal formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Float,
    Decimal,
    String,
    Text,
    Boolean,
    Date,
    Time,
    DateTime,
    TimestampTz,
    Binary,
    Json,
    Jsonb,
    Uuid,
    Other(String),
}

impl SqlType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, SqlType::Integer | SqlType::Float | SqlType::Decimal)
    }
}

/// Encodes values of a serialized column before they are quoted.
pub trait Coder: Send + Sync + fmt::Debug {
    fn dump(&self, value: &Value) -> Result<Value>;
}

/// Stores any value as its JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCoder;

impl Coder for JsonCoder {
    fn dump(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Expr(_) => Ok(value.clone()),
            other => Ok(Value::Text(serde_json::to_string(other)?)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub default: Option<Value>,
    pub coder: Option<Arc<dyn Coder>>,
    /// Enum label to stored integer mapping.
    pub enum_values: Option<Vec<(String, i64)>>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
            default: None,
            coder: None,
            enum_values: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn serialized(mut self, coder: impl Coder + 'static) -> Self {
        self.coder = Some(Arc::new(coder));
        self
    }

    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(|(k, v)| (k.into(), v)).collect());
        self
    }

    /// Coerce a caller-supplied value to this column's declared type.
    pub fn cast(&self, value: &Value) -> Result<Value> {
        if value.is_null() || matches!(value, Value::Expr(_)) {
            return Ok(value.clone());
        }

        if let Some(mapping) = &self.enum_values {
            return match value {
                Value::Text(label) => mapping
                    .iter()
                    .find(|(name, _)| name == label)
                    .map(|(_, stored)| Value::Int(*stored))
                    .ok_or_else(|| {
                        ImportError::invalid_value(
                            &self.name,
                            format!("'{}' is not a valid enum value", label),
                        )
                    }),
                Value::Int(stored) if mapping.iter().any(|(_, v)| v == stored) => {
                    Ok(value.clone())
                }
                other => Err(ImportError::invalid_value(
                    &self.name,
                    format!("'{}' is not a valid enum value", other),
                )),
            };
        }

        let cast = match (&self.sql_type, value) {
            (SqlType::Integer, Value::Text(s)) => match s.trim().parse::<i64>() {
                Ok(v) => Value::Int(v),
                Err(_) => {
                    return Err(ImportError::invalid_value(
                        &self.name,
                        format!("'{}' is not an integer", s),
                    ));
                }
            },
            (SqlType::Integer, Value::Float(f)) => Value::Int(f.trunc() as i64),
            (SqlType::Integer, Value::Bool(b)) => Value::Int(i64::from(*b)),
            (SqlType::Float, Value::Int(i)) => Value::Float(*i as f64),
            (SqlType::Float, Value::Text(s)) => match s.trim().parse::<f64>() {
                Ok(v) => Value::Float(v),
                Err(_) => {
                    return Err(ImportError::invalid_value(
                        &self.name,
                        format!("'{}' is not a number", s),
                    ));
                }
            },
            (SqlType::Boolean, Value::Int(i)) => Value::Bool(*i != 0),
            (SqlType::Boolean, Value::Text(s)) => match parse_boolean_text(s) {
                Some(b) => Value::Bool(b),
                None => {
                    return Err(ImportError::invalid_value(
                        &self.name,
                        format!("'{}' is not a boolean", s),
                    ));
                }
            },
            (SqlType::String | SqlType::Text, Value::Int(i)) => Value::Text(i.to_string()),
            (SqlType::String | SqlType::Text, Value::Float(f)) => Value::Text(f.to_string()),
            (SqlType::Uuid, Value::Text(s)) => match uuid::Uuid::parse_str(s.trim()) {
                Ok(id) => Value::Uuid(id),
                Err(_) => {
                    return Err(ImportError::invalid_value(
                        &self.name,
                        format!("'{}' is not a uuid", s),
                    ));
                }
            },
            (_, other) => other.clone(),
        };
        Ok(cast)
    }
}

fn parse_boolean_text(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "y" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "n" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// How a table's primary key receives its value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KeyStrategy {
    /// The engine assigns the key (serial, AUTO_INCREMENT, IDENTITY, rowid).
    #[default]
    AutoIncrement,
    /// The key is drawn from a named sequence inside the INSERT itself.
    Sequence(String),
    /// The caller always supplies the key.
    Manual,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub table_name: String,
    /// Name written into polymorphic type columns of child rows.
    pub model_name: String,
    pub columns: Vec<ColumnSpec>,
    pub primary_key: Vec<String>,
    pub key_strategy: KeyStrategy,
    pub record_timestamps: bool,
    pub validations: Vec<ValidationRule>,
}

impl TableSchema {
    /// A table with an auto-assigned `id` primary key and timestamp bookkeeping enabled.
    pub fn new(table_name: impl Into<String>) -> Self {
        let table_name = table_name.into();
        Self {
            model_name: model_name_for(&table_name),
            table_name,
            columns: Vec::new(),
            primary_key: vec!["id".to_string()],
            key_strategy: KeyStrategy::AutoIncrement,
            record_timestamps: true,
            validations: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn without_primary_key(mut self) -> Self {
        self.primary_key.clear();
        self
    }

    pub fn sequence(mut self, name: impl Into<String>) -> Self {
        self.key_strategy = KeyStrategy::Sequence(name.into());
        self
    }

    pub fn key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.key_strategy = strategy;
        self
    }

    pub fn record_timestamps(mut self, enabled: bool) -> Self {
        self.record_timestamps = enabled;
        self
    }

    pub fn validate(mut self, rule: ValidationRule) -> Self {
        self.validations.push(rule);
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.find_column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    pub fn sequence_name(&self) -> Option<&str> {
        match &self.key_strategy {
            KeyStrategy::Sequence(name) => Some(name),
            _ => None,
        }
    }
}

/// `book_reviews` -> `BookReview`.
fn model_name_for(table: &str) -> String {
    let singular = table.strip_suffix('s').unwrap_or(table);
    singular
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}
