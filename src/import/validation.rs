//! Per-row validation rules.
//!
//! Rules run against the row's [`Record`] after column injection, so stamped
//! timestamps and scope columns are visible to them.

use crate::value::{Record, Value};
use regex::Regex;

#[derive(Debug, Clone)]
pub enum ValidationRule {
    /// Column must be present and neither null nor blank text.
    Presence(String),
    /// Text length (in characters) must fall within the bounds.
    Length {
        column: String,
        min: Option<usize>,
        max: Option<usize>,
    },
    /// Value must be one of the listed values.
    Inclusion { column: String, values: Vec<Value> },
    /// Text must match the pattern.
    Format { column: String, pattern: Regex },
}

impl ValidationRule {
    pub fn presence(column: impl Into<String>) -> Self {
        ValidationRule::Presence(column.into())
    }

    pub fn length(column: impl Into<String>, min: Option<usize>, max: Option<usize>) -> Self {
        ValidationRule::Length {
            column: column.into(),
            min,
            max,
        }
    }

    pub fn inclusion<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        ValidationRule::Inclusion {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn format(column: impl Into<String>, pattern: Regex) -> Self {
        ValidationRule::Format {
            column: column.into(),
            pattern,
        }
    }

    /// Returns the error message when `record` violates the rule.
    ///
    /// Rules other than presence skip null and absent values.
    pub fn check(&self, record: &Record) -> Option<String> {
        match self {
            ValidationRule::Presence(column) => match record.get(column) {
                None | Some(Value::Null) => Some(format!("{} can't be blank", column)),
                Some(Value::Text(s)) if s.trim().is_empty() => {
                    Some(format!("{} can't be blank", column))
                }
                Some(_) => None,
            },
            ValidationRule::Length { column, min, max } => {
                let len = match record.get(column) {
                    Some(Value::Text(s)) => s.chars().count(),
                    _ => return None,
                };
                if let Some(min) = min.filter(|min| len < *min) {
                    return Some(format!(
                        "{} is too short (minimum is {} characters)",
                        column, min
                    ));
                }
                if let Some(max) = max.filter(|max| len > *max) {
                    return Some(format!(
                        "{} is too long (maximum is {} characters)",
                        column, max
                    ));
                }
                None
            }
            ValidationRule::Inclusion { column, values } => match record.get(column) {
                None | Some(Value::Null) => None,
                Some(value) if values.contains(value) => None,
                Some(_) => Some(format!("{} is not included in the list", column)),
            },
            ValidationRule::Format { column, pattern } => match record.get(column) {
                Some(Value::Text(s)) if !pattern.is_match(s) => {
                    Some(format!("{} is invalid", column))
                }
                _ => None,
            },
        }
    }
}

/// Run every rule against `record`, returning all messages.
pub fn validate_record(rules: &[ValidationRule], record: &Record) -> Vec<String> {
    rules.iter().filter_map(|rule| rule.check(record)).collect()
}
