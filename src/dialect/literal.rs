//! Literal formatting shared by the dialects.

use crate::error::{ImportError, Result};
use crate::schema::ColumnSpec;
use crate::value::Value;
use std::fmt::Write;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S%.6f";

/// How a binary value is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BytesStyle {
    /// `X'0a0b'`
    HexString,
    /// `'\x0a0b'::bytea`
    ByteaEscape,
    /// `0x0A0B`
    HexLiteral,
}

/// The knobs in which engine literal syntaxes differ.
#[derive(Debug, Clone, Copy)]
pub struct LiteralStyle {
    pub true_literal: &'static str,
    pub false_literal: &'static str,
    /// Backslash is an escape character inside string literals.
    pub backslash_escapes: bool,
    /// Prefix string literals with `N`.
    pub national_strings: bool,
    pub bytes: BytesStyle,
}

pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

/// Quote `text` as a string literal in `style`.
pub fn quote_string(text: &str, style: &LiteralStyle) -> String {
    let mut out = String::with_capacity(text.len() + 3);
    if style.national_strings {
        out.push('N');
    }
    out.push('\'');
    for ch in text.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\\' if style.backslash_escapes => out.push_str("\\\\"),
            '\0' if style.backslash_escapes => out.push_str("\\0"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

fn quote_bytes(bytes: &[u8], style: &LiteralStyle) -> String {
    match style.bytes {
        BytesStyle::HexString => format!("X'{}'", hex(bytes)),
        BytesStyle::ByteaEscape => format!("'\\x{}'::bytea", hex(bytes)),
        BytesStyle::HexLiteral if bytes.is_empty() => "0x".to_string(),
        BytesStyle::HexLiteral => format!("0x{}", hex(bytes).to_ascii_uppercase()),
    }
}

/// Render `value` with the engine-neutral rules of `style`.
///
/// Non-finite floats are rejected here; engines that can store them handle
/// them before delegating.
pub fn render(value: &Value, column: &ColumnSpec, style: &LiteralStyle) -> Result<String> {
    let sql = match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => style.true_literal.to_string(),
        Value::Bool(false) => style.false_literal.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) if v.is_finite() => format_float(*v),
        Value::Float(v) => {
            return Err(ImportError::invalid_value(
                &column.name,
                format!("{} cannot be stored", v),
            ));
        }
        Value::Text(s) => quote_string(s, style),
        Value::Bytes(b) => quote_bytes(b, style),
        Value::Date(d) => quote_string(&d.format(DATE_FORMAT).to_string(), style),
        Value::Time(t) => quote_string(&t.format(TIME_FORMAT).to_string(), style),
        Value::Timestamp(ts) => quote_string(&ts.format(TIMESTAMP_FORMAT).to_string(), style),
        Value::TimestampTz(ts) => quote_string(
            &ts.naive_utc().format(TIMESTAMP_FORMAT).to_string(),
            style,
        ),
        Value::Uuid(id) => quote_string(&id.to_string(), style),
        Value::Json(json) => quote_string(&json.to_string(), style),
        Value::Expr(sql) => sql.clone(),
    };
    Ok(sql)
}

/// Shortest representation that reads back to the same float, always with
/// a decimal point so the engine does not treat it as an integer.
fn format_float(v: f64) -> String {
    let text = v.to_string();
    if text.contains('.') || text.contains('e') {
        text
    } else {
        format!("{}.0", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SqlType;
    use chrono::NaiveDate;

    const STANDARD: LiteralStyle = LiteralStyle {
        true_literal: "TRUE",
        false_literal: "FALSE",
        backslash_escapes: false,
        national_strings: false,
        bytes: BytesStyle::HexString,
    };

    fn column() -> ColumnSpec {
        ColumnSpec::new("c", SqlType::String)
    }

    #[test]
    fn test_quote_string_escaping() {
        assert_eq!(quote_string("O'Reilly", &STANDARD), "'O''Reilly'");
        assert_eq!(quote_string(r"a\b", &STANDARD), r"'a\b'");

        let backslash = LiteralStyle {
            backslash_escapes: true,
            ..STANDARD
        };
        assert_eq!(quote_string(r"a\b'c", &backslash), r"'a\\b''c'");

        let national = LiteralStyle {
            national_strings: true,
            ..STANDARD
        };
        assert_eq!(quote_string("héllo", &national), "N'héllo'");
    }

    #[test]
    fn test_render_scalars() {
        let c = column();
        assert_eq!(render(&Value::Null, &c, &STANDARD).unwrap(), "NULL");
        assert_eq!(render(&Value::Int(-4), &c, &STANDARD).unwrap(), "-4");
        assert_eq!(render(&Value::Float(2.0), &c, &STANDARD).unwrap(), "2.0");
        assert_eq!(render(&Value::Float(0.25), &c, &STANDARD).unwrap(), "0.25");
        assert_eq!(render(&Value::Bool(false), &c, &STANDARD).unwrap(), "FALSE");
        assert_eq!(render(&Value::expr("NOW()"), &c, &STANDARD).unwrap(), "NOW()");
        assert!(render(&Value::Float(f64::NAN), &c, &STANDARD).is_err());
    }

    #[test]
    fn test_render_temporal_and_binary() {
        let c = column();
        let ts = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_micro_opt(7, 5, 1, 250)
            .unwrap();
        assert_eq!(
            render(&Value::Timestamp(ts), &c, &STANDARD).unwrap(),
            "'2024-03-09 07:05:01.000250'"
        );
        assert_eq!(
            render(&Value::Bytes(vec![0x0a, 0xff]), &c, &STANDARD).unwrap(),
            "X'0aff'"
        );
        let hex_literal = LiteralStyle {
            bytes: BytesStyle::HexLiteral,
            ..STANDARD
        };
        assert_eq!(
            render(&Value::Bytes(vec![0x0a, 0xff]), &c, &hex_literal).unwrap(),
            "0x0AFF"
        );
    }
}
