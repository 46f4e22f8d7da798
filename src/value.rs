//! value: доменные значения колонок и их SQL-литералы.
//!
//! Кодирование (format_value):
//! - Null            → NULL
//! - Boolean         → 1 | 0
//! - Integer         → десятичные цифры со знаком
//! - Float           → кратчайшее представление, которое парсится обратно в тот же f64
//! - Bytes           → X'<hex lowercase>'
//! - Text            → '...' с экранированием `\` → `\\` и `'` → `\'`
//!
//! Набор вариантов закрыт, поэтому функция тотальна. Не-конечные float (NaN/inf)
//! литерала не имеют: формат даёт NULL, а TableDumper отвергает такие строки раньше
//! (см. [`Value::is_encodable`]).

use std::fmt;

/// One column value as read from the source.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Text(String),
}

/// Ordered values of one row; positions follow the table's column order.
pub type Row = Vec<Value>;

/// Non-empty group of rows streamed together (one INSERT statement).
pub type RowBatch = Vec<Row>;

impl Value {
    /// false only for values without a faithful literal (non-finite floats).
    pub fn is_encodable(&self) -> bool {
        match self {
            Value::Float(f) => f.is_finite(),
            _ => true,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Bytes(_) => "bytes",
            Value::Text(_) => "text",
        }
    }
}

/// SQL literal for a value.
pub fn format_value(v: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, v);
    out
}

/// Append the SQL literal for `v` to `out` (no intermediate allocation per value).
pub fn write_value(out: &mut String, v: &Value) {
    match v {
        Value::Null => out.push_str("NULL"),
        Value::Boolean(b) => out.push(if *b { '1' } else { '0' }),
        Value::Integer(i) => out.push_str(&i.to_string()),
        Value::Float(f) => {
            if f.is_finite() {
                // Debug для f64: кратчайшая round-trip форма ("1.0", "1e300", "-0.0")
                out.push_str(&format!("{:?}", f));
            } else {
                out.push_str("NULL");
            }
        }
        Value::Bytes(bytes) => {
            out.reserve(bytes.len() * 2 + 3);
            out.push_str("X'");
            push_hex(out, bytes);
            out.push('\'');
        }
        Value::Text(s) => {
            out.reserve(s.len() + 2);
            out.push('\'');
            for ch in s.chars() {
                match ch {
                    '\\' => out.push_str("\\\\"),
                    '\'' => out.push_str("\\'"),
                    c => out.push(c),
                }
            }
            out.push('\'');
        }
    }
}

/// Render a row as `(v1, v2, ...)`.
pub fn write_row(out: &mut String, row: &[Value]) {
    out.push('(');
    for (i, v) in row.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_value(out, v);
    }
    out.push(')');
}

fn push_hex(out: &mut String, bytes: &[u8]) {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    for b in bytes {
        out.push(DIGITS[(b >> 4) as usize] as char);
        out.push(DIGITS[(b & 0x0f) as usize] as char);
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_value(self))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
